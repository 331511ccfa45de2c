pub mod schema;

pub use schema::{
    BrowserConfig, ChatConfig, ClickPoint, DetectConfig, InputConfig, ReadyCondition,
    SelectorConfig, TargetConfig, Viewport,
};
