//! # chatdrive-core
//!
//! Talk to a web chat agent through a real browser. Type a message into
//! the page, press Enter, and wait until the streamed reply stops changing.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use chatdrive_core::{ChatConfig, ChatSession};
//!
//! # #[tokio::main]
//! # async fn main() -> chatdrive_core::Result<()> {
//! let config = ChatConfig::load("configs/alice.yaml")?;
//! let mut session = ChatSession::open(&config).await?;
//! println!("{}", session.send("Привет!").await);
//! session.close().await?;
//! # Ok(())
//! # }
//! ```

mod browser;
mod config;
pub mod detect;
pub mod page;
mod session;
mod submit;

#[cfg(test)]
mod testing;

pub use browser::EokaPage;
pub use config::{
    BrowserConfig, ChatConfig, ClickPoint, DetectConfig, InputConfig, ReadyCondition,
    SelectorConfig, TargetConfig, Viewport,
};
pub use detect::{CompletionDetector, DetectionOutcome, StabilityWindow};
pub use page::{ChatPage, InputKind, InputSurface, ReplyObservation};
pub use session::{ask, render_outcome, ChatSession};
pub use submit::Submitter;

/// Result type for chatdrive operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while opening a chat or running a turn.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("yaml parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("browser error: {0}")]
    Browser(#[from] eoka::Error),

    #[error("input not found: {0}")]
    InputNotFound(String),

    #[error("submit failed: {0}")]
    SubmitFailed(String),

    #[error("reply read failed: {0}")]
    ReplyReadFailed(String),

    #[error("timeout: {0}")]
    Timeout(String),
}
