//! The page capability the chat core drives.
//!
//! Everything the submitter and detector need from a browser tab goes
//! through [`ChatPage`]. [`crate::EokaPage`] implements it over a real
//! Chrome instance; tests implement it over scripted observations.

use std::fmt;

use async_trait::async_trait;
use tokio::time::Instant;

use crate::config::ReadyCondition;
use crate::Result;

/// A point-in-time read of the last reply element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplyObservation {
    /// Trimmed text content. Empty when the element is absent.
    pub text: String,
    /// Whether any element matched the reply selector.
    pub exists: bool,
    /// When the read happened.
    pub observed_at: Instant,
}

impl ReplyObservation {
    /// An observation of an existing element.
    pub fn present(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            exists: true,
            observed_at: Instant::now(),
        }
    }

    /// An observation where no reply element matched.
    pub fn absent() -> Self {
        Self {
            text: String::new(),
            exists: false,
            observed_at: Instant::now(),
        }
    }

    /// The text to judge, or `""` when no element matched.
    pub fn visible_text(&self) -> &str {
        if self.exists {
            &self.text
        } else {
            ""
        }
    }
}

/// How text gets into an input surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKind {
    /// `<textarea>` or `<input>`: value assignment plus an `input` event.
    Field,
    /// `contenteditable` region: real keystrokes.
    Editable,
    /// Anything else. Handled by the click-and-type fallback.
    Unknown,
}

impl InputKind {
    /// Classify an element from its tag name and `isContentEditable` flag.
    pub fn classify(tag: &str, content_editable: bool) -> Self {
        match tag.to_ascii_lowercase().as_str() {
            "textarea" | "input" => InputKind::Field,
            _ if content_editable => InputKind::Editable,
            _ => InputKind::Unknown,
        }
    }
}

/// The input element a submit will write into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputSurface {
    /// Selector that matched.
    pub selector: String,
    pub kind: InputKind,
}

impl fmt::Display for InputSurface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} '{}'", self.kind, self.selector)
    }
}

/// Browser tab operations used by a chat session.
#[async_trait]
pub trait ChatPage: Send + Sync {
    /// Load `url` and wait until `ready` holds or `timeout_ms` elapses.
    async fn navigate(&self, url: &str, ready: &ReadyCondition, timeout_ms: u64) -> Result<()>;

    /// Scroll the document to its bottom edge.
    async fn scroll_to_bottom(&self) -> Result<()>;

    /// Read the trimmed text of the last element matching `selector`.
    async fn query_last(&self, selector: &str) -> Result<ReplyObservation>;

    /// Probe `selectors` in order and return the first that matches.
    async fn find_input(&self, selectors: &[String]) -> Result<Option<InputSurface>>;

    /// Click the surface so it holds keyboard focus.
    async fn focus(&self, surface: &InputSurface) -> Result<()>;

    /// Assign the value directly and fire an `input` event.
    async fn set_value(&self, surface: &InputSurface, text: &str) -> Result<()>;

    /// Type into the focused element one character at a time.
    async fn type_text(&self, text: &str, delay_ms: u64) -> Result<()>;

    /// Click at a fraction of the viewport size.
    async fn click_at(&self, x_ratio: f64, y_ratio: f64) -> Result<()>;

    /// Press and release a single key.
    async fn press_key(&self, key: &str) -> Result<()>;

    /// Cooperative delay.
    async fn sleep(&self, ms: u64);

    /// Release the underlying browser. Later calls fail.
    async fn shutdown(&mut self) -> Result<()>;
}
