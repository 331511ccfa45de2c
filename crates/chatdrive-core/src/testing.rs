//! Scripted [`ChatPage`] for unit tests.

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::config::ReadyCondition;
use crate::page::{ChatPage, InputSurface, ReplyObservation};
use crate::{Error, Result};

/// One scripted answer to `query_last`.
#[derive(Debug, Clone)]
pub enum Read {
    Text(String),
    Absent,
    /// No element matched, but the layer still hands back stale text.
    Detached(String),
    Fail(String),
}

impl Read {
    pub fn text(s: impl Into<String>) -> Self {
        Read::Text(s.into())
    }
}

/// Answers `query_last` from a script (the last entry repeats) and records
/// every other call as a line in `actions()`.
pub struct ScriptedPage {
    script: Vec<Read>,
    reads: Mutex<usize>,
    input: Option<InputSurface>,
    fail_key_press: bool,
    actions: Mutex<Vec<String>>,
}

impl ScriptedPage {
    pub fn new(script: Vec<Read>) -> Self {
        Self {
            script,
            reads: Mutex::new(0),
            input: None,
            fail_key_press: false,
            actions: Mutex::new(Vec::new()),
        }
    }

    pub fn with_input(mut self, surface: InputSurface) -> Self {
        self.input = Some(surface);
        self
    }

    pub fn failing_key_press(mut self) -> Self {
        self.fail_key_press = true;
        self
    }

    pub fn reads(&self) -> usize {
        *self.reads.lock().unwrap()
    }

    pub fn actions(&self) -> Vec<String> {
        self.actions.lock().unwrap().clone()
    }

    fn record(&self, action: String) {
        self.actions.lock().unwrap().push(action);
    }
}

#[async_trait]
impl ChatPage for ScriptedPage {
    async fn navigate(&self, url: &str, ready: &ReadyCondition, _timeout_ms: u64) -> Result<()> {
        self.record(format!("navigate {} ({})", url, ready));
        Ok(())
    }

    async fn scroll_to_bottom(&self) -> Result<()> {
        self.record("scroll".into());
        Ok(())
    }

    async fn query_last(&self, _selector: &str) -> Result<ReplyObservation> {
        let index = {
            let mut reads = self.reads.lock().unwrap();
            let index = *reads;
            *reads += 1;
            index
        };
        let step = self
            .script
            .get(index)
            .or_else(|| self.script.last())
            .cloned()
            .unwrap_or(Read::Absent);
        match step {
            Read::Text(t) => Ok(ReplyObservation::present(t)),
            Read::Absent => Ok(ReplyObservation::absent()),
            Read::Detached(t) => Ok(ReplyObservation {
                text: t,
                ..ReplyObservation::absent()
            }),
            Read::Fail(reason) => Err(Error::ReplyReadFailed(reason)),
        }
    }

    async fn find_input(&self, _selectors: &[String]) -> Result<Option<InputSurface>> {
        Ok(self.input.clone())
    }

    async fn focus(&self, surface: &InputSurface) -> Result<()> {
        self.record(format!("focus {}", surface.selector));
        Ok(())
    }

    async fn set_value(&self, _surface: &InputSurface, text: &str) -> Result<()> {
        self.record(format!("set_value {}", text));
        Ok(())
    }

    async fn type_text(&self, text: &str, delay_ms: u64) -> Result<()> {
        self.record(format!("type {} @{}ms", text, delay_ms));
        Ok(())
    }

    async fn click_at(&self, x_ratio: f64, y_ratio: f64) -> Result<()> {
        self.record(format!("click_at {},{}", x_ratio, y_ratio));
        Ok(())
    }

    async fn press_key(&self, key: &str) -> Result<()> {
        if self.fail_key_press {
            return Err(Error::Browser(eoka::Error::CdpSimple(
                "Input.dispatchKeyEvent failed".into(),
            )));
        }
        self.record(format!("press {}", key));
        Ok(())
    }

    async fn sleep(&self, ms: u64) {
        tokio::time::sleep(Duration::from_millis(ms)).await;
    }

    async fn shutdown(&mut self) -> Result<()> {
        self.record("shutdown".into());
        Ok(())
    }
}
