use tracing::{debug, info};

use crate::config::InputConfig;
use crate::page::{ChatPage, InputKind};
use crate::{Error, Result};

/// Writes one user turn into the chat input and commits it.
#[derive(Debug, Clone)]
pub struct Submitter {
    input_selectors: Vec<String>,
    config: InputConfig,
}

impl Submitter {
    pub fn new(input_selectors: Vec<String>, config: InputConfig) -> Self {
        Self {
            input_selectors,
            config,
        }
    }

    /// Locate the input, insert `text` and press the submit key.
    pub async fn submit<P>(&self, page: &P, text: &str) -> Result<()>
    where
        P: ChatPage + ?Sized,
    {
        page.scroll_to_bottom().await?;
        page.sleep(self.config.scroll_settle_ms).await;

        let surface = page
            .find_input(&self.input_selectors)
            .await?
            .ok_or_else(|| Error::InputNotFound(self.input_selectors.join(", ")))?;
        debug!("Input surface: {}", surface);

        page.focus(&surface).await?;
        page.sleep(self.config.focus_settle_ms).await;

        match surface.kind {
            InputKind::Field => page.set_value(&surface, text).await?,
            InputKind::Editable => page.type_text(text, self.config.type_delay_ms).await?,
            InputKind::Unknown => {
                let point = self.config.fallback_click;
                debug!(
                    "Input kind unknown, clicking viewport at ({}, {})",
                    point.x, point.y
                );
                page.click_at(point.x, point.y).await?;
                page.type_text(text, self.config.type_delay_ms).await?;
            }
        }

        page.sleep(self.config.submit_delay_ms).await;
        page.press_key(&self.config.submit_key)
            .await
            .map_err(|e| Error::SubmitFailed(format!("{}: {}", self.config.submit_key, e)))?;

        info!("Submitted {} chars", text.chars().count());
        Ok(())
    }
}
