use tracing::{debug, info, warn};

use crate::browser::EokaPage;
use crate::config::ChatConfig;
use crate::detect::{CompletionDetector, DetectionOutcome};
use crate::page::ChatPage;
use crate::submit::Submitter;
use crate::Result;

/// One conversation in one browser page.
///
/// Turns are sequential: [`ChatSession::send`] takes `&mut self`, so a new
/// turn can't start while the previous one is still being detected.
/// Dropping the `send` future aborts detection at its next poll.
pub struct ChatSession<P: ChatPage = EokaPage> {
    page: P,
    reply_selector: String,
    submitter: Submitter,
    detector: CompletionDetector,
    turns: u64,
}

impl ChatSession<EokaPage> {
    /// Launch the browser and open the chat page.
    ///
    /// This is the only operation whose failure propagates: without a page
    /// there is nothing to talk to.
    pub async fn open(config: &ChatConfig) -> Result<Self> {
        config.validate()?;
        let page = EokaPage::launch(&config.browser).await?;
        Self::from_page(page, config).await
    }
}

impl<P: ChatPage> ChatSession<P> {
    /// Wrap an already launched page and navigate it to the chat target.
    ///
    /// The config is validated first; an invalid one is rejected before the
    /// page is touched.
    pub async fn from_page(mut page: P, config: &ChatConfig) -> Result<Self> {
        config.validate()?;
        info!("Opening chat at {}", config.target.url);
        let navigated = page
            .navigate(&config.target.url, &config.target.ready, config.target.timeout_ms)
            .await;
        if let Err(e) = navigated {
            // Don't leak the browser when the page never came up
            if let Err(close_err) = page.shutdown().await {
                warn!("Failed to close browser after open error: {}", close_err);
            }
            return Err(e);
        }

        Ok(Self {
            page,
            reply_selector: config.selectors.reply.clone(),
            submitter: Submitter::new(config.selectors.input.clone(), config.input.clone()),
            detector: CompletionDetector::new(
                config.selectors.reply.clone(),
                config.detect.clone(),
            ),
            turns: 0,
        })
    }

    /// Get a reference to the underlying page.
    pub fn page(&self) -> &P {
        &self.page
    }

    /// Number of turns sent so far.
    pub fn turns(&self) -> u64 {
        self.turns
    }

    /// Text of the last reply currently on screen (empty if none).
    pub async fn last_reply(&self) -> Result<String> {
        Ok(self.page.query_last(&self.reply_selector).await?.text)
    }

    /// Send one message and wait for the reply.
    ///
    /// Never fails: timeouts come back as `"Timeout: ..."` and faults as
    /// `"Error: ..."`, so a bad turn doesn't end the conversation.
    pub async fn send(&mut self, text: &str) -> String {
        self.turns += 1;
        info!("Turn {}: sending {} chars", self.turns, text.chars().count());

        match self.run_turn(text).await {
            Ok(outcome) => render_outcome(outcome),
            Err(e) => {
                warn!("Turn {} failed: {}", self.turns, e);
                format!("Error: {}", e)
            }
        }
    }

    async fn run_turn(&self, text: &str) -> Result<DetectionOutcome> {
        // Baseline must be read before anything is typed
        let baseline = self.last_reply().await?;
        debug!("Baseline: {} chars", baseline.chars().count());

        self.submitter.submit(&self.page, text).await?;

        let outcome = self.detector.await_completion(&self.page, &baseline).await;
        match &outcome {
            DetectionOutcome::Completed(reply) => {
                info!("Turn {}: reply complete ({} chars)", self.turns, reply.chars().count())
            }
            DetectionOutcome::TimedOut(partial) => warn!(
                "Turn {}: no stable reply within {}ms ({} chars seen)",
                self.turns,
                self.detector.config().timeout_ms,
                partial.chars().count()
            ),
            DetectionOutcome::Failed(reason) => warn!("Turn {}: {}", self.turns, reason),
        }
        Ok(outcome)
    }

    /// Close the browser. Runs regardless of how earlier turns went.
    pub async fn close(mut self) -> Result<()> {
        info!("Closing chat after {} turns", self.turns);
        self.page.shutdown().await
    }
}

/// Map a detection outcome to the string the caller sees.
pub fn render_outcome(outcome: DetectionOutcome) -> String {
    match outcome {
        DetectionOutcome::Completed(text) => text,
        DetectionOutcome::TimedOut(partial) if partial.is_empty() => {
            "Timeout: no response appeared".into()
        }
        DetectionOutcome::TimedOut(partial) => format!("Timeout: {}", partial),
        DetectionOutcome::Failed(reason) => format!("Error: {}", reason),
    }
}

/// One question, one answer: open a session, send, close.
pub async fn ask(config: &ChatConfig, text: &str) -> Result<String> {
    let mut session = ChatSession::open(config).await?;
    let reply = session.send(text).await;
    session.close().await?;
    Ok(reply)
}
