//! Reply completion detection.
//!
//! The agent streams its reply into the last bubble with no "done" signal.
//! The detector polls that bubble and declares the reply complete once its
//! text has differed from the pre-turn baseline and then stayed unchanged
//! for `stable_ms`.

use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, warn};

use crate::config::DetectConfig;
use crate::page::ChatPage;

/// How a detection run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DetectionOutcome {
    /// The reply stabilized with this text.
    Completed(String),
    /// The budget ran out. Carries the last candidate text, possibly empty.
    TimedOut(String),
    /// Reading the page failed.
    Failed(String),
}

/// What a single observation did to the [`StabilityWindow`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WindowEvent {
    /// Nothing new on screen yet.
    Waiting,
    /// A new candidate text appeared; the dwell timer (re)started.
    Candidate,
    /// Empty or baseline text while tracking. Ignored, timer keeps running.
    Glitch,
    /// Same text as the candidate, dwell not reached yet.
    Holding,
    /// Same text for at least the dwell period.
    Stable(String),
}

/// Dwell tracking for the candidate reply text.
#[derive(Debug, Clone, Default)]
pub struct StabilityWindow {
    candidate_text: String,
    candidate_since: Option<Instant>,
}

impl StabilityWindow {
    pub fn new() -> Self {
        Self::default()
    }

    /// The text currently being tracked, if any.
    pub fn candidate(&self) -> Option<&str> {
        self.candidate_since.map(|_| self.candidate_text.as_str())
    }

    /// When the current candidate first appeared.
    pub fn candidate_since(&self) -> Option<Instant> {
        self.candidate_since
    }

    /// Feed one observation taken at `now`.
    pub fn observe(
        &mut self,
        text: &str,
        baseline: &str,
        now: Instant,
        stable: Duration,
    ) -> WindowEvent {
        if text.is_empty() || text == baseline {
            return if self.candidate_since.is_some() {
                WindowEvent::Glitch
            } else {
                WindowEvent::Waiting
            };
        }

        match self.candidate_since {
            Some(since) if self.candidate_text == text => {
                if now.saturating_duration_since(since) >= stable {
                    WindowEvent::Stable(self.candidate_text.clone())
                } else {
                    WindowEvent::Holding
                }
            }
            _ => {
                self.candidate_text.clear();
                self.candidate_text.push_str(text);
                self.candidate_since = Some(now);
                WindowEvent::Candidate
            }
        }
    }

    /// Consume the window, returning the candidate text or `""`.
    pub fn into_candidate(self) -> String {
        if self.candidate_since.is_some() {
            self.candidate_text
        } else {
            String::new()
        }
    }
}

/// Polls the reply region until the streamed reply settles.
///
/// Single-use per turn: each call starts with a fresh window and its own
/// timeout budget.
#[derive(Debug, Clone)]
pub struct CompletionDetector {
    reply_selector: String,
    config: DetectConfig,
}

impl CompletionDetector {
    pub fn new(reply_selector: impl Into<String>, config: DetectConfig) -> Self {
        Self {
            reply_selector: reply_selector.into(),
            config,
        }
    }

    pub fn config(&self) -> &DetectConfig {
        &self.config
    }

    /// Wait for a reply different from `baseline` to stop changing.
    pub async fn await_completion<P>(&self, page: &P, baseline: &str) -> DetectionOutcome
    where
        P: ChatPage + ?Sized,
    {
        let start = Instant::now();
        let timeout = Duration::from_millis(self.config.timeout_ms);
        let stable = Duration::from_millis(self.config.stable_ms);
        let poll = Duration::from_millis(self.config.poll_ms);
        let mut window = StabilityWindow::new();
        let mut polls: u64 = 0;
        let mut element_seen = false;

        while start.elapsed() < timeout {
            let observation = match page.query_last(&self.reply_selector).await {
                Ok(o) => o,
                Err(e) => {
                    warn!("Reply read failed after {} polls: {}", polls, e);
                    return DetectionOutcome::Failed(e.to_string());
                }
            };
            polls += 1;
            if observation.exists && !element_seen {
                element_seen = true;
                debug!("Reply element present after {} polls", polls);
            }

            let text = observation.visible_text();
            match window.observe(text, baseline, observation.observed_at, stable) {
                WindowEvent::Stable(text) => {
                    debug!(
                        "Reply stable after {} polls ({}ms, {} chars)",
                        polls,
                        start.elapsed().as_millis(),
                        text.chars().count()
                    );
                    return DetectionOutcome::Completed(text);
                }
                WindowEvent::Candidate => {
                    debug!(
                        "Reply changed ({} chars), dwell restarted",
                        text.chars().count()
                    );
                }
                WindowEvent::Glitch => {
                    debug!("Reply flickered to empty/baseline, ignoring");
                }
                WindowEvent::Waiting | WindowEvent::Holding => {}
            }

            let remaining = timeout.saturating_sub(start.elapsed());
            if remaining.is_zero() {
                break;
            }
            page.sleep(poll.min(remaining).as_millis() as u64).await;
        }

        if !element_seen {
            warn!(
                "No element ever matched reply selector '{}'",
                self.reply_selector
            );
        }
        let last = window.into_candidate();
        debug!(
            "Reply detection timed out after {} polls (partial: {} chars)",
            polls,
            last.chars().count()
        );
        DetectionOutcome::TimedOut(last)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Read, ScriptedPage};

    const STABLE: Duration = Duration::from_millis(2000);

    fn detector(stable_ms: u64, poll_ms: u64, timeout_ms: u64) -> CompletionDetector {
        CompletionDetector::new(
            ".reply",
            DetectConfig {
                stable_ms,
                poll_ms,
                timeout_ms,
            },
        )
    }

    #[test]
    fn test_window_waits_on_empty_and_baseline() {
        let mut window = StabilityWindow::new();
        let now = Instant::now();
        assert_eq!(window.observe("", "old", now, STABLE), WindowEvent::Waiting);
        assert_eq!(window.observe("old", "old", now, STABLE), WindowEvent::Waiting);
        assert!(window.candidate().is_none());
        assert_eq!(window.into_candidate(), "");
    }

    #[test]
    fn test_window_matures_after_dwell() {
        let mut window = StabilityWindow::new();
        let t0 = Instant::now();
        assert_eq!(window.observe("Hi", "", t0, STABLE), WindowEvent::Candidate);
        assert_eq!(
            window.observe("Hi", "", t0 + Duration::from_millis(1999), STABLE),
            WindowEvent::Holding
        );
        assert_eq!(
            window.observe("Hi", "", t0 + STABLE, STABLE),
            WindowEvent::Stable("Hi".into())
        );
    }

    #[test]
    fn test_window_change_restarts_dwell() {
        let mut window = StabilityWindow::new();
        let t0 = Instant::now();
        window.observe("He", "", t0, STABLE);
        let t1 = t0 + Duration::from_millis(1500);
        assert_eq!(window.observe("Hello", "", t1, STABLE), WindowEvent::Candidate);
        assert_eq!(window.candidate_since(), Some(t1));
        assert_eq!(
            window.observe("Hello", "", t0 + STABLE, STABLE),
            WindowEvent::Holding
        );
    }

    #[test]
    fn test_window_glitch_keeps_timer() {
        let mut window = StabilityWindow::new();
        let t0 = Instant::now();
        window.observe("Hello", "old", t0, STABLE);
        assert_eq!(
            window.observe("", "old", t0 + Duration::from_millis(900), STABLE),
            WindowEvent::Glitch
        );
        assert_eq!(
            window.observe("old", "old", t0 + Duration::from_millis(1200), STABLE),
            WindowEvent::Glitch
        );
        assert_eq!(window.candidate_since(), Some(t0));
        assert_eq!(
            window.observe("Hello", "old", t0 + STABLE, STABLE),
            WindowEvent::Stable("Hello".into())
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_streaming_reply_completes_after_dwell() {
        // Polls at 0, 300, 600, ...; "Hello" first seen at 600
        let page = ScriptedPage::new(vec![
            Read::text(""),
            Read::text("Hel"),
            Read::text("Hello"),
        ]);
        let start = Instant::now();
        let outcome = detector(2000, 300, 120_000).await_completion(&page, "").await;
        let elapsed = start.elapsed();

        assert_eq!(outcome, DetectionOutcome::Completed("Hello".into()));
        assert!(elapsed >= Duration::from_millis(2600), "{:?}", elapsed);
        assert!(elapsed < Duration::from_millis(2900), "{:?}", elapsed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_detached_element_never_completes() {
        // The bubble is removed right after first render; leftover text must
        // not count as the same reply holding still
        let page = ScriptedPage::new(vec![Read::text("Hello"), Read::Detached("Hello".into())]);
        let outcome = detector(1000, 100, 3_000).await_completion(&page, "").await;
        assert_eq!(outcome, DetectionOutcome::TimedOut("Hello".into()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_baseline_never_reported() {
        let page = ScriptedPage::new(vec![Read::text("old reply")]);
        let outcome = detector(2000, 300, 10_000)
            .await_completion(&page, "old reply")
            .await;
        assert_eq!(outcome, DetectionOutcome::TimedOut(String::new()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_absent_and_empty_time_out_empty() {
        let page = ScriptedPage::new(vec![Read::Absent, Read::text(""), Read::Absent]);
        let start = Instant::now();
        let outcome = detector(2000, 300, 5_000).await_completion(&page, "").await;
        assert_eq!(outcome, DetectionOutcome::TimedOut(String::new()));
        // The last sleep is clamped to the budget
        assert_eq!(start.elapsed(), Duration::from_millis(5_000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_oscillation_times_out_with_last_seen() {
        let script: Vec<Read> = (0..100)
            .map(|i| Read::text(if i % 2 == 0 { "A" } else { "B" }))
            .collect();
        let page = ScriptedPage::new(script);
        let outcome = detector(2000, 300, 6_000).await_completion(&page, "").await;

        // Reads at 0, 300, ..., 5700 => 20 reads, the last one is index 19
        assert_eq!(outcome, DetectionOutcome::TimedOut("B".into()));
        assert_eq!(page.reads(), 20);
    }

    #[tokio::test(start_paused = true)]
    async fn test_continuous_streaming_returns_partial() {
        let script: Vec<Read> = (1..=100).map(|i| Read::text("x".repeat(i))).collect();
        let page = ScriptedPage::new(script);
        let outcome = detector(2000, 300, 3_000).await_completion(&page, "").await;
        assert_eq!(outcome, DetectionOutcome::TimedOut("x".repeat(10)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rerun_with_own_output_makes_no_progress() {
        let page = ScriptedPage::new(vec![Read::text("first"), Read::text("Answer")]);
        let det = detector(1000, 100, 5_000);

        let first = det.await_completion(&page, "first").await;
        assert_eq!(first, DetectionOutcome::Completed("Answer".into()));

        let second = det.await_completion(&page, "Answer").await;
        assert_eq!(second, DetectionOutcome::TimedOut(String::new()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_flicker_does_not_delay_completion() {
        // Candidate at 0, flicker at 300 and 600, back from 900 on
        let page = ScriptedPage::new(vec![
            Read::text("Done"),
            Read::text(""),
            Read::text("prev"),
            Read::text("Done"),
        ]);
        let start = Instant::now();
        let outcome = detector(1000, 300, 10_000).await_completion(&page, "prev").await;
        assert_eq!(outcome, DetectionOutcome::Completed("Done".into()));
        assert_eq!(start.elapsed(), Duration::from_millis(1200));
    }

    #[tokio::test(start_paused = true)]
    async fn test_read_fault_fails_without_retry() {
        let page = ScriptedPage::new(vec![
            Read::text("partial"),
            Read::Fail("element detached".into()),
            Read::text("partial"),
        ]);
        let outcome = detector(2000, 300, 10_000).await_completion(&page, "").await;
        match outcome {
            DetectionOutcome::Failed(reason) => assert!(reason.contains("element detached")),
            other => panic!("Expected Failed, got {:?}", other),
        }
        assert_eq!(page.reads(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_compressed_timings() {
        let page = ScriptedPage::new(vec![Read::text("a"), Read::text("ab")]);
        let outcome = detector(10, 2, 100).await_completion(&page, "").await;
        assert_eq!(outcome, DetectionOutcome::Completed("ab".into()));
    }
}
