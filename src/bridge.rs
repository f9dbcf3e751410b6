//! Agent side of the handshake.
//!
//! `pause_and_wait` publishes a waiting status record and then polls the
//! mailbox until the controller supplies an input payload or flags the wait
//! as canceled. It has no timeout; callers that need one wrap it.

use std::time::{Duration, Instant};

use tokio::time::MissedTickBehavior;

use crate::{
    error::BridgeError,
    mailbox::Mailbox,
    types::{StatusRecord, CANCELED_SENTINEL},
};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);
pub const DEFAULT_HEARTBEAT_TICKS: u64 = 20;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WaitOutcome {
    Input(String),
    Canceled,
}

impl WaitOutcome {
    pub fn into_text(self) -> String {
        match self {
            WaitOutcome::Input(text) => text,
            WaitOutcome::Canceled => CANCELED_SENTINEL.to_string(),
        }
    }
}

#[derive(Debug)]
pub struct AgentBridge<M> {
    mailbox: M,
    poll_interval: Duration,
    heartbeat_ticks: u64,
}

impl<M: Mailbox> AgentBridge<M> {
    pub fn new(mailbox: M) -> Self {
        Self {
            mailbox,
            poll_interval: DEFAULT_POLL_INTERVAL,
            heartbeat_ticks: DEFAULT_HEARTBEAT_TICKS,
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_heartbeat_ticks(mut self, ticks: u64) -> Self {
        self.heartbeat_ticks = ticks.max(1);
        self
    }

    pub fn mailbox(&self) -> &M {
        &self.mailbox
    }

    /// Block until the human supplies the next instruction or cancels.
    ///
    /// Returns the input text, or [`CANCELED_SENTINEL`] on cancellation.
    /// Failing to publish either status record is fatal: an unannounced wait
    /// would deadlock the handshake.
    pub async fn pause_and_wait(
        &self,
        context: &str,
        question: Option<&str>,
    ) -> Result<String, BridgeError> {
        if context.trim().is_empty() {
            return Err(BridgeError::EmptyContext);
        }
        let question = question.filter(|q| !q.trim().is_empty());

        // Clear before publishing: once the waiting record is visible the
        // controller may deliver, and that payload must survive.
        if let Err(error) = self.mailbox.clear_input() {
            tracing::warn!(target = "turn_mcp::bridge", error = %error, "failed to clear stale input payload");
        }
        self.mailbox
            .write_status(&StatusRecord::waiting(context, question))?;

        tracing::info!(
            target = "turn_mcp::bridge",
            context = %context,
            question = question.unwrap_or_default(),
            "waiting for user input"
        );

        let outcome = self.wait_for_outcome().await;

        self.mailbox.write_status(&StatusRecord::finished())?;

        match &outcome {
            WaitOutcome::Input(text) => {
                tracing::info!(target = "turn_mcp::bridge", input = %preview(text, 100), "received user input");
            }
            WaitOutcome::Canceled => {
                tracing::info!(target = "turn_mcp::bridge", "wait canceled by user");
            }
        }
        Ok(outcome.into_text())
    }

    async fn wait_for_outcome(&self) -> WaitOutcome {
        let started = Instant::now();
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut idle_ticks: u64 = 0;

        loop {
            ticker.tick().await;
            if let Some(outcome) = self.poll_once() {
                return outcome;
            }
            idle_ticks += 1;
            if idle_ticks % self.heartbeat_ticks == 0 {
                tracing::info!(
                    target = "turn_mcp::bridge",
                    elapsed_secs = started.elapsed().as_secs(),
                    "still waiting for user input"
                );
            }
        }
    }

    /// One polling tick. `None` means keep waiting.
    pub fn poll_once(&self) -> Option<WaitOutcome> {
        // Unreadable status is a writer race; try again next tick.
        let status = self.mailbox.read_status()?;

        if status.is_canceled() {
            self.clear_input_quietly();
            return Some(WaitOutcome::Canceled);
        }

        let input = self.mailbox.read_input()?;
        self.clear_input_quietly();
        Some(WaitOutcome::Input(input))
    }

    fn clear_input_quietly(&self) {
        if let Err(error) = self.mailbox.clear_input() {
            tracing::warn!(target = "turn_mcp::bridge", error = %error, "failed to clear input payload");
        }
    }
}

pub(crate) fn preview(text: &str, max_chars: usize) -> String {
    let mut chars = text.chars();
    let head: String = chars.by_ref().take(max_chars).collect();
    if chars.next().is_some() {
        format!("{head}...")
    } else {
        head
    }
}
