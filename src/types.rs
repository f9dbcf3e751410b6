use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Returned by the `turn` tool when the human aborts an outstanding wait.
pub const CANCELED_SENTINEL: &str = "[canceled]";

/// The single mutable document shared through the mailbox.
///
/// Every writer always writes a complete record; there are no partial
/// updates. `timestamp` is diagnostic only and never drives ordering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusRecord {
    #[serde(default)]
    pub waiting: bool,
    #[serde(default)]
    pub context: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub question: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub canceled: Option<bool>,
    #[serde(default)]
    pub timestamp: i64,
}

impl StatusRecord {
    /// Published by the agent bridge when it starts blocking.
    pub fn waiting(context: &str, question: Option<&str>) -> Self {
        Self {
            waiting: true,
            context: Some(context.to_string()),
            question: question.map(ToOwned::to_owned),
            canceled: None,
            timestamp: now_millis(),
        }
    }

    /// Published by the agent bridge when a wait ends, fed or canceled.
    pub fn finished() -> Self {
        Self {
            waiting: false,
            context: Some(String::new()),
            question: None,
            canceled: None,
            timestamp: now_millis(),
        }
    }

    /// Written by the controller to abort a wait.
    pub fn canceled() -> Self {
        Self {
            waiting: false,
            context: None,
            question: None,
            canceled: Some(true),
            timestamp: now_millis(),
        }
    }

    pub fn is_canceled(&self) -> bool {
        self.canceled.unwrap_or(false)
    }

    pub fn context_str(&self) -> &str {
        self.context.as_deref().unwrap_or_default()
    }
}

pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// The controller's belief about the agent bridge, as handed to callers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControllerStatus {
    pub running: bool,
    pub waiting: bool,
    pub context: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub question: Option<String>,
}

/// Notifications delivered to controller subscribers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ControllerEvent {
    StatusChanged {
        status: ControllerStatus,
        queue_len: usize,
    },
    Waiting {
        context: String,
        question: Option<String>,
    },
    Log {
        message: String,
    },
}

impl ControllerEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            ControllerEvent::StatusChanged { .. } => "status_changed",
            ControllerEvent::Waiting { .. } => "waiting",
            ControllerEvent::Log { .. } => "log",
        }
    }
}

/// How `Controller::submit_input` disposed of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Submission {
    /// Written straight into the input payload.
    Delivered,
    /// Appended to the message queue (or requeued after a failed write).
    Queued,
    /// Blank after trimming; dropped.
    Ignored,
}
