use std::io::{self, Write};

use anyhow::Result;
use chrono::Utc;
use serde::Serialize;
use serde_json::json;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing_subscriber::{fmt, EnvFilter};

use crate::{config::Cli, types::ControllerEvent};

/// Logs go to stderr; stdout carries the MCP stream in serve mode.
pub fn init_logging(cli: &Cli) -> Result<()> {
    let filter =
        EnvFilter::try_new(cli.log_level.clone()).unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(true)
        .with_ansi(false)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

#[derive(Clone, Debug)]
pub struct EventEmitter {
    json_output: bool,
}

impl EventEmitter {
    pub fn new(json_output: bool) -> Self {
        Self { json_output }
    }

    pub fn emit<T: Serialize>(&self, event_type: &str, payload: T) {
        if !self.json_output {
            return;
        }

        let line = json!({
            "ts": Utc::now().to_rfc3339(),
            "type": event_type,
            "payload": payload,
        });

        let mut stderr = io::stderr().lock();
        let _ = writeln!(stderr, "{}", line);
    }

    /// Forward controller events until the channel closes.
    pub async fn forward(self, mut rx: broadcast::Receiver<ControllerEvent>) {
        loop {
            match rx.recv().await {
                Ok(event) => self.emit(event.kind(), &event),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(target = "turn_mcp::events", skipped, "event emitter lagged");
                }
                Err(RecvError::Closed) => break,
            }
        }
    }
}
