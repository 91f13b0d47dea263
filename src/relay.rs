//! Session-oriented streaming of execution progress.
//!
//! A session sends one `{code, cluster_id}` request and receives a sequence
//! of [`StreamEvent`]s: `status: running`, zero or more `output` events, then
//! `status: finished` or a single `error`. The producing strategy runs on its
//! own task and stops as soon as the subscriber goes away.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::remote::Language;
use crate::strategy::{ExecuteRequest, ExecutionStrategy};

const EVENT_BUFFER: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamStatus {
    Running,
    Finished,
}

/// Outbound frame: `{"type": "status" | "output" | "error", ...}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StreamEvent {
    Status { status: StreamStatus },
    Output { content: String },
    Error { message: String },
}

impl StreamEvent {
    pub fn running() -> Self {
        StreamEvent::Status {
            status: StreamStatus::Running,
        }
    }

    pub fn finished() -> Self {
        StreamEvent::Status {
            status: StreamStatus::Finished,
        }
    }

    pub fn output(content: impl Into<String>) -> Self {
        StreamEvent::Output {
            content: content.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        StreamEvent::Error {
            message: message.into(),
        }
    }

    /// True for the last event of a stream.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            StreamEvent::Error { .. }
                | StreamEvent::Status {
                    status: StreamStatus::Finished
                }
        )
    }
}

/// Inbound frame. Fields are optional so a missing one yields an error event
/// instead of a decode failure.
#[derive(Debug, Default, Deserialize)]
pub struct StreamRequest {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub cluster_id: Option<String>,
    #[serde(default)]
    pub language: Language,
}

impl StreamRequest {
    pub fn parse(text: &str) -> Result<ExecuteRequest, StreamEvent> {
        let request: StreamRequest = serde_json::from_str(text)
            .map_err(|e| StreamEvent::error(format!("Invalid stream request: {e}")))?;
        request.into_execute()
    }

    pub fn into_execute(self) -> Result<ExecuteRequest, StreamEvent> {
        match (self.code, self.cluster_id) {
            (Some(code), Some(cluster_id)) if !code.is_empty() && !cluster_id.is_empty() => {
                Ok(ExecuteRequest {
                    cluster_id,
                    code,
                    language: self.language,
                })
            }
            _ => Err(StreamEvent::error("Missing code or cluster_id")),
        }
    }
}

/// Run `strategy.stream` on its own task and hand back the event receiver.
///
/// Dropping the receiver is how a disconnected session stops the producer.
pub fn spawn_relay(
    strategy: Arc<dyn ExecutionStrategy>,
    request: ExecuteRequest,
) -> mpsc::Receiver<StreamEvent> {
    let (tx, rx) = mpsc::channel(EVENT_BUFFER);
    tokio::spawn(async move {
        tracing::info!(
            cluster_id = %request.cluster_id,
            strategy = strategy.name(),
            "Starting stream"
        );
        strategy.stream(&request, tx).await;
    });
    rx
}
