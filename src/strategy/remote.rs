use async_trait::async_trait;
use tokio::sync::mpsc;

use super::{ExecuteRequest, ExecutionResult, ExecutionStatus, ExecutionStrategy};
use crate::recovery::RecoveryHandler;
use crate::relay::StreamEvent;

/// Executes against a real cluster through the recovery handler.
#[derive(Clone)]
pub struct RemoteStrategy {
    recovery: RecoveryHandler,
}

impl RemoteStrategy {
    pub fn new(recovery: RecoveryHandler) -> Self {
        Self { recovery }
    }

    pub fn recovery(&self) -> &RecoveryHandler {
        &self.recovery
    }
}

#[async_trait]
impl ExecutionStrategy for RemoteStrategy {
    fn name(&self) -> &'static str {
        "remote"
    }

    async fn execute(&self, request: &ExecuteRequest) -> ExecutionResult {
        match self
            .recovery
            .execute_with_recovery(&request.cluster_id, &request.code, request.language)
            .await
        {
            Ok(result) => result.into(),
            Err(e) => {
                tracing::warn!(cluster_id = %request.cluster_id, error = %e, "Execution failed");
                e.into()
            }
        }
    }

    async fn stream(&self, request: &ExecuteRequest, events: mpsc::Sender<StreamEvent>) {
        if events.send(StreamEvent::running()).await.is_err() {
            return;
        }

        // Losing the subscriber only stops our polling; the remote command keeps running.
        let result = tokio::select! {
            result = self.execute(request) => result,
            _ = events.closed() => {
                tracing::info!(cluster_id = %request.cluster_id, "Stream subscriber disconnected, no longer polling");
                return;
            }
        };

        match result.status {
            ExecutionStatus::Finished => {
                let output = result.output.unwrap_or_default();
                for line in output.lines() {
                    if events
                        .send(StreamEvent::output(format!("{line}\n")))
                        .await
                        .is_err()
                    {
                        return;
                    }
                }
                let _ = events.send(StreamEvent::finished()).await;
            }
            ExecutionStatus::Error | ExecutionStatus::Timeout => {
                let message = result
                    .error
                    .unwrap_or_else(|| format!("Execution {}", result.status));
                let _ = events.send(StreamEvent::error(message)).await;
            }
        }
    }
}
