use std::sync::Arc;
use std::time::Duration;

use crate::config::PollPolicy;
use crate::executor::{Command, CommandResult, CommandStatus, ResultStatus};
use crate::remote::{ControlPlane, RemoteCommandState};

pub const FAILED_OR_CANCELLED: &str = "Execution failed or cancelled";
pub const TIMED_OUT: &str = "Execution timed out";

/// Drives a submitted command to a terminal state by repeated status queries.
///
/// Every attempt sleeps first and then queries, so nothing is assumed ready
/// at submission time. When the attempt budget runs out the command is left
/// running remotely; no cancel request is sent.
#[derive(Clone)]
pub struct CompletionPoller {
    control_plane: Arc<dyn ControlPlane>,
    policy: PollPolicy,
}

impl CompletionPoller {
    pub fn new(control_plane: Arc<dyn ControlPlane>, policy: PollPolicy) -> Self {
        Self {
            control_plane,
            policy,
        }
    }

    /// Poll with the configured policy.
    pub async fn await_completion(&self, command: &mut Command) -> CommandResult {
        self.await_with(command, self.policy.max_attempts, self.policy.interval())
            .await
    }

    pub async fn await_with(
        &self,
        command: &mut Command,
        max_attempts: u32,
        interval: Duration,
    ) -> CommandResult {
        for attempt in 1..=max_attempts {
            tokio::time::sleep(interval).await;

            let status = match self
                .control_plane
                .command_status(&command.cluster_id, &command.context_id, &command.command_id)
                .await
            {
                Ok(status) => status,
                Err(e) => {
                    tracing::warn!(command_id = %command.command_id, attempt, error = %e, "Status query failed");
                    command.advance(CommandStatus::Error);
                    return CommandResult::error(format!("Status query failed: {e}"));
                }
            };

            tracing::debug!(command_id = %command.command_id, attempt, state = ?status.status, "Polled command");

            match status.status {
                RemoteCommandState::Finished => {
                    let result = match status.results {
                        Some(output) => match output.error_cause() {
                            Some(cause) => CommandResult::error(cause),
                            None => CommandResult::finished(output.render()),
                        },
                        None => CommandResult::finished(String::new()),
                    };
                    command.advance(match result.status {
                        ResultStatus::Finished => CommandStatus::Finished,
                        _ => CommandStatus::Error,
                    });
                    tracing::info!(command_id = %command.command_id, attempt, status = %result.status, "Command completed");
                    return result;
                }
                RemoteCommandState::Cancelled | RemoteCommandState::Error => {
                    let cancelled = status.status == RemoteCommandState::Cancelled;
                    let message = status
                        .results
                        .and_then(|output| output.error_cause())
                        .filter(|cause| !cause.is_empty())
                        .unwrap_or_else(|| FAILED_OR_CANCELLED.to_string());
                    tracing::info!(command_id = %command.command_id, attempt, state = ?status.status, "Command failed remotely");
                    if cancelled {
                        command.advance(CommandStatus::Cancelled);
                        return CommandResult::cancelled(message);
                    }
                    command.advance(CommandStatus::Error);
                    return CommandResult::error(message);
                }
                _ => command.advance(CommandStatus::Running),
            }
        }

        tracing::warn!(
            command_id = %command.command_id,
            cluster_id = %command.cluster_id,
            max_attempts,
            "Gave up waiting for command, leaving it running remotely"
        );
        command.advance(CommandStatus::Timeout);
        CommandResult::timeout(TIMED_OUT)
    }
}
