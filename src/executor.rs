use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{OrchestratorError, Result};
use crate::remote::{ControlPlane, Language};

/// Lifecycle of a submitted command as observed by the poller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandStatus {
    Submitted,
    Running,
    Finished,
    Error,
    Cancelled,
    Timeout,
}

impl CommandStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, CommandStatus::Submitted | CommandStatus::Running)
    }
}

impl fmt::Display for CommandStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandStatus::Submitted => write!(f, "submitted"),
            CommandStatus::Running => write!(f, "running"),
            CommandStatus::Finished => write!(f, "finished"),
            CommandStatus::Error => write!(f, "error"),
            CommandStatus::Cancelled => write!(f, "cancelled"),
            CommandStatus::Timeout => write!(f, "timeout"),
        }
    }
}

/// One unit of code accepted by a remote execution context.
///
/// Only the completion poller advances `status`; a command id is never
/// reused, recovery always produces a fresh command.
#[derive(Debug, Clone, Serialize)]
pub struct Command {
    pub command_id: String,
    pub cluster_id: String,
    pub context_id: String,
    pub code: String,
    pub language: Language,
    pub submitted_at: DateTime<Utc>,
    status: CommandStatus,
}

impl Command {
    pub fn new(
        command_id: String,
        cluster_id: String,
        context_id: String,
        code: String,
        language: Language,
    ) -> Self {
        Self {
            command_id,
            cluster_id,
            context_id,
            code,
            language,
            submitted_at: Utc::now(),
            status: CommandStatus::Submitted,
        }
    }

    pub fn status(&self) -> CommandStatus {
        self.status
    }

    pub(crate) fn advance(&mut self, status: CommandStatus) {
        if self.status != status {
            tracing::trace!(command_id = %self.command_id, from = %self.status, to = %status, "Command status changed");
        }
        self.status = status;
    }
}

/// Terminal status of one submission attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultStatus {
    Finished,
    Error,
    Cancelled,
    Timeout,
}

impl fmt::Display for ResultStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResultStatus::Finished => write!(f, "finished"),
            ResultStatus::Error => write!(f, "error"),
            ResultStatus::Cancelled => write!(f, "cancelled"),
            ResultStatus::Timeout => write!(f, "timeout"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandResult {
    pub status: ResultStatus,
    pub output: Option<String>,
    pub error_message: Option<String>,
}

impl CommandResult {
    pub fn finished(output: impl Into<String>) -> Self {
        Self {
            status: ResultStatus::Finished,
            output: Some(output.into()),
            error_message: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: ResultStatus::Error,
            output: None,
            error_message: Some(message.into()),
        }
    }

    pub fn cancelled(message: impl Into<String>) -> Self {
        Self {
            status: ResultStatus::Cancelled,
            output: None,
            error_message: Some(message.into()),
        }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self {
            status: ResultStatus::Timeout,
            output: None,
            error_message: Some(message.into()),
        }
    }
}

/// Submits code into an existing execution context.
#[derive(Clone)]
pub struct CommandExecutor {
    control_plane: Arc<dyn ControlPlane>,
}

impl CommandExecutor {
    pub fn new(control_plane: Arc<dyn ControlPlane>) -> Self {
        Self { control_plane }
    }

    /// Submit `code` as a new command.
    ///
    /// A 400 or 404 from the remote side means the context (or cluster)
    /// reference is no longer valid and is reported as
    /// [`OrchestratorError::ContextInvalid`]. Everything else propagates unchanged.
    pub async fn submit(
        &self,
        cluster_id: &str,
        context_id: &str,
        code: &str,
        language: Language,
    ) -> Result<Command> {
        tracing::info!(cluster_id, context_id, language = %language, code_len = code.len(), "Submitting command");

        let command_id = self
            .control_plane
            .execute_command(cluster_id, context_id, language, code)
            .await
            .map_err(classify_submit_error)?;

        tracing::info!(cluster_id, context_id, command_id = %command_id, "Command accepted");

        Ok(Command::new(
            command_id,
            cluster_id.to_string(),
            context_id.to_string(),
            code.to_string(),
            language,
        ))
    }
}

fn classify_submit_error(err: OrchestratorError) -> OrchestratorError {
    match err {
        OrchestratorError::RemoteApi { status, message } if status == 400 || status == 404 => {
            OrchestratorError::ContextInvalid { status, message }
        }
        other => other,
    }
}
