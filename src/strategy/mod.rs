//! Execution strategies behind the caller-facing execute/stream contract.
//!
//! - [`RemoteStrategy`]: recovery handler + completion poller against a real cluster
//! - [`SimulatedStrategy`]: deterministic stand-in used without cluster credentials
//!
//! Which one serves a request is decided once per request by the service,
//! from configuration and the cluster id namespace; neither strategy knows
//! about the other.

pub mod remote;
pub mod simulated;

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::OrchestratorError;
use crate::executor::{CommandResult, ResultStatus};
use crate::relay::StreamEvent;
use crate::remote::Language;

pub use remote::RemoteStrategy;
pub use simulated::SimulatedStrategy;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecuteRequest {
    pub cluster_id: String,
    pub code: String,
    #[serde(default)]
    pub language: Language,
}

impl ExecuteRequest {
    pub fn new(cluster_id: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            cluster_id: cluster_id.into(),
            code: code.into(),
            language: Language::default(),
        }
    }

    pub fn with_language(mut self, language: Language) -> Self {
        self.language = language;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    Finished,
    Error,
    Timeout,
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionStatus::Finished => write!(f, "finished"),
            ExecutionStatus::Error => write!(f, "error"),
            ExecutionStatus::Timeout => write!(f, "timeout"),
        }
    }
}

/// Structured outcome returned to callers. Failures are values, never faults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub status: ExecutionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ExecutionResult {
    pub fn finished(output: impl Into<String>) -> Self {
        Self {
            status: ExecutionStatus::Finished,
            output: Some(output.into()),
            error: None,
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            status: ExecutionStatus::Error,
            output: None,
            error: Some(message.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == ExecutionStatus::Finished
    }
}

impl From<CommandResult> for ExecutionResult {
    fn from(result: CommandResult) -> Self {
        let status = match result.status {
            ResultStatus::Finished => ExecutionStatus::Finished,
            ResultStatus::Timeout => ExecutionStatus::Timeout,
            ResultStatus::Error | ResultStatus::Cancelled => ExecutionStatus::Error,
        };
        Self {
            status,
            output: result.output,
            error: result.error_message,
        }
    }
}

impl From<OrchestratorError> for ExecutionResult {
    fn from(err: OrchestratorError) -> Self {
        ExecutionResult::failed(err.to_string())
    }
}

/// Serves the execute and stream operations for one backend.
#[async_trait]
pub trait ExecutionStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    async fn execute(&self, request: &ExecuteRequest) -> ExecutionResult;

    /// Push `running`, output lines, then `finished` or an `error` event.
    ///
    /// Returns early once the receiving side of `events` is gone.
    async fn stream(&self, request: &ExecuteRequest, events: mpsc::Sender<StreamEvent>);
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn execute_request_language_defaults_to_python() {
        let req: ExecuteRequest =
            serde_json::from_value(json!({"cluster_id": "c1", "code": "1+1"})).unwrap();
        assert_eq!(req.language, Language::Python);
    }

    #[test]
    fn execute_request_rejects_unknown_language() {
        let res: Result<ExecuteRequest, _> = serde_json::from_value(
            json!({"cluster_id": "c1", "code": "1+1", "language": "cobol"}),
        );
        assert!(res.is_err());
    }

    #[test]
    fn cancelled_command_maps_to_error() {
        let result = ExecutionResult::from(CommandResult {
            status: ResultStatus::Cancelled,
            output: None,
            error_message: Some("cancelled".into()),
        });
        assert_eq!(result.status, ExecutionStatus::Error);
        assert_eq!(result.error.as_deref(), Some("cancelled"));
    }

    #[test]
    fn timeout_is_its_own_status() {
        let result = ExecutionResult::from(CommandResult::timeout("slow"));
        assert_eq!(result.status, ExecutionStatus::Timeout);
        assert!(!result.is_success());
    }

    #[test]
    fn result_serialization_skips_missing_fields() {
        let value = serde_json::to_value(ExecutionResult::finished("ok")).unwrap();
        assert_eq!(value, json!({"status": "finished", "output": "ok"}));
    }

    #[test]
    fn error_folds_into_result() {
        let result = ExecutionResult::from(OrchestratorError::RemoteApi {
            status: 500,
            message: "cluster unavailable".into(),
        });
        assert_eq!(result.status, ExecutionStatus::Error);
        assert!(result.error.unwrap().contains("cluster unavailable"));
    }
}
