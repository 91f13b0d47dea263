use thiserror::Error;

#[derive(Error, Debug)]
pub enum OrchestratorError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Execution context rejected by remote ({status}): {message}")]
    ContextInvalid { status: u16, message: String },

    #[error("Remote API error ({status}): {message}")]
    RemoteApi { status: u16, message: String },

    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Malformed remote payload: {0}")]
    Decode(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl OrchestratorError {
    /// HTTP status to report to callers of the API surface.
    pub fn http_status(&self) -> u16 {
        match self {
            OrchestratorError::Configuration(_) => 500,
            OrchestratorError::ContextInvalid { status, .. }
            | OrchestratorError::RemoteApi { status, .. } => {
                if (400..600).contains(status) {
                    *status
                } else {
                    502
                }
            }
            OrchestratorError::Transport(_) | OrchestratorError::Decode(_) => 502,
            OrchestratorError::Internal(_) => 500,
        }
    }

    /// A context-invalid error that survived recovery is reported as a plain remote error.
    pub fn escalate(self) -> Self {
        match self {
            OrchestratorError::ContextInvalid { status, message } => {
                OrchestratorError::RemoteApi { status, message }
            }
            other => other,
        }
    }
}

pub type Result<T> = std::result::Result<T, OrchestratorError>;
