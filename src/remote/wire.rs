use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Cluster as reported by `clusters/list`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteCluster {
    pub cluster_id: String,
    #[serde(default)]
    pub cluster_name: String,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub driver_node_type_id: Option<String>,
    #[serde(default)]
    pub node_type_id: Option<String>,
    #[serde(default)]
    pub num_workers: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct ClusterList {
    #[serde(default)]
    pub clusters: Vec<RemoteCluster>,
}

/// `{"id": "..."}` returned by context and command creation.
#[derive(Debug, Deserialize)]
pub(crate) struct IdResponse {
    pub id: String,
}

/// Command state strings reported by `commands/status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum RemoteCommandState {
    Queued,
    Running,
    Cancelling,
    Finished,
    Cancelled,
    Error,
    #[serde(other)]
    Unknown,
}

impl RemoteCommandState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RemoteCommandState::Finished | RemoteCommandState::Cancelled | RemoteCommandState::Error
        )
    }
}

/// Result payload of a finished command, discriminated by `resultType`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "resultType", rename_all = "lowercase")]
pub enum CommandOutput {
    Text {
        #[serde(default)]
        data: Value,
    },
    Table {
        #[serde(default)]
        data: Value,
        #[serde(default)]
        schema: Value,
    },
    Image {
        #[serde(rename = "fileName", default)]
        file_name: Option<String>,
    },
    Images {
        #[serde(rename = "fileNames", default)]
        file_names: Vec<String>,
    },
    Error {
        #[serde(default)]
        cause: Option<String>,
        #[serde(default)]
        summary: Option<String>,
    },
    #[serde(other)]
    Other,
}

impl CommandOutput {
    /// The remote-reported runtime failure, if this payload is one.
    pub fn error_cause(&self) -> Option<String> {
        match self {
            CommandOutput::Error { cause, summary } => Some(
                cause
                    .clone()
                    .or_else(|| summary.clone())
                    .unwrap_or_default(),
            ),
            _ => None,
        }
    }

    /// Render a success payload as caller-facing text.
    pub fn render(&self) -> String {
        match self {
            CommandOutput::Text { data } => value_to_text(data),
            CommandOutput::Table { data, .. } => value_to_text(data),
            CommandOutput::Image { file_name } => file_name.clone().unwrap_or_default(),
            CommandOutput::Images { file_names } => file_names.join("\n"),
            CommandOutput::Error { .. } | CommandOutput::Other => String::new(),
        }
    }
}

fn value_to_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Body of `commands/status`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RemoteCommandStatus {
    #[serde(default)]
    pub id: Option<String>,
    pub status: RemoteCommandState,
    #[serde(default)]
    pub results: Option<CommandOutput>,
}

/// Error body returned by the control plane on non-success responses.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct ErrorBody {
    #[serde(default)]
    pub error_code: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

impl ErrorBody {
    pub fn describe(self) -> Option<String> {
        let message = self.message.or(self.error)?;
        Some(match self.error_code {
            Some(code) => format!("{code}: {message}"),
            None => message,
        })
    }
}
