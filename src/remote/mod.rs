//! Remote control plane collaborator.
//!
//! The orchestrator never talks HTTP directly; every remote operation goes
//! through the [`ControlPlane`] trait so the context manager, executor and
//! poller can be driven by an in-memory fake in tests.
//!
//! - [`HttpControlPlane`]: REST client for the workspace API (bearer auth)
//! - [`wire`]: JSON payloads exchanged with the control plane

pub mod http;
pub mod wire;

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

pub use http::HttpControlPlane;
pub use wire::{CommandOutput, RemoteCluster, RemoteCommandState, RemoteCommandStatus};

/// Interpreter language of an execution context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    Python,
    Scala,
    Sql,
    R,
}

impl Language {
    pub fn as_str(&self) -> &'static str {
        match self {
            Language::Python => "python",
            Language::Scala => "scala",
            Language::Sql => "sql",
            Language::R => "r",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Language {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "python" => Ok(Language::Python),
            "scala" => Ok(Language::Scala),
            "sql" => Ok(Language::Sql),
            "r" => Ok(Language::R),
            other => Err(format!("unsupported language: {other}")),
        }
    }
}

/// Operations consumed from the remote control plane.
///
/// Implementations report every non-success response as
/// [`OrchestratorError::RemoteApi`](crate::error::OrchestratorError::RemoteApi)
/// with the remote status; classifying a rejection as a stale context is the
/// caller's job.
#[async_trait]
pub trait ControlPlane: Send + Sync {
    async fn list_clusters(&self) -> Result<Vec<RemoteCluster>>;

    async fn start_cluster(&self, cluster_id: &str) -> Result<()>;

    /// Terminates the running instance. The cluster configuration survives.
    async fn delete_cluster(&self, cluster_id: &str) -> Result<()>;

    async fn create_context(&self, cluster_id: &str, language: Language) -> Result<String>;

    async fn destroy_context(&self, cluster_id: &str, context_id: &str) -> Result<()>;

    async fn execute_command(
        &self,
        cluster_id: &str,
        context_id: &str,
        language: Language,
        code: &str,
    ) -> Result<String>;

    async fn command_status(
        &self,
        cluster_id: &str,
        context_id: &str,
        command_id: &str,
    ) -> Result<RemoteCommandStatus>;

    /// Not called by the orchestrator; abandoned commands keep running remotely.
    /// Kept on the trait so tests can assert that nothing is ever cancelled.
    async fn cancel_command(
        &self,
        cluster_id: &str,
        context_id: &str,
        command_id: &str,
    ) -> Result<()>;
}
