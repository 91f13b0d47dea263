use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::api::{router, AppState};
use crate::cluster::ClusterDirectory;
use crate::config::ServerConfig;
use crate::context::ContextManager;
use crate::error::{OrchestratorError, Result};
use crate::executor::CommandExecutor;
use crate::poller::CompletionPoller;
use crate::recovery::RecoveryHandler;
use crate::relay::{spawn_relay, StreamEvent};
use crate::remote::{ControlPlane, HttpControlPlane};
use crate::storage::{self, MountResponse};
use crate::strategy::{
    ExecuteRequest, ExecutionResult, ExecutionStatus, ExecutionStrategy, RemoteStrategy,
    SimulatedStrategy,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Remote,
    Simulated,
}

/// Owns every orchestrator component and routes requests to a strategy.
///
/// All collaborators are constructed here and injected downward; there is no
/// process-global state.
pub struct Orchestrator {
    config: ServerConfig,
    directory: ClusterDirectory,
    contexts: Option<Arc<ContextManager>>,
    remote: Option<Arc<RemoteStrategy>>,
    simulated: Arc<SimulatedStrategy>,
}

impl Orchestrator {
    /// Build from configuration, using the HTTP control plane when credentials are complete.
    pub fn new(config: ServerConfig) -> Result<Self> {
        if config.remote.is_complete() {
            let control_plane: Arc<dyn ControlPlane> =
                Arc::new(HttpControlPlane::new(&config.remote)?);
            return Ok(Self::with_control_plane(config, control_plane));
        }

        if config.remote.is_partial() {
            tracing::warn!("Remote configuration incomplete (need both workspace URL and token), using simulated executor");
        }
        Ok(Self::simulated(config))
    }

    /// Build around an explicit control plane.
    pub fn with_control_plane(config: ServerConfig, control_plane: Arc<dyn ControlPlane>) -> Self {
        let contexts = Arc::new(ContextManager::new(control_plane.clone()));
        let recovery = RecoveryHandler::new(
            contexts.clone(),
            CommandExecutor::new(control_plane.clone()),
            CompletionPoller::new(control_plane.clone(), config.poll),
        );

        Self {
            directory: ClusterDirectory::new(Some(control_plane), config.simulation.clone()),
            contexts: Some(contexts),
            remote: Some(Arc::new(RemoteStrategy::new(recovery))),
            simulated: Arc::new(SimulatedStrategy::new(config.simulation.clone())),
            config,
        }
    }

    /// Build with no remote side at all.
    pub fn simulated(config: ServerConfig) -> Self {
        Self {
            directory: ClusterDirectory::new(None, config.simulation.clone()),
            contexts: None,
            remote: None,
            simulated: Arc::new(SimulatedStrategy::new(config.simulation.clone())),
            config,
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn mode(&self) -> Mode {
        if self.remote.is_some() {
            Mode::Remote
        } else {
            Mode::Simulated
        }
    }

    pub fn directory(&self) -> &ClusterDirectory {
        &self.directory
    }

    pub fn contexts(&self) -> Option<&Arc<ContextManager>> {
        self.contexts.as_ref()
    }

    /// Strategy serving `cluster_id`: simulated without credentials or for
    /// ids in the simulated namespace, remote otherwise.
    pub fn strategy_for(&self, cluster_id: &str) -> Arc<dyn ExecutionStrategy> {
        match &self.remote {
            Some(remote) if !self.config.simulation.is_simulated_cluster(cluster_id) => {
                remote.clone()
            }
            _ => self.simulated.clone(),
        }
    }

    pub async fn execute(&self, request: &ExecuteRequest) -> ExecutionResult {
        let strategy = self.strategy_for(&request.cluster_id);
        tracing::info!(
            cluster_id = %request.cluster_id,
            language = %request.language,
            strategy = strategy.name(),
            "Executing request"
        );
        let result = strategy.execute(request).await;
        tracing::info!(cluster_id = %request.cluster_id, status = %result.status, "Execution finished");
        result
    }

    pub fn stream(&self, request: ExecuteRequest) -> tokio::sync::mpsc::Receiver<StreamEvent> {
        let strategy = self.strategy_for(&request.cluster_id);
        spawn_relay(strategy, request)
    }

    /// Destroy the cluster's cached context. Nothing cached is not an error.
    pub async fn destroy_context(&self, cluster_id: &str) -> Result<bool> {
        match &self.contexts {
            Some(contexts) => contexts.destroy(cluster_id).await,
            None => Ok(false),
        }
    }

    /// Mount the configured blob container on a cluster by executing a script there.
    pub async fn mount_storage(&self, cluster_id: &str) -> Result<MountResponse> {
        if self.config.simulation.is_simulated_cluster(cluster_id) {
            return Ok(MountResponse::simulated());
        }

        let script = storage::mount_script(&self.config.storage)?;
        let result = self.execute(&ExecuteRequest::new(cluster_id, script)).await;

        match result.status {
            ExecutionStatus::Finished => Ok(MountResponse {
                message: "Storage mount command executed".to_string(),
                mount_point: Some(storage::mount_point(&self.config.storage)),
                output: result.output,
            }),
            ExecutionStatus::Error | ExecutionStatus::Timeout => {
                Err(OrchestratorError::Internal(format!(
                    "Mount failed: {}",
                    result
                        .error
                        .unwrap_or_else(|| result.status.to_string())
                )))
            }
        }
    }
}

/// Serve the HTTP API until `shutdown` is cancelled.
pub async fn run_server(
    config: ServerConfig,
    shutdown: CancellationToken,
) -> std::result::Result<(), Box<dyn std::error::Error>> {
    let listen_addr = config.listen_addr;
    let orchestrator = Arc::new(Orchestrator::new(config)?);

    tracing::info!(
        listen_addr = %listen_addr,
        mode = ?orchestrator.mode(),
        poll_attempts = orchestrator.config().poll.max_attempts,
        poll_interval_ms = orchestrator.config().poll.interval_ms,
        default_cluster = ?orchestrator.config().default_cluster_id,
        "Starting remote-exec server"
    );

    let app = router(AppState {
        orchestrator,
        shutdown: shutdown.clone(),
    });

    let listener = match tokio::net::TcpListener::bind(listen_addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(addr = %listen_addr, error = %e, "Failed to bind server");
            return Err(e.into());
        }
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}
