use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::config::SimulationConfig;
use crate::error::{OrchestratorError, Result};
use crate::remote::{ControlPlane, RemoteCluster};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LifecycleState {
    Running,
    Terminated,
    Pending,
    Unknown,
}

impl LifecycleState {
    /// Map a control plane state string onto the four lifecycle states.
    pub fn from_remote(state: &str) -> Self {
        match state.to_ascii_uppercase().as_str() {
            "RUNNING" => LifecycleState::Running,
            "PENDING" | "RESTARTING" | "RESIZING" => LifecycleState::Pending,
            "TERMINATING" | "TERMINATED" => LifecycleState::Terminated,
            _ => LifecycleState::Unknown,
        }
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LifecycleState::Running => write!(f, "RUNNING"),
            LifecycleState::Terminated => write!(f, "TERMINATED"),
            LifecycleState::Pending => write!(f, "PENDING"),
            LifecycleState::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

/// Caller-facing view of a cluster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cluster {
    #[serde(rename = "cluster_id")]
    pub id: String,
    #[serde(rename = "cluster_name")]
    pub display_name: String,
    #[serde(rename = "state")]
    pub lifecycle_state: LifecycleState,
    #[serde(rename = "driver_type")]
    pub driver_spec: Option<String>,
    #[serde(rename = "worker_type")]
    pub worker_spec: Option<String>,
    #[serde(rename = "num_workers")]
    pub worker_count: Option<u32>,
}

impl From<RemoteCluster> for Cluster {
    fn from(remote: RemoteCluster) -> Self {
        Self {
            lifecycle_state: LifecycleState::from_remote(&remote.state),
            id: remote.cluster_id,
            display_name: remote.cluster_name,
            driver_spec: remote.driver_node_type_id,
            worker_spec: remote.node_type_id,
            worker_count: remote.num_workers,
        }
    }
}

/// Acknowledgement of a start/stop request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterAck {
    pub message: String,
    pub cluster_id: String,
}

/// Passthrough to the control plane's cluster operations.
///
/// Without a control plane (no credentials) listing returns the fixed
/// simulated clusters. Ids in the simulated namespace are acknowledged
/// locally in either mode.
#[derive(Clone)]
pub struct ClusterDirectory {
    control_plane: Option<Arc<dyn ControlPlane>>,
    simulation: SimulationConfig,
}

impl ClusterDirectory {
    pub fn new(control_plane: Option<Arc<dyn ControlPlane>>, simulation: SimulationConfig) -> Self {
        Self {
            control_plane,
            simulation,
        }
    }

    pub async fn list(&self) -> Result<Vec<Cluster>> {
        match &self.control_plane {
            Some(control_plane) => {
                let clusters: Vec<Cluster> = control_plane
                    .list_clusters()
                    .await?
                    .into_iter()
                    .map(Cluster::from)
                    .collect();
                tracing::debug!(count = clusters.len(), "Listed clusters");
                Ok(clusters)
            }
            None => Ok(simulated_clusters(&self.simulation.cluster_prefix)),
        }
    }

    pub async fn start(&self, cluster_id: &str) -> Result<ClusterAck> {
        if self.simulation.is_simulated_cluster(cluster_id) {
            return Ok(ack("Mock cluster started", cluster_id));
        }
        self.require_control_plane()?.start_cluster(cluster_id).await?;
        tracing::info!(cluster_id, "Cluster start requested");
        Ok(ack("Cluster start initiated", cluster_id))
    }

    /// Stop the running instance. Remotely this is a delete; the cluster
    /// definition is kept and can be started again.
    pub async fn stop(&self, cluster_id: &str) -> Result<ClusterAck> {
        if self.simulation.is_simulated_cluster(cluster_id) {
            return Ok(ack("Mock cluster stopped", cluster_id));
        }
        self.require_control_plane()?.delete_cluster(cluster_id).await?;
        tracing::info!(cluster_id, "Cluster termination requested");
        Ok(ack("Cluster termination initiated", cluster_id))
    }

    fn require_control_plane(&self) -> Result<&Arc<dyn ControlPlane>> {
        self.control_plane.as_ref().ok_or_else(|| {
            OrchestratorError::Configuration("remote cluster configuration missing".to_string())
        })
    }
}

fn ack(message: &str, cluster_id: &str) -> ClusterAck {
    ClusterAck {
        message: message.to_string(),
        cluster_id: cluster_id.to_string(),
    }
}

fn simulated_clusters(prefix: &str) -> Vec<Cluster> {
    vec![
        Cluster {
            id: format!("{prefix}cluster-1"),
            display_name: "Standard Cluster (Dev)".to_string(),
            lifecycle_state: LifecycleState::Running,
            driver_spec: Some("Standard_DS3_v2".to_string()),
            worker_spec: None,
            worker_count: Some(2),
        },
        Cluster {
            id: format!("{prefix}cluster-2"),
            display_name: "ML Cluster (GPU)".to_string(),
            lifecycle_state: LifecycleState::Terminated,
            driver_spec: Some("Standard_NC6".to_string()),
            worker_spec: None,
            worker_count: Some(1),
        },
    ]
}
