use std::net::SocketAddr;
use std::time::Duration;

/// Connection settings for the remote control plane.
///
/// Both the workspace URL and the bearer token must be present for real
/// cluster operations. When either is missing every execution request is
/// served by the simulated executor instead.
#[derive(Debug, Clone)]
pub struct RemoteConfig {
    /// Base URL of the workspace, e.g. `https://adb-123.azuredatabricks.net`
    pub workspace_url: Option<String>,
    /// Bearer token sent with every request
    pub token: Option<String>,
    /// Per-request timeout for control plane calls
    pub request_timeout_ms: u64,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            workspace_url: None,
            token: None,
            request_timeout_ms: 30_000,
        }
    }
}

impl RemoteConfig {
    pub fn new(workspace_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            workspace_url: Some(workspace_url.into()),
            token: Some(token.into()),
            ..Default::default()
        }
    }

    /// Check if both the endpoint and the credential are set.
    pub fn is_complete(&self) -> bool {
        non_empty(&self.workspace_url) && non_empty(&self.token)
    }

    /// True when exactly one of URL and token is set.
    pub fn is_partial(&self) -> bool {
        non_empty(&self.workspace_url) != non_empty(&self.token)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

fn non_empty(value: &Option<String>) -> bool {
    value.as_deref().is_some_and(|v| !v.trim().is_empty())
}

/// Attempt-counted polling policy for command completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    /// Number of status queries before giving up with a timeout
    pub max_attempts: u32,
    /// Sleep before every status query
    pub interval_ms: u64,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 60,
            interval_ms: 1_000,
        }
    }
}

impl PollPolicy {
    pub fn new(max_attempts: u32, interval_ms: u64) -> Self {
        Self {
            max_attempts,
            interval_ms,
        }
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    /// Longest time a caller can wait before seeing a timeout.
    pub fn budget(&self) -> Duration {
        self.interval() * self.max_attempts
    }
}

/// Settings for the simulated executor used without real cluster credentials.
#[derive(Debug, Clone)]
pub struct SimulationConfig {
    /// Cluster ids starting with this prefix are always simulated
    pub cluster_prefix: String,
    /// Delay before a simulated one-shot execution returns
    pub execute_delay_ms: u64,
    /// Cadence of simulated streaming output lines
    pub line_delay_ms: u64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            cluster_prefix: "mock-".to_string(),
            execute_delay_ms: 1_000,
            line_delay_ms: 500,
        }
    }
}

impl SimulationConfig {
    pub fn is_simulated_cluster(&self, cluster_id: &str) -> bool {
        cluster_id.starts_with(&self.cluster_prefix)
    }
}

/// Blob storage settings used by the storage mount helper.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub container: String,
    /// `DefaultEndpointsProtocol=...;AccountName=...;AccountKey=...`
    pub connection_string: Option<String>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            container: "uploads".to_string(),
            connection_string: None,
        }
    }
}

impl StorageConfig {
    pub fn account_name(&self) -> Option<String> {
        self.connection_field("AccountName=")
    }

    pub fn account_key(&self) -> Option<String> {
        self.connection_field("AccountKey=")
    }

    fn connection_field(&self, prefix: &str) -> Option<String> {
        self.connection_string
            .as_deref()?
            .split(';')
            .find_map(|part| part.trim().strip_prefix(prefix))
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub listen_addr: SocketAddr,
    pub remote: RemoteConfig,
    pub poll: PollPolicy,
    pub simulation: SimulationConfig,
    pub storage: StorageConfig,
    /// Cluster used by CLI commands when none is given
    pub default_cluster_id: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([127, 0, 0, 1], 8000)),
            remote: RemoteConfig::default(),
            poll: PollPolicy::default(),
            simulation: SimulationConfig::default(),
            storage: StorageConfig::default(),
            default_cluster_id: None,
        }
    }
}

impl ServerConfig {
    pub fn new(listen_addr: SocketAddr) -> Self {
        Self {
            listen_addr,
            ..Default::default()
        }
    }

    /// Build a config from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from an arbitrary key lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let mut config = Self::default();
        config.remote.workspace_url = get("DATABRICKS_WORKSPACE_URL");
        config.remote.token = get("DATABRICKS_TOKEN");
        config.default_cluster_id = get("DATABRICKS_CLUSTER_ID");
        config.storage.connection_string = get("AZURE_STORAGE_CONNECTION_STRING");
        if let Some(container) = get("AZURE_STORAGE_CONTAINER") {
            config.storage.container = container;
        }
        config
    }

    pub fn with_remote(mut self, remote: RemoteConfig) -> Self {
        self.remote = remote;
        self
    }

    pub fn with_poll(mut self, poll: PollPolicy) -> Self {
        self.poll = poll;
        self
    }
}
