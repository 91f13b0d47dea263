use clap::{Parser, ValueEnum};
use futures_util::{SinkExt, StreamExt};
use serde::de::DeserializeOwned;
use std::net::SocketAddr;
use std::path::PathBuf;
use tokio_tungstenite::tungstenite::Message;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use remote_exec::api::{MessageResponse, API_PREFIX};
use remote_exec::cluster::{Cluster, ClusterAck};
use remote_exec::config::{PollPolicy, RemoteConfig, ServerConfig};
use remote_exec::error::OrchestratorError;
use remote_exec::relay::StreamEvent;
use remote_exec::remote::{ControlPlane, HttpControlPlane, Language};
use remote_exec::service::run_server;
use remote_exec::shutdown::install_shutdown_handler;
use remote_exec::strategy::{ExecuteRequest, ExecutionResult, ExecutionStatus};

#[derive(Parser, Debug)]
#[command(name = "remote-exec")]
#[command(version)]
#[command(about = "Run code on shared compute clusters through managed execution contexts")]
#[command(propagate_version = true)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Start the orchestrator HTTP server
    Server(ServerArgs),

    /// Cluster management commands
    Clusters {
        #[command(flatten)]
        client: ClientArgs,

        #[command(subcommand)]
        command: ClusterCommands,
    },

    /// Execute code on a cluster and wait for the result
    Exec {
        #[command(flatten)]
        client: ClientArgs,

        #[command(flatten)]
        exec: ExecArgs,
    },

    /// Execute code and print output as it streams back
    Stream {
        #[command(flatten)]
        client: ClientArgs,

        #[command(flatten)]
        exec: ExecArgs,
    },

    /// Execution context commands
    Context {
        #[command(flatten)]
        client: ClientArgs,

        #[command(subcommand)]
        command: ContextCommands,
    },

    /// Check connectivity to the remote control plane
    Check(RemoteArgs),
}

// =============================================================================
// Server Arguments
// =============================================================================

#[derive(Parser, Debug)]
struct ServerArgs {
    /// Address to listen on
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Port to listen on
    #[arg(long, default_value = "8000")]
    port: u16,

    #[command(flatten)]
    remote: RemoteArgs,

    /// Status polls before a command is reported as timed out
    #[arg(long, default_value = "60")]
    poll_attempts: u32,

    /// Delay before each status poll, in milliseconds
    #[arg(long, default_value = "1000")]
    poll_interval_ms: u64,
}

#[derive(Parser, Debug)]
struct RemoteArgs {
    /// Workspace URL of the remote control plane
    #[arg(long, env = "DATABRICKS_WORKSPACE_URL")]
    workspace_url: Option<String>,

    /// Bearer token for the remote control plane
    #[arg(long, env = "DATABRICKS_TOKEN", hide_env_values = true)]
    token: Option<String>,
}

impl RemoteArgs {
    fn into_config(self) -> RemoteConfig {
        RemoteConfig {
            workspace_url: self.workspace_url,
            token: self.token,
            ..RemoteConfig::default()
        }
    }
}

// =============================================================================
// Client Arguments
// =============================================================================

#[derive(Parser, Debug)]
struct ClientArgs {
    /// Orchestrator server address
    #[arg(long, short = 'a', default_value = "http://127.0.0.1:8000")]
    addr: String,

    /// Output format
    #[arg(long, short = 'o', default_value = "table")]
    output: OutputFormat,
}

#[derive(Debug, Clone, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
}

#[derive(clap::Subcommand, Debug)]
enum ClusterCommands {
    /// List known clusters
    List,
    /// Start a cluster
    Start { cluster_id: String },
    /// Stop (terminate) a cluster; its configuration is kept
    Stop { cluster_id: String },
}

#[derive(Parser, Debug)]
struct ExecArgs {
    /// Target cluster
    #[arg(long, short = 'c', env = "DATABRICKS_CLUSTER_ID")]
    cluster: String,

    /// Interpreter language
    #[arg(long, short = 'l', default_value = "python")]
    language: Language,

    /// Read code from a file instead of the command line
    #[arg(long, short = 'f', conflicts_with = "code")]
    file: Option<PathBuf>,

    /// Code to execute
    code: Option<String>,
}

#[derive(clap::Subcommand, Debug)]
enum ContextCommands {
    /// Destroy the cluster's execution context (restart the interpreter)
    Destroy { cluster_id: String },
}

// =============================================================================
// Helper Functions
// =============================================================================

fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
}

fn api_url(client: &ClientArgs, path: &str) -> String {
    format!("{}{}{}", client.addr.trim_end_matches('/'), API_PREFIX, path)
}

async fn read_json<T: DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T, Box<dyn std::error::Error>> {
    let status = response.status();
    if !status.is_success() {
        let body: serde_json::Value = response.json().await.unwrap_or_default();
        let detail = body["detail"].as_str().unwrap_or("request failed").to_string();
        return Err(format!("server returned {}: {}", status.as_u16(), detail).into());
    }
    Ok(response.json().await?)
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

// =============================================================================
// Command Handlers
// =============================================================================

async fn handle_server(args: ServerArgs) -> Result<(), Box<dyn std::error::Error>> {
    init_logging();

    let listen_addr: SocketAddr = format!("{}:{}", args.host, args.port).parse()?;
    let mut config = ServerConfig::from_env()
        .with_poll(PollPolicy::new(args.poll_attempts, args.poll_interval_ms));
    config.listen_addr = listen_addr;
    config.remote = args.remote.into_config();

    let shutdown = install_shutdown_handler();
    run_server(config, shutdown).await
}

async fn handle_clusters(
    client: &ClientArgs,
    command: ClusterCommands,
) -> Result<(), Box<dyn std::error::Error>> {
    let http = reqwest::Client::new();

    match command {
        ClusterCommands::List => {
            let clusters: Vec<Cluster> =
                read_json(http.get(api_url(client, "/clusters")).send().await?).await?;
            match client.output {
                OutputFormat::Json => print_json(&clusters)?,
                OutputFormat::Table => {
                    if clusters.is_empty() {
                        println!("No clusters found.");
                        return Ok(());
                    }
                    println!(
                        "{:<24} {:<28} {:<12} {:<18} WORKERS",
                        "CLUSTER ID", "NAME", "STATE", "DRIVER"
                    );
                    println!("{}", "-".repeat(92));
                    for cluster in &clusters {
                        println!(
                            "{:<24} {:<28} {:<12} {:<18} {}",
                            cluster.id,
                            cluster.display_name,
                            cluster.lifecycle_state,
                            cluster.driver_spec.as_deref().unwrap_or("-"),
                            cluster
                                .worker_count
                                .map(|n| n.to_string())
                                .unwrap_or_else(|| "-".to_string())
                        );
                    }
                }
            }
        }
        ClusterCommands::Start { cluster_id } => {
            let path = format!("/clusters/{cluster_id}/start");
            let ack: ClusterAck = read_json(http.post(api_url(client, &path)).send().await?).await?;
            print_ack(client, &ack)?;
        }
        ClusterCommands::Stop { cluster_id } => {
            let path = format!("/clusters/{cluster_id}/stop");
            let ack: ClusterAck = read_json(http.post(api_url(client, &path)).send().await?).await?;
            print_ack(client, &ack)?;
        }
    }
    Ok(())
}

fn print_ack(client: &ClientArgs, ack: &ClusterAck) -> Result<(), Box<dyn std::error::Error>> {
    match client.output {
        OutputFormat::Json => print_json(ack),
        OutputFormat::Table => {
            println!("{} ({})", ack.message, ack.cluster_id);
            Ok(())
        }
    }
}

async fn load_request(exec: ExecArgs) -> Result<ExecuteRequest, Box<dyn std::error::Error>> {
    let code = match (exec.file, exec.code) {
        (Some(path), _) => tokio::fs::read_to_string(path).await?,
        (None, Some(code)) => code,
        (None, None) => return Err("no code given (pass CODE or --file)".into()),
    };
    Ok(ExecuteRequest::new(exec.cluster, code).with_language(exec.language))
}

async fn handle_exec(client: &ClientArgs, exec: ExecArgs) -> Result<(), Box<dyn std::error::Error>> {
    let request = load_request(exec).await?;
    let result: ExecutionResult = read_json(
        reqwest::Client::new()
            .post(api_url(client, "/execute"))
            .json(&request)
            .send()
            .await?,
    )
    .await?;

    match client.output {
        OutputFormat::Json => print_json(&result)?,
        OutputFormat::Table => {
            println!("Status: {}", result.status);
            if let Some(output) = &result.output {
                println!("Output:");
                for line in output.lines() {
                    println!("  {}", line);
                }
            }
            if let Some(error) = &result.error {
                println!("Error:");
                for line in error.lines() {
                    println!("  {}", line);
                }
            }
        }
    }

    if result.status != ExecutionStatus::Finished {
        std::process::exit(1);
    }
    Ok(())
}

async fn handle_stream(
    client: &ClientArgs,
    exec: ExecArgs,
) -> Result<(), Box<dyn std::error::Error>> {
    let request = load_request(exec).await?;

    let base = client.addr.trim_end_matches('/');
    let ws_base = if let Some(rest) = base.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = base.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        base.to_string()
    };
    let url = format!("{}{}/execute/stream/{}", ws_base, API_PREFIX, Uuid::new_v4());

    let (mut socket, _) = tokio_tungstenite::connect_async(url.as_str()).await?;
    socket
        .send(Message::Text(serde_json::to_string(&request)?.into()))
        .await?;

    let mut failed = false;
    while let Some(frame) = socket.next().await {
        let text = match frame? {
            Message::Text(text) => text,
            Message::Close(_) => break,
            _ => continue,
        };
        let event: StreamEvent = serde_json::from_str(&text)?;
        match client.output {
            OutputFormat::Json => println!("{}", serde_json::to_string(&event)?),
            OutputFormat::Table => match &event {
                StreamEvent::Status { status } => eprintln!("[{:?}]", status),
                StreamEvent::Output { content } => print!("{}", content),
                StreamEvent::Error { message } => eprintln!("Error: {}", message),
            },
        }
        if matches!(event, StreamEvent::Error { .. }) {
            failed = true;
        }
        if event.is_terminal() {
            break;
        }
    }
    let _ = socket.close(None).await;

    if failed {
        std::process::exit(1);
    }
    Ok(())
}

async fn handle_context(
    client: &ClientArgs,
    command: ContextCommands,
) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        ContextCommands::Destroy { cluster_id } => {
            let response: MessageResponse = read_json(
                reqwest::Client::new()
                    .post(api_url(client, "/context/destroy"))
                    .query(&[("cluster_id", cluster_id.as_str())])
                    .send()
                    .await?,
            )
            .await?;
            match client.output {
                OutputFormat::Json => print_json(&response)?,
                OutputFormat::Table => println!("{} ({})", response.message, cluster_id),
            }
        }
    }
    Ok(())
}

async fn handle_check(args: RemoteArgs) -> Result<(), Box<dyn std::error::Error>> {
    init_logging();

    let config = args.into_config();
    if !config.is_complete() {
        tracing::error!("Missing config: workspace URL and token must both be set");
        std::process::exit(1);
    }

    let control_plane = HttpControlPlane::new(&config)?;
    match control_plane.list_clusters().await {
        Ok(clusters) => {
            tracing::info!(clusters = clusters.len(), url = control_plane.base_url(), "Control plane reachable");
            Ok(())
        }
        Err(OrchestratorError::RemoteApi { status: 401, .. }) => {
            tracing::error!("Unauthorized (invalid token)");
            std::process::exit(1);
        }
        Err(e) => {
            tracing::error!(error = %e, "Control plane check failed");
            std::process::exit(1);
        }
    }
}

// =============================================================================
// Main Entry Point
// =============================================================================

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    match args.command {
        Commands::Server(server_args) => handle_server(server_args).await?,
        Commands::Clusters { client, command } => handle_clusters(&client, command).await?,
        Commands::Exec { client, exec } => handle_exec(&client, exec).await?,
        Commands::Stream { client, exec } => handle_stream(&client, exec).await?,
        Commands::Context { client, command } => handle_context(&client, command).await?,
        Commands::Check(remote) => handle_check(remote).await?,
    }

    Ok(())
}
