use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};

use crate::cluster::{Cluster, ClusterAck};
use crate::error::OrchestratorError;
use crate::relay::{StreamEvent, StreamRequest};
use crate::service::{Mode, Orchestrator};
use crate::storage::MountResponse;
use crate::strategy::{ExecuteRequest, ExecutionResult};

pub const API_PREFIX: &str = "/api/v1/databricks";

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
    /// Cancelled on process shutdown; open stream sessions end when it fires.
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(orchestrator: Arc<Orchestrator>) -> Self {
        Self {
            orchestrator,
            shutdown: CancellationToken::new(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub mode: Mode,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct ClusterQuery {
    pub cluster_id: String,
}

/// Error body in the `{"detail": ...}` shape callers already parse.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    detail: String,
}

impl ApiError {
    fn new(status: StatusCode, detail: impl Into<String>) -> Self {
        Self {
            status,
            detail: detail.into(),
        }
    }
}

impl From<OrchestratorError> for ApiError {
    fn from(err: OrchestratorError) -> Self {
        let status = StatusCode::from_u16(err.http_status())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        Self::new(status, err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(serde_json::json!({ "detail": self.detail })),
        )
            .into_response()
    }
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let databricks = Router::new()
        .route("/clusters", get(list_clusters_handler))
        .route("/clusters/{cluster_id}/start", post(start_cluster_handler))
        .route("/clusters/{cluster_id}/stop", post(stop_cluster_handler))
        .route("/execute", post(execute_handler))
        .route("/context/destroy", post(destroy_context_handler))
        .route("/mount-storage", post(mount_storage_handler))
        .route("/execute/stream/{session_id}", get(stream_handler));

    Router::new()
        .route("/", get(root_handler))
        .route("/health", get(health_handler))
        .nest(API_PREFIX, databricks)
        .layer(cors)
        .with_state(state)
}

async fn root_handler() -> impl IntoResponse {
    Json(serde_json::json!({
        "message": "Remote execution orchestrator",
        "status": "running",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        mode: state.orchestrator.mode(),
    })
}

async fn list_clusters_handler(
    State(state): State<AppState>,
) -> Result<Json<Vec<Cluster>>, ApiError> {
    let clusters = state.orchestrator.directory().list().await?;
    Ok(Json(clusters))
}

async fn start_cluster_handler(
    State(state): State<AppState>,
    Path(cluster_id): Path<String>,
) -> Result<Json<ClusterAck>, ApiError> {
    Ok(Json(state.orchestrator.directory().start(&cluster_id).await?))
}

async fn stop_cluster_handler(
    State(state): State<AppState>,
    Path(cluster_id): Path<String>,
) -> Result<Json<ClusterAck>, ApiError> {
    Ok(Json(state.orchestrator.directory().stop(&cluster_id).await?))
}

async fn execute_handler(
    State(state): State<AppState>,
    Json(request): Json<ExecuteRequest>,
) -> Json<ExecutionResult> {
    Json(state.orchestrator.execute(&request).await)
}

async fn destroy_context_handler(
    State(state): State<AppState>,
    Query(query): Query<ClusterQuery>,
) -> Result<Json<MessageResponse>, ApiError> {
    state.orchestrator.destroy_context(&query.cluster_id).await?;
    Ok(Json(MessageResponse {
        message: "Context destroyed".to_string(),
    }))
}

async fn mount_storage_handler(
    State(state): State<AppState>,
    Query(query): Query<ClusterQuery>,
) -> Result<Json<MountResponse>, ApiError> {
    match state.orchestrator.mount_storage(&query.cluster_id).await {
        Ok(response) => Ok(Json(response)),
        Err(OrchestratorError::Configuration(detail)) => {
            Err(ApiError::new(StatusCode::BAD_REQUEST, detail))
        }
        Err(OrchestratorError::Internal(detail)) => {
            Err(ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, detail))
        }
        Err(e) => Err(e.into()),
    }
}

async fn stream_handler(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| stream_session(state, socket, session_id))
}

async fn stream_session(state: AppState, socket: WebSocket, session_id: String) {
    let (mut sender, mut receiver) = socket.split();

    let text = loop {
        match receiver.next().await {
            Some(Ok(Message::Text(text))) => break text.to_string(),
            Some(Ok(Message::Ping(_) | Message::Pong(_))) => continue,
            _ => {
                tracing::debug!(session_id = %session_id, "Stream session closed before request");
                return;
            }
        }
    };

    let request = match StreamRequest::parse(&text) {
        Ok(request) => request,
        Err(event) => {
            let _ = send_event(&mut sender, &event).await;
            return;
        }
    };

    tracing::info!(session_id = %session_id, cluster_id = %request.cluster_id, "Stream session started");
    let mut events = state.orchestrator.stream(request);

    loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else { break };
                let terminal = event.is_terminal();
                if send_event(&mut sender, &event).await.is_err() {
                    tracing::info!(session_id = %session_id, "Stream session disconnected");
                    break;
                }
                if terminal {
                    break;
                }
            }
            inbound = receiver.next() => {
                if matches!(inbound, None | Some(Err(_)) | Some(Ok(Message::Close(_)))) {
                    tracing::info!(session_id = %session_id, "Stream session disconnected");
                    break;
                }
            }
            _ = state.shutdown.cancelled() => {
                tracing::info!(session_id = %session_id, "Closing stream session for shutdown");
                break;
            }
        }
    }

    // Dropping `events` stops the producer; any remote command keeps running.
    drop(events);
    let _ = sender.send(Message::Close(None)).await;
}

async fn send_event<S>(sender: &mut S, event: &StreamEvent) -> Result<(), axum::Error>
where
    S: futures_util::Sink<Message, Error = axum::Error> + Unpin,
{
    let payload = match serde_json::to_string(event) {
        Ok(payload) => payload,
        Err(e) => {
            tracing::error!(error = %e, "Failed to encode stream event");
            return Ok(());
        }
    };
    sender.send(Message::Text(payload.into())).await
}
