use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use serde_json::json;

use super::wire::{ClusterList, ErrorBody, IdResponse, RemoteCluster, RemoteCommandStatus};
use super::{ControlPlane, Language};
use crate::config::RemoteConfig;
use crate::error::{OrchestratorError, Result};

/// REST client for the workspace control plane.
#[derive(Debug, Clone)]
pub struct HttpControlPlane {
    client: Client,
    base_url: String,
}

impl HttpControlPlane {
    /// Build a client from a complete [`RemoteConfig`].
    pub fn new(config: &RemoteConfig) -> Result<Self> {
        let (base_url, token) = match (&config.workspace_url, &config.token) {
            (Some(url), Some(token)) if config.is_complete() => (url, token),
            _ => {
                return Err(OrchestratorError::Configuration(
                    "workspace URL and token are required".to_string(),
                ))
            }
        };

        let mut headers = HeaderMap::new();
        let bearer = HeaderValue::from_str(&format!("Bearer {}", token.trim())).map_err(|_| {
            OrchestratorError::Configuration("token contains invalid characters".to_string())
        })?;
        headers.insert(AUTHORIZATION, bearer);

        let client = Client::builder()
            .default_headers(headers)
            .timeout(config.request_timeout())
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim().trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn post(&self, path: &str, body: serde_json::Value) -> Result<Response> {
        let url = self.url(path);
        tracing::debug!(url = %url, "POST control plane");
        let response = self.client.post(&url).json(&body).send().await?;
        check_status(response).await
    }

    async fn get(&self, path: &str, query: &[(&str, &str)]) -> Result<Response> {
        let url = self.url(path);
        tracing::debug!(url = %url, "GET control plane");
        let response = self.client.get(&url).query(query).send().await?;
        check_status(response).await
    }
}

async fn check_status(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let text = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorBody>(&text)
        .ok()
        .and_then(ErrorBody::describe)
        .unwrap_or_else(|| {
            if text.is_empty() {
                status
                    .canonical_reason()
                    .unwrap_or("request failed")
                    .to_string()
            } else {
                text
            }
        });

    tracing::warn!(status = status.as_u16(), message = %message, "Control plane returned error status");

    Err(OrchestratorError::RemoteApi {
        status: status.as_u16(),
        message,
    })
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T> {
    let bytes = response.bytes().await?;
    serde_json::from_slice(&bytes).map_err(|e| OrchestratorError::Decode(e.to_string()))
}

#[async_trait]
impl ControlPlane for HttpControlPlane {
    async fn list_clusters(&self) -> Result<Vec<RemoteCluster>> {
        let response = self.get("/api/2.0/clusters/list", &[]).await?;
        let list: ClusterList = decode(response).await?;
        Ok(list.clusters)
    }

    async fn start_cluster(&self, cluster_id: &str) -> Result<()> {
        self.post("/api/2.0/clusters/start", json!({ "cluster_id": cluster_id }))
            .await?;
        Ok(())
    }

    async fn delete_cluster(&self, cluster_id: &str) -> Result<()> {
        self.post("/api/2.0/clusters/delete", json!({ "cluster_id": cluster_id }))
            .await?;
        Ok(())
    }

    async fn create_context(&self, cluster_id: &str, language: Language) -> Result<String> {
        let response = self
            .post(
                "/api/1.2/contexts/create",
                json!({ "language": language.as_str(), "clusterId": cluster_id }),
            )
            .await?;
        let created: IdResponse = decode(response).await?;
        Ok(created.id)
    }

    async fn destroy_context(&self, cluster_id: &str, context_id: &str) -> Result<()> {
        self.post(
            "/api/1.2/contexts/destroy",
            json!({ "clusterId": cluster_id, "contextId": context_id }),
        )
        .await?;
        Ok(())
    }

    async fn execute_command(
        &self,
        cluster_id: &str,
        context_id: &str,
        language: Language,
        code: &str,
    ) -> Result<String> {
        let response = self
            .post(
                "/api/1.2/commands/execute",
                json!({
                    "language": language.as_str(),
                    "clusterId": cluster_id,
                    "contextId": context_id,
                    "command": code,
                }),
            )
            .await?;
        let submitted: IdResponse = decode(response).await?;
        Ok(submitted.id)
    }

    async fn command_status(
        &self,
        cluster_id: &str,
        context_id: &str,
        command_id: &str,
    ) -> Result<RemoteCommandStatus> {
        let response = self
            .get(
                "/api/1.2/commands/status",
                &[
                    ("clusterId", cluster_id),
                    ("contextId", context_id),
                    ("commandId", command_id),
                ],
            )
            .await?;
        decode(response).await
    }

    async fn cancel_command(
        &self,
        cluster_id: &str,
        context_id: &str,
        command_id: &str,
    ) -> Result<()> {
        self.post(
            "/api/1.2/commands/cancel",
            json!({
                "clusterId": cluster_id,
                "contextId": context_id,
                "commandId": command_id,
            }),
        )
        .await?;
        Ok(())
    }
}
