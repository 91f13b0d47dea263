//! Per-cluster execution context cache.
//!
//! Each cluster id owns one slot guarded by its own async mutex. The slot
//! lock is held across the remote create/destroy call, so two requests for
//! the same cluster can never both observe an empty slot and create two
//! contexts. Unrelated clusters never wait on each other.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::Mutex;

use crate::error::{OrchestratorError, Result};
use crate::remote::{ControlPlane, Language};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExecutionContext {
    pub cluster_id: String,
    pub context_id: String,
    pub language: Language,
    pub created_at: DateTime<Utc>,
}

type Slot = Arc<Mutex<Option<ExecutionContext>>>;

pub struct ContextManager {
    control_plane: Arc<dyn ControlPlane>,
    slots: Mutex<HashMap<String, Slot>>,
}

impl ContextManager {
    pub fn new(control_plane: Arc<dyn ControlPlane>) -> Self {
        Self {
            control_plane,
            slots: Mutex::new(HashMap::new()),
        }
    }

    async fn slot(&self, cluster_id: &str) -> Slot {
        let mut slots = self.slots.lock().await;
        slots.entry(cluster_id.to_string()).or_default().clone()
    }

    /// Return the cached context for `cluster_id`, creating one remotely if none is cached.
    pub async fn get_or_create(
        &self,
        cluster_id: &str,
        language: Language,
    ) -> Result<ExecutionContext> {
        let slot = self.slot(cluster_id).await;
        let mut cached = slot.lock().await;

        if let Some(context) = cached.as_ref() {
            tracing::debug!(cluster_id, context_id = %context.context_id, "Reusing cached context");
            return Ok(context.clone());
        }

        let context = self.create_remote(cluster_id, language).await?;
        *cached = Some(context.clone());
        Ok(context)
    }

    /// Replace `stale_context_id` with a fresh context, under the slot lock.
    ///
    /// Invalidation and recreation happen as one step. If the cache already
    /// holds a different context (another request recovered first), that
    /// context is returned and no remote create is made.
    pub async fn recreate_if_stale(
        &self,
        cluster_id: &str,
        stale_context_id: &str,
        language: Language,
    ) -> Result<ExecutionContext> {
        let slot = self.slot(cluster_id).await;
        let mut cached = slot.lock().await;

        match cached.as_ref() {
            Some(current) if current.context_id != stale_context_id => {
                tracing::debug!(
                    cluster_id,
                    stale = stale_context_id,
                    context_id = %current.context_id,
                    "Context already replaced by a concurrent recovery"
                );
                return Ok(current.clone());
            }
            Some(_) => {
                tracing::info!(cluster_id, context_id = stale_context_id, "Invalidated stale context");
            }
            None => {}
        }

        // The stale entry stays cached until the replacement exists.
        let context = self.create_remote(cluster_id, language).await?;
        *cached = Some(context.clone());
        Ok(context)
    }

    /// Drop the cached entry without contacting the remote side.
    pub async fn invalidate(&self, cluster_id: &str) -> Option<ExecutionContext> {
        let slot = self.slot(cluster_id).await;
        let removed = slot.lock().await.take();
        if let Some(ref context) = removed {
            tracing::info!(cluster_id, context_id = %context.context_id, "Invalidated cached context");
        }
        removed
    }

    /// Destroy the cached context remotely and forget it.
    ///
    /// Returns `Ok(false)` without any remote call when nothing is cached. A
    /// remote 400/404 means the context is already gone and counts as success.
    /// The cache entry is removed even if the remote call fails.
    pub async fn destroy(&self, cluster_id: &str) -> Result<bool> {
        let slot = self.slot(cluster_id).await;
        let mut cached = slot.lock().await;

        let Some(context) = cached.take() else {
            tracing::debug!(cluster_id, "No cached context to destroy");
            return Ok(false);
        };

        match self
            .control_plane
            .destroy_context(cluster_id, &context.context_id)
            .await
        {
            Ok(()) => {
                tracing::info!(cluster_id, context_id = %context.context_id, "Destroyed context");
                Ok(true)
            }
            Err(OrchestratorError::RemoteApi { status, .. }) if status == 400 || status == 404 => {
                tracing::info!(cluster_id, context_id = %context.context_id, "Context already gone remotely");
                Ok(true)
            }
            Err(e) => {
                tracing::warn!(cluster_id, context_id = %context.context_id, error = %e, "Failed to destroy context");
                Err(e)
            }
        }
    }

    /// The currently cached context, if any.
    pub async fn cached(&self, cluster_id: &str) -> Option<ExecutionContext> {
        let slot = {
            let slots = self.slots.lock().await;
            slots.get(cluster_id).cloned()
        }?;
        let cached = slot.lock().await;
        cached.clone()
    }

    /// All cached contexts sorted by cluster id.
    pub async fn snapshot(&self) -> Vec<ExecutionContext> {
        let slots: Vec<Slot> = self.slots.lock().await.values().cloned().collect();
        let mut contexts = Vec::with_capacity(slots.len());
        for slot in slots {
            if let Some(context) = slot.lock().await.clone() {
                contexts.push(context);
            }
        }
        contexts.sort_by(|a, b| a.cluster_id.cmp(&b.cluster_id));
        contexts
    }

    async fn create_remote(&self, cluster_id: &str, language: Language) -> Result<ExecutionContext> {
        let context_id = self
            .control_plane
            .create_context(cluster_id, language)
            .await?;

        tracing::info!(cluster_id, context_id = %context_id, language = %language, "Created execution context");

        Ok(ExecutionContext {
            cluster_id: cluster_id.to_string(),
            context_id,
            language,
            created_at: Utc::now(),
        })
    }
}
