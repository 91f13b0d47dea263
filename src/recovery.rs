use std::sync::Arc;

use crate::context::ContextManager;
use crate::error::{OrchestratorError, Result};
use crate::executor::{Command, CommandExecutor, CommandResult};
use crate::poller::CompletionPoller;
use crate::remote::Language;

/// Submission with a single recreate-and-retry when the cached context is stale.
///
/// Remote contexts can be reclaimed independently of the local cache (idle
/// timeout, cluster restart). The first context-invalid rejection replaces
/// the cached entry if it is still the rejected one, then resubmits once on
/// the current context. A second rejection is terminal.
#[derive(Clone)]
pub struct RecoveryHandler {
    contexts: Arc<ContextManager>,
    executor: CommandExecutor,
    poller: CompletionPoller,
}

impl RecoveryHandler {
    pub fn new(
        contexts: Arc<ContextManager>,
        executor: CommandExecutor,
        poller: CompletionPoller,
    ) -> Self {
        Self {
            contexts,
            executor,
            poller,
        }
    }

    pub fn contexts(&self) -> &Arc<ContextManager> {
        &self.contexts
    }

    /// Submit and wait for the command's terminal result.
    pub async fn execute_with_recovery(
        &self,
        cluster_id: &str,
        code: &str,
        language: Language,
    ) -> Result<CommandResult> {
        let mut command = self.submit_with_recovery(cluster_id, code, language).await?;
        Ok(self.poller.await_completion(&mut command).await)
    }

    /// Submit only, recovering once from a stale context.
    pub async fn submit_with_recovery(
        &self,
        cluster_id: &str,
        code: &str,
        language: Language,
    ) -> Result<Command> {
        let context = self.contexts.get_or_create(cluster_id, language).await?;

        match self
            .executor
            .submit(cluster_id, &context.context_id, code, language)
            .await
        {
            Ok(command) => Ok(command),
            Err(OrchestratorError::ContextInvalid { status, message }) => {
                tracing::warn!(
                    cluster_id,
                    context_id = %context.context_id,
                    status,
                    message = %message,
                    "Context rejected, recreating and retrying once"
                );

                let fresh = self
                    .contexts
                    .recreate_if_stale(cluster_id, &context.context_id, language)
                    .await?;

                self.executor
                    .submit(cluster_id, &fresh.context_id, code, language)
                    .await
                    .map_err(|e| {
                        tracing::warn!(cluster_id, context_id = %fresh.context_id, error = %e, "Retry after recovery failed");
                        e.escalate()
                    })
            }
            Err(e) => Err(e),
        }
    }
}
