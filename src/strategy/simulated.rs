use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::{ExecuteRequest, ExecutionResult, ExecutionStrategy};
use crate::config::SimulationConfig;
use crate::relay::StreamEvent;

/// Stand-in executor that never touches the network.
///
/// One-shot execution reports the amount of code processed after a fixed
/// delay. Streaming echoes each code line as one output event at a fixed
/// cadence, then reports `finished`.
#[derive(Debug, Clone)]
pub struct SimulatedStrategy {
    config: SimulationConfig,
}

impl SimulatedStrategy {
    pub fn new(config: SimulationConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    pub fn simulated_output(code: &str) -> String {
        format!(
            "[Mock Execution] Result: {} chars processed.\nData processed successfully.",
            code.chars().count()
        )
    }
}

impl Default for SimulatedStrategy {
    fn default() -> Self {
        Self::new(SimulationConfig::default())
    }
}

#[async_trait]
impl ExecutionStrategy for SimulatedStrategy {
    fn name(&self) -> &'static str {
        "simulated"
    }

    async fn execute(&self, request: &ExecuteRequest) -> ExecutionResult {
        tracing::info!(cluster_id = %request.cluster_id, "Simulating execution");
        tokio::time::sleep(Duration::from_millis(self.config.execute_delay_ms)).await;
        ExecutionResult::finished(Self::simulated_output(&request.code))
    }

    async fn stream(&self, request: &ExecuteRequest, events: mpsc::Sender<StreamEvent>) {
        if events.send(StreamEvent::running()).await.is_err() {
            return;
        }

        let cadence = Duration::from_millis(self.config.line_delay_ms);
        for line in request.code.lines() {
            tokio::time::sleep(cadence).await;
            if events
                .send(StreamEvent::output(format!("> {line}\n")))
                .await
                .is_err()
            {
                tracing::debug!(cluster_id = %request.cluster_id, "Simulated stream subscriber gone");
                return;
            }
        }

        let _ = events.send(StreamEvent::finished()).await;
    }
}
