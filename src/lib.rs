pub mod api;
pub mod cluster;
pub mod config;
pub mod context;
pub mod error;
pub mod executor;
pub mod poller;
pub mod recovery;
pub mod relay;
pub mod remote;
pub mod service;
pub mod shutdown;
pub mod storage;
pub mod strategy;

pub use error::{OrchestratorError, Result};
pub use service::Orchestrator;
