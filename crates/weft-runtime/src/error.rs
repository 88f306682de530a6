//! Orchestrator errors
//!
//! Everything here is a batch-level failure: it is returned before any
//! operation of the batch starts. Per-operation failures travel inside
//! `ActionResult`s instead.

use thiserror::Error;
use weft_core::{Classify, ConfigError, ErrorKind, ThreadId};
use weft_observability::MetricsError;
use weft_permissions::GatewayError;
use weft_sync::SyncError;
use weft_thread::ThreadError;
use weft_tools::ToolError;

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("Unknown thread: {0}")]
    UnknownThread(ThreadId),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    #[error("Permission gateway error: {0}")]
    Permission(#[from] GatewayError),

    #[error("Thread error: {0}")]
    Thread(#[from] ThreadError),

    #[error("Sync error: {0}")]
    Sync(#[from] SyncError),

    #[error("Metrics setup failed: {0}")]
    Metrics(#[from] MetricsError),
}

impl Classify for OrchestratorError {
    fn kind(&self) -> ErrorKind {
        match self {
            OrchestratorError::Tool(e) => e.kind(),
            OrchestratorError::Thread(e) => e.kind(),
            OrchestratorError::Sync(e) => e.kind(),
            _ => ErrorKind::OperationFailed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn thread_conflicts_keep_their_kind() {
        let id = ThreadId::generate();
        let err = OrchestratorError::from(ThreadError::VersionConflict {
            id,
            expected: 1,
            actual: 2,
        });
        assert_eq!(err.kind(), ErrorKind::VersionConflict);
        assert_eq!(
            OrchestratorError::UnknownThread(id).kind(),
            ErrorKind::OperationFailed
        );
    }
}
