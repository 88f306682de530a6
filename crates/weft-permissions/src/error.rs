//! Permission gateway errors

use crate::state::DecisionState;
use std::path::PathBuf;
use thiserror::Error;
use weft_core::{Classify, ErrorKind, RequestId};

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Grant store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Grant store I/O error on {path}: {source}")]
    StoreIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Grant store document is malformed: {0}")]
    StoreFormat(#[from] serde_json::Error),

    #[error("No pending permission decision for request {0}")]
    NoPendingDecision(RequestId),

    #[error("Illegal permission state transition: {from:?} -> {to:?}")]
    IllegalTransition {
        from: DecisionState,
        to: DecisionState,
    },

    #[error("Scope is not among the suggestions for request {0}")]
    UnknownScope(RequestId),
}

impl GatewayError {
    pub fn store_io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::StoreIo {
            path: path.into(),
            source,
        }
    }

    /// Whether the error means grants could not be read or written.
    pub fn is_store_failure(&self) -> bool {
        matches!(
            self,
            GatewayError::StoreUnavailable(_) | GatewayError::StoreIo { .. } | GatewayError::StoreFormat(_)
        )
    }
}

impl Classify for GatewayError {
    fn kind(&self) -> ErrorKind {
        ErrorKind::OperationFailed
    }
}
