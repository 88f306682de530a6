//! Tool error types

use std::path::PathBuf;
use thiserror::Error;
use weft_core::{Classify, ErrorKind, IdValidationError, LimitExceeded};

/// Errors raised while resolving or executing a tool
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Tool not found: {0}")]
    NotFound(String),

    #[error("Tool already registered: {0}")]
    Duplicate(String),

    #[error("Invalid tool name: {0}")]
    InvalidName(#[from] IdValidationError),

    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Command exited with status {code:?}: {stderr}")]
    CommandFailed { code: Option<i32>, stderr: String },

    #[error("Operation cancelled")]
    Cancelled,

    #[error(transparent)]
    Limit(#[from] LimitExceeded),

    #[error("{0}")]
    Failed(String),
}

impl ToolError {
    pub fn invalid_arguments(message: impl Into<String>) -> Self {
        Self::InvalidArguments(message.into())
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

impl Classify for ToolError {
    fn kind(&self) -> ErrorKind {
        match self {
            ToolError::Cancelled => ErrorKind::Cancelled,
            ToolError::Limit(limit) => limit.kind(),
            _ => ErrorKind::OperationFailed,
        }
    }
}
