//! Thread store errors

use std::path::PathBuf;
use thiserror::Error;
use weft_core::{Classify, ErrorKind, ThreadId};

#[derive(Debug, Error)]
pub enum ThreadError {
    #[error("Thread not found: {0}")]
    NotFound(ThreadId),

    #[error("Thread already exists: {0}")]
    AlreadyExists(ThreadId),

    #[error("Version conflict on thread {id}: expected {expected}, found {actual}")]
    VersionConflict {
        id: ThreadId,
        expected: u64,
        actual: u64,
    },

    #[error("Replacement for thread {id} must advance the version past {current} (got {proposed})")]
    StaleReplacement {
        id: ThreadId,
        current: u64,
        proposed: u64,
    },

    #[error("Invalid delta: {0}")]
    InvalidDelta(String),

    #[error("Cannot merge thread {local} with thread {remote}")]
    MergeMismatch { local: ThreadId, remote: ThreadId },

    #[error("Linking {child} under {parent} would exceed the maximum child depth of {limit}")]
    DepthExceeded {
        parent: ThreadId,
        child: ThreadId,
        limit: usize,
    },

    #[error("Linking {child} under {parent} would create a cycle")]
    Cycle { parent: ThreadId, child: ThreadId },

    #[error("Cold storage I/O error on {path}: {source}")]
    ColdStorageIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Thread snapshot serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ThreadError {
    pub fn invalid_delta(message: impl Into<String>) -> Self {
        Self::InvalidDelta(message.into())
    }

    pub fn cold_io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::ColdStorageIo {
            path: path.into(),
            source,
        }
    }
}

impl Classify for ThreadError {
    fn kind(&self) -> ErrorKind {
        match self {
            ThreadError::VersionConflict { .. } | ThreadError::StaleReplacement { .. } => {
                ErrorKind::VersionConflict
            }
            _ => ErrorKind::OperationFailed,
        }
    }
}
