//! Sync errors

use thiserror::Error;
use weft_core::{Classify, ErrorKind};
use weft_thread::ThreadError;

#[derive(Debug, Error)]
pub enum SyncError {
    /// Transport-level failure; retried with backoff
    #[error("Remote store unavailable: {0}")]
    RemoteUnavailable(String),

    #[error(transparent)]
    Thread(#[from] ThreadError),
}

impl SyncError {
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::RemoteUnavailable(message.into())
    }
}

impl Classify for SyncError {
    fn kind(&self) -> ErrorKind {
        match self {
            SyncError::Thread(e) => e.kind(),
            _ => ErrorKind::OperationFailed,
        }
    }
}
