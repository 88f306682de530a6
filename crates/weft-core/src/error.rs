//! Error taxonomy
//!
//! Every failure surfaced by the core falls into one of five kinds. Each
//! crate keeps its own `thiserror` enum and classifies its variants through
//! [`Classify`], so callers can decide on retries without matching on
//! crate-specific types.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The five failure classes shared across the workspace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Timeout, output-size cap or concurrency ceiling. The caller may retry
    /// with a smaller scope.
    ResourceExceeded,
    /// The user (or a deny rule) declined the action. Never retried
    /// automatically.
    PermissionDenied,
    /// Optimistic-concurrency mismatch. Resolved by merging where possible.
    VersionConflict,
    /// The underlying tool action raised an error.
    OperationFailed,
    /// Caller-initiated cancellation or grace-period expiry.
    Cancelled,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::ResourceExceeded => "resource_exceeded",
            ErrorKind::PermissionDenied => "permission_denied",
            ErrorKind::VersionConflict => "version_conflict",
            ErrorKind::OperationFailed => "operation_failed",
            ErrorKind::Cancelled => "cancelled",
        }
    }

    /// Whether retrying the same action can reasonably succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ErrorKind::ResourceExceeded | ErrorKind::VersionConflict
        )
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Maps a crate-specific error onto the shared taxonomy.
pub trait Classify {
    fn kind(&self) -> ErrorKind;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_resource_and_version_errors_are_retryable() {
        assert!(ErrorKind::ResourceExceeded.is_retryable());
        assert!(ErrorKind::VersionConflict.is_retryable());
        assert!(!ErrorKind::PermissionDenied.is_retryable());
        assert!(!ErrorKind::OperationFailed.is_retryable());
        assert!(!ErrorKind::Cancelled.is_retryable());
    }

    #[test]
    fn kind_serializes_snake_case() {
        let json = serde_json::to_string(&ErrorKind::ResourceExceeded).unwrap();
        assert_eq!(json, "\"resource_exceeded\"");
        assert_eq!(ErrorKind::Cancelled.to_string(), "cancelled");
    }
}
