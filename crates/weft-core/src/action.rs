//! Action request/result data model
//!
//! An [`ActionRequest`] is one tool invocation emitted by the model layer. It
//! is immutable once issued. Exactly one [`ActionResult`] is produced for each
//! request, whether the action ran, failed, was denied or was cancelled.

use crate::error::ErrorKind;
use crate::identifiers::{OperationId, RequestId, ToolId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::PathBuf;

/// One requested tool invocation.
///
/// `read_only` comes from the tool definition. Build requests through the
/// tool registry so the flag can never disagree with the tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionRequest {
    pub id: RequestId,
    pub tool_name: ToolId,
    pub arguments: Value,
    pub read_only: bool,
    pub requested_at: DateTime<Utc>,
}

impl ActionRequest {
    pub fn new(tool_name: ToolId, arguments: Value, read_only: bool) -> Self {
        Self {
            id: RequestId::generate(),
            tool_name,
            arguments,
            read_only,
            requested_at: Utc::now(),
        }
    }
}

/// Terminal status of an action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionStatus {
    Success,
    Error,
    Cancelled,
}

impl ActionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionStatus::Success => "success",
            ActionStatus::Error => "error",
            ActionStatus::Cancelled => "cancelled",
        }
    }
}

/// What an action produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ActionPayload {
    Output { content: String },
    Failure { kind: ErrorKind, message: String },
}

/// Kind of mutation captured by a [`FileChangeRecord`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeType {
    Create,
    Modify,
    Delete,
}

/// Before/after state of one file mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileChangeRecord {
    pub path: PathBuf,
    pub change_type: ChangeType,
    pub before_content: Option<String>,
    pub after_content: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub operation_id: OperationId,
}

/// Outcome of one ActionRequest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionResult {
    pub request_id: RequestId,
    pub tool_name: ToolId,
    pub status: ActionStatus,
    pub payload: ActionPayload,
    pub files_touched: Vec<FileChangeRecord>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl ActionResult {
    pub fn success(
        request: &ActionRequest,
        content: String,
        files_touched: Vec<FileChangeRecord>,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            request_id: request.id,
            tool_name: request.tool_name.clone(),
            status: ActionStatus::Success,
            payload: ActionPayload::Output { content },
            files_touched,
            started_at,
            finished_at: Utc::now(),
        }
    }

    /// A failed action. `Cancelled` failures get the `Cancelled` status, every
    /// other kind maps to `Error`.
    pub fn failure(
        request: &ActionRequest,
        kind: ErrorKind,
        message: impl Into<String>,
        files_touched: Vec<FileChangeRecord>,
        started_at: DateTime<Utc>,
    ) -> Self {
        let status = match kind {
            ErrorKind::Cancelled => ActionStatus::Cancelled,
            _ => ActionStatus::Error,
        };
        Self {
            request_id: request.id,
            tool_name: request.tool_name.clone(),
            status,
            payload: ActionPayload::Failure {
                kind,
                message: message.into(),
            },
            files_touched,
            started_at,
            finished_at: Utc::now(),
        }
    }

    /// An action that never started.
    pub fn not_started(request: &ActionRequest, kind: ErrorKind, message: impl Into<String>) -> Self {
        let now = Utc::now();
        let mut result = Self::failure(request, kind, message, Vec::new(), now);
        result.finished_at = now;
        result
    }

    pub fn cancelled(request: &ActionRequest, started_at: Option<DateTime<Utc>>) -> Self {
        match started_at {
            Some(started) => Self::failure(
                request,
                ErrorKind::Cancelled,
                "cancelled while running",
                Vec::new(),
                started,
            ),
            None => Self::not_started(request, ErrorKind::Cancelled, "cancelled before start"),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == ActionStatus::Success
    }

    pub fn output(&self) -> Option<&str> {
        match &self.payload {
            ActionPayload::Output { content } => Some(content),
            ActionPayload::Failure { .. } => None,
        }
    }

    pub fn failure_kind(&self) -> Option<ErrorKind> {
        match &self.payload {
            ActionPayload::Output { .. } => None,
            ActionPayload::Failure { kind, .. } => Some(*kind),
        }
    }

    pub fn duration(&self) -> chrono::TimeDelta {
        self.finished_at - self.started_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request() -> ActionRequest {
        ActionRequest::new(ToolId::new_unchecked("file_read"), json!({"path": "/a"}), true)
    }

    #[test]
    fn failure_status_follows_kind() {
        let req = request();
        let err = ActionResult::failure(&req, ErrorKind::OperationFailed, "boom", vec![], Utc::now());
        assert_eq!(err.status, ActionStatus::Error);
        assert_eq!(err.failure_kind(), Some(ErrorKind::OperationFailed));

        let cancelled = ActionResult::cancelled(&req, None);
        assert_eq!(cancelled.status, ActionStatus::Cancelled);
        assert_eq!(cancelled.started_at, cancelled.finished_at);
    }

    #[test]
    fn success_carries_output() {
        let req = request();
        let ok = ActionResult::success(&req, "contents".into(), vec![], Utc::now());
        assert!(ok.is_success());
        assert_eq!(ok.output(), Some("contents"));
        assert_eq!(ok.request_id, req.id);
        assert!(ok.duration() >= chrono::TimeDelta::zero());
    }

    #[test]
    fn payload_serializes_tagged() {
        let payload = ActionPayload::Failure {
            kind: ErrorKind::PermissionDenied,
            message: "no".into(),
        };
        let value = serde_json::to_value(&payload).unwrap();
        assert_eq!(value["type"], "failure");
        assert_eq!(value["kind"], "permission_denied");
    }
}
