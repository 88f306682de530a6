//! Tool capability interface
//!
//! Every tool the scheduler can run implements [`ActionTool`]. The trait
//! exposes the facts the coordination core needs before running anything:
//! whether the tool mutates state ([`ActionTool::is_read_only`]) and what it
//! needs permission for ([`ActionTool::permission_scope`]).
//!
//! ```rust
//! use async_trait::async_trait;
//! use serde_json::Value;
//! use weft_core::{Access, PermissionScope};
//! use weft_tools::{ActionTool, ToolContext, ToolError};
//!
//! struct Clock;
//!
//! #[async_trait]
//! impl ActionTool for Clock {
//!     fn name(&self) -> &str { "clock" }
//!     fn is_read_only(&self) -> bool { true }
//!     fn requires_permission(&self) -> bool { false }
//!     fn permission_scope(&self, _arguments: &Value) -> Result<PermissionScope, ToolError> {
//!         Ok(PermissionScope::Tool { access: Access::Read })
//!     }
//!     async fn execute(&self, _arguments: Value, _ctx: ToolContext) -> Result<String, ToolError> {
//!         Ok("12:00".to_string())
//!     }
//! }
//! ```

use crate::error::ToolError;
use crate::tracker::FileChangeTracker;
use async_trait::async_trait;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use weft_core::{ChangeType, OperationId, PermissionScope, normalize_path};

/// A tool that the scheduler can execute.
#[async_trait]
pub trait ActionTool: Send + Sync {
    /// Unique registry name
    fn name(&self) -> &str;

    /// Read-only tools may run concurrently with each other. Any batch that
    /// contains a mutating tool runs serially.
    fn is_read_only(&self) -> bool;

    /// Tools returning `false` are approved without consulting grants.
    fn requires_permission(&self) -> bool {
        true
    }

    /// What one invocation with `arguments` needs permission for.
    fn permission_scope(&self, arguments: &Value) -> Result<PermissionScope, ToolError>;

    /// Run the tool.
    ///
    /// Long-running tools should call [`ToolContext::checkpoint`] between
    /// steps; tools that ignore cancellation are aborted after the grace
    /// period.
    async fn execute(&self, arguments: Value, ctx: ToolContext) -> Result<String, ToolError>;
}

/// Per-operation execution context handed to [`ActionTool::execute`].
#[derive(Debug, Clone)]
pub struct ToolContext {
    operation_id: OperationId,
    cancel: CancellationToken,
    tracker: FileChangeTracker,
    workspace_root: Arc<PathBuf>,
}

impl ToolContext {
    pub fn new(
        operation_id: OperationId,
        cancel: CancellationToken,
        tracker: FileChangeTracker,
        workspace_root: Arc<PathBuf>,
    ) -> Self {
        Self {
            operation_id,
            cancel,
            tracker,
            workspace_root,
        }
    }

    pub fn operation_id(&self) -> OperationId {
        self.operation_id
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Return `Err(ToolError::Cancelled)` once the batch has been cancelled.
    pub fn checkpoint(&self) -> Result<(), ToolError> {
        if self.cancel.is_cancelled() {
            return Err(ToolError::Cancelled);
        }
        Ok(())
    }

    pub fn workspace_root(&self) -> &Path {
        &self.workspace_root
    }

    /// Resolve a path argument the same way the permission gateway does.
    pub fn resolve_path(&self, raw: impl AsRef<Path>) -> PathBuf {
        normalize_path(&self.workspace_root, raw.as_ref())
    }

    /// Record a file mutation under this operation.
    pub fn record_change(
        &self,
        path: impl Into<PathBuf>,
        change_type: ChangeType,
        before_content: Option<String>,
        after_content: Option<String>,
    ) {
        self.tracker.record(
            self.operation_id,
            path,
            change_type,
            before_content,
            after_content,
        );
    }
}

/// Fetch a required string argument.
pub fn required_str<'a>(arguments: &'a Value, key: &str) -> Result<&'a str, ToolError> {
    arguments
        .get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| ToolError::invalid_arguments(format!("missing string field '{key}'")))
}
