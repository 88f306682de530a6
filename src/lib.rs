//! # Weft
//!
//! Coordination core for AI coding-assistant runtimes: a parallel tool
//! scheduler, a permission gateway, versioned conversation threads and a
//! background sync service, tied together by the [`Orchestrator`].
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use weft::{InMemoryRemoteStore, Orchestrator, ToolRegistry, WeftConfig};
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let orchestrator = Orchestrator::new(
//!     WeftConfig::default(),
//!     ToolRegistry::with_standard_tools(),
//!     Arc::new(InMemoryRemoteStore::new()),
//! )?;
//! let thread = orchestrator.create_thread();
//! let read = orchestrator.request("file_read", serde_json::json!({"path": "Cargo.toml"}))?;
//! let results = orchestrator
//!     .submit_batch(thread.id, vec![read])
//!     .await?
//!     .collect_ordered()
//!     .await;
//! println!("{:?}", results[0].status);
//! # Ok(())
//! # }
//! ```

pub use weft_core as core;
pub use weft_observability as observability;
pub use weft_permissions as permissions;
pub use weft_runtime as runtime;
pub use weft_sync as sync;
pub use weft_thread as thread;
pub use weft_tools as tools;

pub use weft_core::{
    ActionRequest, ActionResult, ActionStatus, Classify, ErrorKind, OperationId, RequestId,
    ThreadId, ToolId, WeftConfig,
};
pub use weft_observability::{WeftMetrics, init_tracing};
pub use weft_permissions::{Decision, GrantExpiry, GrantScope, PermissionPrompt};
pub use weft_runtime::{
    BatchRun, Orchestrator, OrchestratorError, StopReason, TurnDriver, TurnSummary,
};
pub use weft_sync::{InMemoryRemoteStore, RemoteStore, SyncState, SyncStatus};
pub use weft_thread::{Message, Role, Thread, ThreadDelta, merge_threads};
pub use weft_tools::{ActionTool, RollbackReport, ToolContext, ToolRegistry};
