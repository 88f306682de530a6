//! # Weft Core
//!
//! Shared building blocks for the Weft coordination core: identifiers, the
//! action request/result model, the error taxonomy, configuration and the
//! resource limiter every scheduled operation runs under.

pub mod action;
pub mod config;
pub mod error;
pub mod identifiers;
pub mod limits;
pub mod scope;

pub use action::{
    ActionPayload, ActionRequest, ActionResult, ActionStatus, ChangeType, FileChangeRecord,
};
pub use config::{
    ConfigError, LogFormat, ObservabilityConfig, PermissionsConfig, RuntimeConfig,
    ScalarConflictPolicy, SchedulerConfig, SyncConfig, ThreadsConfig, WeftConfig,
};
pub use error::{Classify, ErrorKind};
pub use identifiers::{IdValidationError, MessageId, OperationId, RequestId, ThreadId, ToolId};
pub use limits::{LimitExceeded, OperationPermit, ResourceLimiter, ResourceLimits};
pub use scope::{Access, PermissionScope, normalize_path};
