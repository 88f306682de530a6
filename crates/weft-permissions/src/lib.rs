//! # Weft Permissions
//!
//! The permission gateway sits between a submitted batch and the scheduler.
//! Every request is checked against deny lists, the safe-command allow-list
//! and the user's grants; requests without a matching grant are either
//! prompted for interactively or denied.
//!
//! Grants are keyed by `(kind, scope_key)`. Session grants live in memory;
//! permanent grants go through a [`GrantStore`].

pub mod commands;
pub mod error;
pub mod gateway;
pub mod grant;
pub mod path;
pub mod prompt;
pub mod state;
pub mod store;

pub use commands::{SafeCommands, has_shell_metacharacters, has_write_option};
pub use error::GatewayError;
pub use gateway::{GrantSet, PermissionCheck, PermissionGateway};
pub use grant::{GrantExpiry, GrantKey, GrantKind, GrantScope, PermissionGrant};
pub use path::{is_within, normalize_path};
pub use prompt::{Decision, PendingApproval, PermissionPrompt};
pub use state::{DecisionState, PermissionState};
pub use store::{FileGrantStore, GrantStore, InMemoryGrantStore, store_for};
