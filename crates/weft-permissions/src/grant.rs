//! Permission grants
//!
//! A grant is identified by its `(kind, scope_key)` pair. Path grants match
//! any descendant of their directory, component-wise, so `/repo` covers
//! `/repo/src/main.rs` but not `/repository`. Command grants match the exact
//! command line or any command whose leading whitespace-separated tokens
//! equal the grant's tokens. Tool grants match by tool name.

use crate::commands::{has_shell_metacharacters, tokens_start_with};
use crate::path::is_within;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use weft_core::Access;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrantKind {
    Path,
    Command,
    Tool,
}

impl GrantKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            GrantKind::Path => "path",
            GrantKind::Command => "command",
            GrantKind::Tool => "tool",
        }
    }
}

/// How long a grant lives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrantExpiry {
    /// Kept in memory for the lifetime of the gateway
    Session,
    /// Written through the grant store
    Permanent,
}

/// Identity of a grant in the grant map
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GrantKey {
    pub kind: GrantKind,
    pub scope_key: String,
}

impl GrantKey {
    pub fn new(kind: GrantKind, scope_key: impl Into<String>) -> Self {
        Self {
            kind,
            scope_key: scope_key.into(),
        }
    }
}

impl fmt::Display for GrantKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind.as_str(), self.scope_key)
    }
}

/// A candidate scope offered to the user, or the scope of a grant.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GrantScope {
    pub kind: GrantKind,
    pub scope_key: String,
    pub access: Access,
}

impl GrantScope {
    pub fn path(path: &Path, access: Access) -> Self {
        Self {
            kind: GrantKind::Path,
            scope_key: path.to_string_lossy().into_owned(),
            access,
        }
    }

    pub fn command(command: impl Into<String>) -> Self {
        Self {
            kind: GrantKind::Command,
            scope_key: command.into(),
            access: Access::Execute,
        }
    }

    pub fn tool(name: impl Into<String>, access: Access) -> Self {
        Self {
            kind: GrantKind::Tool,
            scope_key: name.into(),
            access,
        }
    }

    pub fn key(&self) -> GrantKey {
        GrantKey::new(self.kind, self.scope_key.clone())
    }
}

/// A permission granted by the user or implied by configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionGrant {
    pub scope_key: String,
    pub kind: GrantKind,
    pub access: Access,
    pub expiry: GrantExpiry,
    pub granted_at: DateTime<Utc>,
}

impl PermissionGrant {
    pub fn new(scope: GrantScope, expiry: GrantExpiry) -> Self {
        Self {
            scope_key: scope.scope_key,
            kind: scope.kind,
            access: scope.access,
            expiry,
            granted_at: Utc::now(),
        }
    }

    pub fn key(&self) -> GrantKey {
        GrantKey::new(self.kind, self.scope_key.clone())
    }

    pub fn scope(&self) -> GrantScope {
        GrantScope {
            kind: self.kind,
            scope_key: self.scope_key.clone(),
            access: self.access,
        }
    }

    /// Whether this grant covers `path` (already normalized) for `access`.
    pub fn covers_path(&self, path: &Path, access: Access) -> bool {
        self.kind == GrantKind::Path
            && self.access.satisfies(access)
            && is_within(path, Path::new(&self.scope_key))
    }

    /// Whether this grant covers running `command`.
    ///
    /// Prefix matches are refused when the command contains shell control
    /// characters, so `git` never covers `git status; rm -rf /`.
    pub fn covers_command(&self, command: &str) -> bool {
        if self.kind != GrantKind::Command || !self.access.satisfies(Access::Execute) {
            return false;
        }
        let command = command.trim();
        if command == self.scope_key.trim() {
            return true;
        }
        !has_shell_metacharacters(command) && tokens_start_with(command, &self.scope_key)
    }

    pub fn covers_tool(&self, tool_name: &str, access: Access) -> bool {
        self.kind == GrantKind::Tool && self.scope_key == tool_name && self.access.satisfies(access)
    }
}
