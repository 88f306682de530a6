//! Permission scopes and path normalization
//!
//! A tool describes what it is about to touch as a [`PermissionScope`]. The
//! permission gateway matches scopes against grants, and tools resolve their
//! path arguments with the same [`normalize_path`] so that what was approved
//! is exactly what runs.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Component, Path, PathBuf};

/// Kind of access a request needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Access {
    Read,
    Write,
    Execute,
}

impl Access {
    /// Whether a grant with `self` access covers a request needing `needed`.
    ///
    /// Write covers Read. Execute is only covered by Execute.
    pub fn satisfies(self, needed: Access) -> bool {
        match (self, needed) {
            (a, b) if a == b => true,
            (Access::Write, Access::Read) => true,
            _ => false,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Access::Read => "read",
            Access::Write => "write",
            Access::Execute => "execute",
        }
    }
}

impl fmt::Display for Access {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a single tool invocation needs permission for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PermissionScope {
    /// A filesystem path, as written in the arguments (not yet normalized)
    Path { path: PathBuf, access: Access },
    /// A shell command line and the directory it runs in (the workspace
    /// root when unset)
    Command {
        command: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        cwd: Option<PathBuf>,
    },
    /// The tool as a whole
    Tool { access: Access },
}

impl PermissionScope {
    pub fn path(path: impl Into<PathBuf>, access: Access) -> Self {
        Self::Path {
            path: path.into(),
            access,
        }
    }

    pub fn command(command: impl Into<String>) -> Self {
        Self::Command {
            command: command.into(),
            cwd: None,
        }
    }

    pub fn command_in(command: impl Into<String>, cwd: Option<PathBuf>) -> Self {
        Self::Command {
            command: command.into(),
            cwd,
        }
    }

    pub fn access(&self) -> Access {
        match self {
            Self::Path { access, .. } | Self::Tool { access } => *access,
            Self::Command { .. } => Access::Execute,
        }
    }
}

/// Lexically normalize `path` against `root`.
///
/// Relative paths are joined to `root`, `.` segments are dropped and `..`
/// segments pop the previous component. `..` never climbs above the
/// filesystem root. The filesystem is not consulted, so symlinks are not
/// resolved.
pub fn normalize_path(root: &Path, path: &Path) -> PathBuf {
    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        root.join(path)
    };

    let mut normalized = PathBuf::new();
    for component in joined.components() {
        match component {
            Component::Prefix(prefix) => normalized.push(prefix.as_os_str()),
            Component::RootDir => normalized.push(Component::RootDir.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => {
                // `pop` refuses to remove the root, which is what we want.
                normalized.pop();
            }
            Component::Normal(part) => normalized.push(part),
        }
    }

    if normalized.as_os_str().is_empty() {
        normalized.push(Component::RootDir.as_os_str());
    }
    normalized
}
