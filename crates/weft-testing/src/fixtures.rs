//! Thread builders, workspaces and failing stores

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use tempfile::TempDir;
use weft_core::PermissionsConfig;
use weft_permissions::{GatewayError, GrantKey, GrantStore, InMemoryGrantStore, PermissionGrant};
use weft_thread::{Message, Role, Thread, ThreadDelta, apply_delta};

/// Builds threads through real deltas so versions come out right.
#[derive(Debug, Clone)]
pub struct ThreadBuilder {
    thread: Thread,
    clock: DateTime<Utc>,
}

impl ThreadBuilder {
    pub fn new() -> Self {
        let thread = Thread::new();
        let clock = thread.created;
        Self { thread, clock }
    }

    /// Append a message stamped one second after the previous one
    pub fn message(mut self, role: Role, content: &str) -> Self {
        self.clock += TimeDelta::seconds(1);
        let message = Message::new(role, content).with_timestamp(self.clock);
        self.apply(ThreadDelta::append(message))
    }

    pub fn user(self, content: &str) -> Self {
        self.message(Role::User, content)
    }

    pub fn assistant(self, content: &str) -> Self {
        self.message(Role::Assistant, content)
    }

    pub fn title(self, title: &str) -> Self {
        self.apply(ThreadDelta::SetTitle {
            title: Some(title.to_string()),
        })
    }

    fn apply(mut self, delta: ThreadDelta) -> Self {
        // Deltas built here are always well formed.
        if let Ok(next) = apply_delta(&self.thread, &delta) {
            self.thread = next;
        }
        self
    }

    pub fn build(self) -> Thread {
        self.thread
    }
}

impl Default for ThreadBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A message stamped `offset_ms` after `at`
pub fn message_at(at: DateTime<Utc>, offset_ms: i64, role: Role, content: &str) -> Message {
    Message::new(role, content).with_timestamp(at + TimeDelta::milliseconds(offset_ms))
}

/// Append `message` to a copy of `thread`, as a client would
pub fn appended(thread: &Thread, message: Message) -> Thread {
    apply_delta(thread, &ThreadDelta::append(message)).unwrap_or_else(|_| thread.clone())
}

/// A temporary workspace directory, removed on drop
#[derive(Debug)]
pub struct TempWorkspace {
    dir: TempDir,
}

impl TempWorkspace {
    pub fn new() -> std::io::Result<Self> {
        Ok(Self {
            dir: tempfile::tempdir()?,
        })
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn path(&self, relative: &str) -> PathBuf {
        self.dir.path().join(relative)
    }

    pub fn write(&self, relative: &str, content: &str) -> std::io::Result<PathBuf> {
        let path = self.path(relative);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, content)?;
        Ok(path)
    }

    pub fn read(&self, relative: &str) -> std::io::Result<String> {
        std::fs::read_to_string(self.path(relative))
    }

    /// Permissions rooted at this workspace, non-interactive
    pub fn permissions(&self) -> PermissionsConfig {
        PermissionsConfig {
            workspace_root: self.root().to_path_buf(),
            interactive: false,
            ..PermissionsConfig::default()
        }
    }
}

/// Grant store that can be switched into failing on every call
#[derive(Debug, Default)]
pub struct UnavailableGrantStore {
    inner: InMemoryGrantStore,
    down: AtomicBool,
}

impl UnavailableGrantStore {
    /// A store that is down from the start
    pub fn down() -> Self {
        let store = Self::default();
        store.set_down(true);
        store
    }

    pub fn set_down(&self, down: bool) {
        self.down.store(down, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), GatewayError> {
        if self.down.load(Ordering::SeqCst) {
            return Err(GatewayError::StoreUnavailable(
                "grant store is unreachable".to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl GrantStore for UnavailableGrantStore {
    async fn load(&self) -> Result<Vec<PermissionGrant>, GatewayError> {
        self.check()?;
        self.inner.load().await
    }

    async fn save(&self, grant: PermissionGrant) -> Result<(), GatewayError> {
        self.check()?;
        self.inner.save(grant).await
    }

    async fn remove(&self, key: &GrantKey) -> Result<bool, GatewayError> {
        self.check()?;
        self.inner.remove(key).await
    }
}
