//! Cold storage for inactive threads
//!
//! Snapshots are stored whole, `version` included, so a restored thread
//! continues exactly where it left off.

use crate::error::ThreadError;
use crate::thread::Thread;
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use weft_core::{ThreadId, ThreadsConfig};

#[async_trait]
pub trait ColdStorage: Send + Sync {
    async fn put(&self, thread: &Thread) -> Result<(), ThreadError>;

    async fn get(&self, id: ThreadId) -> Result<Option<Thread>, ThreadError>;

    /// Remove a snapshot; returns whether it existed
    async fn remove(&self, id: ThreadId) -> Result<bool, ThreadError>;

    async fn list(&self) -> Result<Vec<ThreadId>, ThreadError>;
}

#[derive(Debug, Default)]
pub struct InMemoryColdStorage {
    snapshots: RwLock<HashMap<ThreadId, Thread>>,
}

impl InMemoryColdStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ColdStorage for InMemoryColdStorage {
    async fn put(&self, thread: &Thread) -> Result<(), ThreadError> {
        self.snapshots.write().await.insert(thread.id, thread.clone());
        Ok(())
    }

    async fn get(&self, id: ThreadId) -> Result<Option<Thread>, ThreadError> {
        Ok(self.snapshots.read().await.get(&id).cloned())
    }

    async fn remove(&self, id: ThreadId) -> Result<bool, ThreadError> {
        Ok(self.snapshots.write().await.remove(&id).is_some())
    }

    async fn list(&self) -> Result<Vec<ThreadId>, ThreadError> {
        Ok(self.snapshots.read().await.keys().copied().collect())
    }
}

/// One `<thread-id>.json` file per archived thread
#[derive(Debug, Clone)]
pub struct FileColdStorage {
    dir: PathBuf,
}

impl FileColdStorage {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn snapshot_path(&self, id: ThreadId) -> PathBuf {
        self.dir.join(format!("{id}.json"))
    }
}

#[async_trait]
impl ColdStorage for FileColdStorage {
    async fn put(&self, thread: &Thread) -> Result<(), ThreadError> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| ThreadError::cold_io(&self.dir, e))?;

        let path = self.snapshot_path(thread.id);
        let tmp_path = path.with_extension("tmp");
        let json = serde_json::to_string_pretty(thread)?;

        tokio::fs::write(&tmp_path, json)
            .await
            .map_err(|e| ThreadError::cold_io(&tmp_path, e))?;
        tokio::fs::rename(&tmp_path, &path).await.map_err(|e| {
            tracing::error!(from = ?tmp_path, to = ?path, error = %e, "Failed to rename thread snapshot");
            ThreadError::cold_io(&path, e)
        })?;

        tracing::debug!(thread_id = %thread.id, version = thread.version, path = ?path, "Thread archived");
        Ok(())
    }

    async fn get(&self, id: ThreadId) -> Result<Option<Thread>, ThreadError> {
        let path = self.snapshot_path(id);
        match tokio::fs::read_to_string(&path).await {
            Ok(contents) => Ok(Some(serde_json::from_str(&contents)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(ThreadError::cold_io(&path, e)),
        }
    }

    async fn remove(&self, id: ThreadId) -> Result<bool, ThreadError> {
        let path = self.snapshot_path(id);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(ThreadError::cold_io(&path, e)),
        }
    }

    async fn list(&self) -> Result<Vec<ThreadId>, ThreadError> {
        let mut dir = match tokio::fs::read_dir(&self.dir).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(ThreadError::cold_io(&self.dir, e)),
        };

        let mut ids = Vec::new();
        while let Some(entry) = dir
            .next_entry()
            .await
            .map_err(|e| ThreadError::cold_io(&self.dir, e))?
        {
            let name = entry.file_name();
            let Some(stem) = name.to_str().and_then(|n| n.strip_suffix(".json")) else {
                continue;
            };
            match ThreadId::parse(stem) {
                Ok(id) => ids.push(id),
                Err(_) => tracing::warn!(file = stem, "Ignoring unexpected file in cold storage"),
            }
        }
        Ok(ids)
    }
}

/// The cold tier named by `config.cold_storage_dir`, or an in-memory one.
pub fn cold_storage_for(config: &ThreadsConfig) -> Arc<dyn ColdStorage> {
    match &config.cold_storage_dir {
        Some(dir) => Arc::new(FileColdStorage::new(dir.clone())),
        None => Arc::new(InMemoryColdStorage::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delta::{ThreadDelta, apply_delta};
    use crate::thread::{Message, Role};

    #[tokio::test]
    async fn file_snapshots_preserve_version() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileColdStorage::new(dir.path().join("cold"));

        let thread = apply_delta(
            &Thread::new(),
            &ThreadDelta::append(Message::new(Role::User, "archived")),
        )
        .unwrap();
        storage.put(&thread).await.unwrap();

        let restored = storage.get(thread.id).await.unwrap().unwrap();
        assert_eq!(restored, thread);
        assert_eq!(restored.version, 2);
        assert_eq!(storage.list().await.unwrap(), vec![thread.id]);

        assert!(storage.remove(thread.id).await.unwrap());
        assert!(storage.get(thread.id).await.unwrap().is_none());
        assert!(!storage.remove(thread.id).await.unwrap());
    }

    #[tokio::test]
    async fn missing_directory_lists_empty() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileColdStorage::new(dir.path().join("never-created"));
        assert!(storage.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn in_memory_round_trip() {
        let storage = InMemoryColdStorage::new();
        let thread = Thread::new();
        storage.put(&thread).await.unwrap();
        assert_eq!(storage.get(thread.id).await.unwrap(), Some(thread.clone()));
        assert_eq!(storage.list().await.unwrap(), vec![thread.id]);
    }
}
