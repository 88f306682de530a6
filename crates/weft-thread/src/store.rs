//! Thread version store
//!
//! Hot threads live in a [`DashMap`]; every write is a compare-and-swap on
//! the entry's version, done while holding that entry's shard guard and
//! nothing else. Idle threads move to a [`ColdStorage`] tier and come back
//! transparently on the next read or write.

use crate::cold::{ColdStorage, cold_storage_for};
use crate::delta::{ThreadDelta, apply_delta};
use crate::error::ThreadError;
use crate::thread::Thread;
use chrono::{DateTime, TimeDelta, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Mutex;
use weft_core::{ThreadId, ThreadsConfig};

#[derive(Debug, Clone)]
struct StoredThread {
    thread: Thread,
    last_activity: DateTime<Utc>,
}

impl StoredThread {
    fn fresh(thread: Thread) -> Self {
        Self {
            thread,
            last_activity: Utc::now(),
        }
    }
}

pub struct ThreadStore {
    threads: DashMap<ThreadId, StoredThread>,
    cold: Arc<dyn ColdStorage>,
    config: ThreadsConfig,
    /// Serialises parent/child rewiring so cycle checks see a stable graph
    links: Mutex<()>,
}

impl std::fmt::Debug for ThreadStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThreadStore")
            .field("hot_threads", &self.threads.len())
            .field("config", &self.config)
            .finish()
    }
}

impl ThreadStore {
    pub fn new(config: ThreadsConfig, cold: Arc<dyn ColdStorage>) -> Self {
        Self {
            threads: DashMap::new(),
            cold,
            config,
            links: Mutex::new(()),
        }
    }

    /// Store whose cold tier follows `config.cold_storage_dir`
    pub fn from_config(config: ThreadsConfig) -> Self {
        let cold = cold_storage_for(&config);
        Self::new(config, cold)
    }

    pub fn config(&self) -> &ThreadsConfig {
        &self.config
    }

    /// Create and register an empty thread at version 1
    pub fn create(&self) -> Thread {
        let thread = Thread::new();
        self.threads
            .insert(thread.id, StoredThread::fresh(thread.clone()));
        tracing::debug!(thread_id = %thread.id, "Thread created");
        thread
    }

    /// Register an existing thread as-is, version included
    pub async fn insert(&self, thread: Thread) -> Result<(), ThreadError> {
        let id = thread.id;
        if self.cold.get(id).await?.is_some() {
            return Err(ThreadError::AlreadyExists(id));
        }
        match self.threads.entry(id) {
            Entry::Occupied(_) => Err(ThreadError::AlreadyExists(id)),
            Entry::Vacant(slot) => {
                slot.insert(StoredThread::fresh(thread));
                Ok(())
            }
        }
    }

    /// Whether the thread is resident in memory
    pub fn is_hot(&self, id: ThreadId) -> bool {
        self.threads.contains_key(&id)
    }

    pub async fn is_archived(&self, id: ThreadId) -> Result<bool, ThreadError> {
        if self.is_hot(id) {
            return Ok(false);
        }
        Ok(self.cold.get(id).await?.is_some())
    }

    pub async fn contains(&self, id: ThreadId) -> Result<bool, ThreadError> {
        Ok(self.is_hot(id) || self.cold.get(id).await?.is_some())
    }

    /// Ids of resident threads
    pub fn hot_ids(&self) -> Vec<ThreadId> {
        self.threads.iter().map(|e| *e.key()).collect()
    }

    /// Current snapshot of a thread, restoring it from cold storage if needed
    pub async fn get(&self, id: ThreadId) -> Result<Thread, ThreadError> {
        self.ensure_hot(id).await?;
        self.threads
            .get(&id)
            .map(|entry| entry.thread.clone())
            .ok_or(ThreadError::NotFound(id))
    }

    /// Apply `delta` if the stored version still equals `expected_version`.
    pub async fn apply(
        &self,
        id: ThreadId,
        expected_version: u64,
        delta: ThreadDelta,
    ) -> Result<Thread, ThreadError> {
        self.ensure_hot(id).await?;
        let mut entry = self.threads.get_mut(&id).ok_or(ThreadError::NotFound(id))?;

        let actual = entry.thread.version;
        if actual != expected_version {
            tracing::debug!(thread_id = %id, expected = expected_version, actual, "Version conflict");
            return Err(ThreadError::VersionConflict {
                id,
                expected: expected_version,
                actual,
            });
        }

        let next = apply_delta(&entry.thread, &delta)?;
        entry.thread = next.clone();
        entry.last_activity = Utc::now();
        tracing::debug!(thread_id = %id, version = next.version, delta = delta.name(), "Delta applied");
        Ok(next)
    }

    /// Apply `delta` on top of whatever version is current
    pub async fn apply_latest(&self, id: ThreadId, delta: ThreadDelta) -> Result<Thread, ThreadError> {
        self.ensure_hot(id).await?;
        let mut entry = self.threads.get_mut(&id).ok_or(ThreadError::NotFound(id))?;
        let next = apply_delta(&entry.thread, &delta)?;
        entry.thread = next.clone();
        entry.last_activity = Utc::now();
        tracing::debug!(thread_id = %id, version = next.version, delta = delta.name(), "Delta applied");
        Ok(next)
    }

    /// Install a whole thread (typically a merge result) under the same
    /// version check as [`ThreadStore::apply`]. The replacement must carry a
    /// higher version than the one it replaces.
    pub async fn replace(
        &self,
        id: ThreadId,
        expected_version: u64,
        thread: Thread,
    ) -> Result<Thread, ThreadError> {
        if thread.id != id {
            return Err(ThreadError::MergeMismatch {
                local: id,
                remote: thread.id,
            });
        }

        self.ensure_hot(id).await?;
        let mut entry = self.threads.get_mut(&id).ok_or(ThreadError::NotFound(id))?;

        let current = entry.thread.version;
        if current != expected_version {
            return Err(ThreadError::VersionConflict {
                id,
                expected: expected_version,
                actual: current,
            });
        }
        if thread.version <= current {
            return Err(ThreadError::StaleReplacement {
                id,
                current,
                proposed: thread.version,
            });
        }

        entry.thread = thread.clone();
        entry.last_activity = Utc::now();
        tracing::debug!(thread_id = %id, from = current, to = thread.version, "Thread replaced");
        Ok(thread)
    }

    /// Move threads idle for longer than `archive_after` to cold storage.
    ///
    /// A thread written to while its snapshot is being saved stays hot.
    /// Snapshot failures are logged and leave the thread hot.
    pub async fn archive_inactive(&self, now: DateTime<Utc>) -> Vec<ThreadId> {
        let Ok(window) = TimeDelta::from_std(self.config.archive_after) else {
            return Vec::new();
        };

        let candidates: Vec<Thread> = self
            .threads
            .iter()
            .filter(|entry| now.signed_duration_since(entry.last_activity) > window)
            .map(|entry| entry.thread.clone())
            .collect();

        let mut archived = Vec::new();
        for thread in candidates {
            let id = thread.id;
            if let Err(e) = self.cold.put(&thread).await {
                tracing::warn!(thread_id = %id, error = %e, "Failed to archive thread");
                continue;
            }

            let removed = self
                .threads
                .remove_if(&id, |_, stored| stored.thread.version == thread.version)
                .is_some();
            if removed {
                archived.push(id);
            } else if let Err(e) = self.cold.remove(id).await {
                tracing::warn!(thread_id = %id, error = %e, "Failed to discard stale snapshot");
            }
        }

        if !archived.is_empty() {
            tracing::info!(count = archived.len(), "Archived inactive threads");
        }
        archived
    }

    /// Bring an archived thread back into memory. Returns `false` when the
    /// thread was already hot.
    pub async fn restore(&self, id: ThreadId) -> Result<bool, ThreadError> {
        if self.is_hot(id) {
            return Ok(false);
        }
        self.ensure_hot(id).await?;
        Ok(true)
    }

    async fn ensure_hot(&self, id: ThreadId) -> Result<(), ThreadError> {
        if self.is_hot(id) {
            return Ok(());
        }

        let thread = self.cold.get(id).await?.ok_or(ThreadError::NotFound(id))?;
        let version = thread.version;
        self.threads
            .entry(id)
            .or_insert_with(|| StoredThread::fresh(thread));

        if let Err(e) = self.cold.remove(id).await {
            tracing::warn!(thread_id = %id, error = %e, "Restored thread left a cold snapshot behind");
        }
        tracing::debug!(thread_id = %id, version, "Thread restored from cold storage");
        Ok(())
    }

    /// Parents of `id`, nearest first, following at most `max_child_depth`
    /// links.
    pub async fn ancestors(&self, id: ThreadId) -> Result<Vec<ThreadId>, ThreadError> {
        let mut chain = Vec::new();
        let mut current = self.get(id).await?.parent_thread_id;

        while let Some(parent) = current {
            if chain.len() >= self.config.max_child_depth || chain.contains(&parent) {
                break;
            }
            chain.push(parent);
            current = match self.get(parent).await {
                Ok(thread) => thread.parent_thread_id,
                Err(ThreadError::NotFound(_)) => None,
                Err(e) => return Err(e),
            };
        }
        Ok(chain)
    }

    /// Depth of the deepest descendant below `id` (0 for a leaf), capped one
    /// past the configured limit.
    async fn subtree_height(&self, id: ThreadId) -> Result<usize, ThreadError> {
        let cap = self.config.max_child_depth + 1;
        let mut level = vec![id];
        let mut seen = HashSet::from([id]);
        let mut height = 0;

        while height < cap {
            let mut next_level = Vec::new();
            for thread_id in level {
                let children = match self.get(thread_id).await {
                    Ok(thread) => thread.child_thread_ids,
                    Err(ThreadError::NotFound(_)) => continue,
                    Err(e) => return Err(e),
                };
                next_level.extend(children.into_iter().filter(|c| seen.insert(*c)));
            }
            if next_level.is_empty() {
                break;
            }
            height += 1;
            level = next_level;
        }
        Ok(height)
    }

    /// Make `child` a child of `parent`, recording both directions.
    ///
    /// A child already linked elsewhere is moved. Links that would nest
    /// deeper than `max_child_depth` or close a cycle are refused.
    pub async fn link_child(&self, parent: ThreadId, child: ThreadId) -> Result<Thread, ThreadError> {
        if parent == child {
            return Err(ThreadError::Cycle { parent, child });
        }

        let _links = self.links.lock().await;
        let child_thread = self.get(child).await?;
        let ancestors = self.ancestors(parent).await?;
        if ancestors.contains(&child) {
            return Err(ThreadError::Cycle { parent, child });
        }

        let limit = self.config.max_child_depth;
        let depth = ancestors.len() + 1 + self.subtree_height(child).await?;
        if depth > limit {
            return Err(ThreadError::DepthExceeded {
                parent,
                child,
                limit,
            });
        }

        if let Some(old_parent) = child_thread.parent_thread_id.filter(|p| *p != parent) {
            match self
                .apply_latest(old_parent, ThreadDelta::UnlinkChild { child })
                .await
            {
                Ok(_) | Err(ThreadError::NotFound(_)) => {}
                Err(e) => return Err(e),
            }
        }

        let parent_thread = self
            .apply_latest(parent, ThreadDelta::LinkChild { child })
            .await?;
        self.apply_latest(
            child,
            ThreadDelta::SetParent {
                parent: Some(parent),
            },
        )
        .await?;

        tracing::debug!(parent = %parent, child = %child, depth, "Child thread linked");
        Ok(parent_thread)
    }

    /// Create a new thread and link it under `parent`
    pub async fn spawn_child(&self, parent: ThreadId) -> Result<Thread, ThreadError> {
        self.get(parent).await?;
        let child = self.create();
        if let Err(e) = self.link_child(parent, child.id).await {
            self.threads.remove(&child.id);
            return Err(e);
        }
        self.get(child.id).await
    }
}
