//! Remote thread store interface

use crate::error::SyncError;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::sync::{Mutex, RwLock};
use weft_core::ThreadId;
use weft_thread::Thread;

/// Result of pushing a thread snapshot
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushOutcome {
    Accepted,
    /// The remote moved on since the version the push was based on
    Diverged(Thread),
    /// Permanently refused; not retried until the thread is marked dirty again
    Rejected(String),
}

#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Push `thread`, expecting the remote copy to still be at
    /// `expected_version` (`None` for a thread the remote has never seen).
    async fn push(
        &self,
        thread: &Thread,
        expected_version: Option<u64>,
    ) -> Result<PushOutcome, SyncError>;

    async fn fetch(&self, id: ThreadId) -> Result<Option<Thread>, SyncError>;
}

/// In-process remote, also used to simulate other clients and outages.
#[derive(Debug, Default)]
pub struct InMemoryRemoteStore {
    threads: RwLock<HashMap<ThreadId, Thread>>,
    offline: AtomicBool,
    rejection: Mutex<Option<String>>,
    pushes: AtomicU64,
}

impl InMemoryRemoteStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// While offline every call fails with [`SyncError::RemoteUnavailable`]
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Refuse every push with `reason` until cleared with `None`
    pub async fn reject_with(&self, reason: Option<String>) {
        *self.rejection.lock().await = reason;
    }

    /// Write a thread directly, as another client would
    pub async fn put(&self, thread: Thread) {
        self.threads.write().await.insert(thread.id, thread);
    }

    pub fn push_count(&self) -> u64 {
        self.pushes.load(Ordering::SeqCst)
    }

    fn check_online(&self) -> Result<(), SyncError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(SyncError::unavailable("remote store is offline"));
        }
        Ok(())
    }
}

#[async_trait]
impl RemoteStore for InMemoryRemoteStore {
    async fn push(
        &self,
        thread: &Thread,
        expected_version: Option<u64>,
    ) -> Result<PushOutcome, SyncError> {
        self.pushes.fetch_add(1, Ordering::SeqCst);
        self.check_online()?;

        if let Some(reason) = self.rejection.lock().await.clone() {
            return Ok(PushOutcome::Rejected(reason));
        }

        let mut threads = self.threads.write().await;
        let outcome = match threads.get(&thread.id) {
            Some(current) if current == thread => PushOutcome::Accepted,
            Some(current) if Some(current.version) != expected_version => {
                PushOutcome::Diverged(current.clone())
            }
            _ => {
                threads.insert(thread.id, thread.clone());
                PushOutcome::Accepted
            }
        };
        Ok(outcome)
    }

    async fn fetch(&self, id: ThreadId) -> Result<Option<Thread>, SyncError> {
        self.check_online()?;
        Ok(self.threads.read().await.get(&id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use weft_thread::{Message, Role, ThreadDelta, apply_delta};

    #[tokio::test]
    async fn push_detects_divergence() {
        let remote = InMemoryRemoteStore::new();
        let thread = Thread::new();

        assert_eq!(remote.push(&thread, None).await.unwrap(), PushOutcome::Accepted);

        let theirs = apply_delta(&thread, &ThreadDelta::append(Message::new(Role::User, "theirs"))).unwrap();
        remote.put(theirs.clone()).await;

        let ours = apply_delta(&thread, &ThreadDelta::append(Message::new(Role::User, "ours"))).unwrap();
        assert_eq!(
            remote.push(&ours, Some(thread.version)).await.unwrap(),
            PushOutcome::Diverged(theirs.clone())
        );
        assert_eq!(remote.push(&ours, Some(theirs.version)).await.unwrap(), PushOutcome::Accepted);
        assert_eq!(remote.fetch(thread.id).await.unwrap(), Some(ours));
    }

    #[tokio::test]
    async fn offline_and_rejection() {
        let remote = InMemoryRemoteStore::new();
        let thread = Thread::new();

        remote.set_offline(true);
        assert!(matches!(
            remote.push(&thread, None).await,
            Err(SyncError::RemoteUnavailable(_))
        ));
        remote.set_offline(false);

        remote.reject_with(Some("quota".into())).await;
        assert_eq!(
            remote.push(&thread, None).await.unwrap(),
            PushOutcome::Rejected("quota".into())
        );
        assert_eq!(remote.push_count(), 2);
    }
}
