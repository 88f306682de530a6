//! Background sync service
//!
//! Local writes only mark a thread dirty; pushing happens on a periodic
//! loop. A diverged remote is merged into the local copy through the store's
//! version check, and the merge result is pushed on a later pass.

use crate::backoff::Backoff;
use crate::error::SyncError;
use crate::queue::DirtyQueue;
use crate::remote::{PushOutcome, RemoteStore};
use crate::status::{StatusBoard, SyncState, SyncStatus};
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_stream::wrappers::WatchStream;
use tokio_util::sync::CancellationToken;
use weft_core::{Classify, ErrorKind, ScalarConflictPolicy, SyncConfig, ThreadId};
use weft_observability::{PushOutcomeLabel, WeftMetrics};
use weft_thread::{Thread, ThreadError, ThreadStore, merge_threads};

/// Counts from one drain pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub attempted: usize,
    pub accepted: usize,
    pub merged: usize,
    pub rejected: usize,
    pub failed: usize,
    pub conflicts: usize,
}

pub struct SyncService {
    store: Arc<ThreadStore>,
    remote: Arc<dyn RemoteStore>,
    config: SyncConfig,
    policy: ScalarConflictPolicy,
    backoff: Backoff,
    queue: DirtyQueue,
    statuses: StatusBoard,
    /// Last remote state known to be shared with the local copy
    bases: DashMap<ThreadId, Thread>,
    pass: Mutex<()>,
    shutdown: CancellationToken,
    metrics: Option<Arc<WeftMetrics>>,
}

impl std::fmt::Debug for SyncService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncService")
            .field("config", &self.config)
            .field("dirty", &self.queue.len())
            .finish()
    }
}

/// Handle to the running loop
#[derive(Debug)]
pub struct SyncHandle {
    handle: JoinHandle<()>,
    shutdown: CancellationToken,
}

impl SyncHandle {
    /// Stop the loop after its current pass and wait for it
    pub async fn stop(self) {
        self.shutdown.cancel();
        if let Err(e) = self.handle.await {
            tracing::warn!(error = %e, "Sync loop ended abnormally");
        }
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl SyncService {
    pub fn new(
        store: Arc<ThreadStore>,
        remote: Arc<dyn RemoteStore>,
        config: SyncConfig,
        policy: ScalarConflictPolicy,
    ) -> Self {
        Self {
            store,
            remote,
            backoff: Backoff::from_config(&config),
            config,
            policy,
            queue: DirtyQueue::new(),
            statuses: StatusBoard::new(),
            bases: DashMap::new(),
            pass: Mutex::new(()),
            shutdown: CancellationToken::new(),
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<WeftMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Record `thread` as the last state shared with the remote, for a
    /// thread installed locally from a remote copy.
    pub fn track_remote(&self, thread: &Thread) {
        self.bases.insert(thread.id, thread.clone());
        let dirty = self.queue.contains(thread.id);
        self.statuses.update(thread.id, |status| {
            status.state = if dirty {
                SyncState::Pending
            } else {
                SyncState::Synced
            };
            status.last_synced_version = Some(thread.version);
            status.last_error = None;
        });
    }

    /// Fetch a thread from the remote and install it locally as synced.
    /// Returns `None` when the remote does not know the thread.
    pub async fn adopt(&self, id: ThreadId) -> Result<Option<Thread>, SyncError> {
        let Some(thread) = self.remote.fetch(id).await? else {
            return Ok(None);
        };
        self.store.insert(thread.clone()).await?;
        self.track_remote(&thread);
        tracing::debug!(thread_id = %id, version = thread.version, "Adopted remote thread");
        Ok(Some(thread))
    }

    /// Queue a locally written thread for pushing. Never blocks.
    pub fn mark_dirty(&self, id: ThreadId) {
        if self.queue.mark(id) {
            tracing::debug!(thread_id = %id, "Thread marked dirty");
        }
        self.statuses.update(id, |status| {
            status.state = SyncState::Pending;
            status.last_error = None;
        });
        self.update_dirty_gauge();
    }

    pub fn dirty_count(&self) -> usize {
        self.queue.len()
    }

    pub fn status(&self, id: ThreadId) -> Option<SyncStatus> {
        self.statuses.get(id)
    }

    pub fn subscribe(&self, id: ThreadId) -> watch::Receiver<SyncStatus> {
        self.statuses.subscribe(id)
    }

    pub fn observe(&self, id: ThreadId) -> WatchStream<SyncStatus> {
        self.statuses.observe(id)
    }

    /// Spawn the periodic loop. Stops when [`SyncHandle::stop`] or
    /// [`SyncService::shutdown`] is called.
    pub fn start(self: &Arc<Self>) -> SyncHandle {
        let service = Arc::clone(self);
        let shutdown = self.shutdown.clone();

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(service.config.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            tracing::info!(interval_ms = service.config.interval.as_millis() as u64, "Sync loop started");

            loop {
                tokio::select! {
                    _ = service.shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        service.sync_once().await;
                    }
                }
            }
            tracing::info!(dirty = service.queue.len(), "Sync loop stopped");
        });

        SyncHandle { handle, shutdown }
    }

    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Run one drain pass: push up to `batch_size` ready threads.
    pub async fn sync_once(&self) -> SyncReport {
        let _pass = self.pass.lock().await;
        let mut report = SyncReport::default();

        let ready = self
            .queue
            .take_ready(Instant::now(), self.config.batch_size.max(1));
        for (id, entry) in ready {
            report.attempted += 1;
            self.sync_thread(id, entry.attempts, &mut report).await;
        }

        self.update_dirty_gauge();
        if report.attempted > 0 {
            tracing::info!(
                attempted = report.attempted,
                accepted = report.accepted,
                merged = report.merged,
                failed = report.failed,
                conflicts = report.conflicts,
                "Sync pass finished"
            );
        }
        report
    }

    async fn sync_thread(&self, id: ThreadId, attempts: u32, report: &mut SyncReport) {
        let local = match self.store.get(id).await {
            Ok(thread) => thread,
            Err(ThreadError::NotFound(_)) => {
                tracing::warn!(thread_id = %id, "Dirty thread no longer exists");
                self.fail_permanently(id, "thread not found".to_string());
                report.failed += 1;
                return;
            }
            Err(e) => {
                self.retry_later(id, attempts, e.to_string());
                report.failed += 1;
                return;
            }
        };

        self.statuses.set_state(id, SyncState::Syncing);
        let mut base = self.bases.get(&id).map(|b| b.value().clone());
        let expected = base.as_ref().map(|b| b.version);

        let outcome = match self.remote.push(&local, expected).await {
            Ok(PushOutcome::Diverged(remote)) if is_fast_forward(base.as_ref(), &local, &remote) => {
                tracing::debug!(
                    thread_id = %id,
                    local_version = local.version,
                    remote_version = remote.version,
                    "Remote is behind local; fast-forwarding"
                );
                let expected = Some(remote.version);
                self.bases.insert(id, remote.clone());
                base = Some(remote);
                self.remote.push(&local, expected).await
            }
            other => other,
        };

        match outcome {
            Ok(PushOutcome::Accepted) => {
                self.record_push(PushOutcomeLabel::Accepted);
                self.bases.insert(id, local.clone());
                let still_dirty = self.queue.contains(id);
                self.statuses.update(id, |status| {
                    status.state = if still_dirty {
                        SyncState::Pending
                    } else {
                        SyncState::Synced
                    };
                    status.last_synced_version = Some(local.version);
                    status.last_error = None;
                });
                tracing::debug!(thread_id = %id, version = local.version, "Thread synced");
                report.accepted += 1;
            }
            Ok(PushOutcome::Diverged(remote)) => {
                self.record_push(PushOutcomeLabel::Diverged);
                match self.merge_diverged(&local, base, remote).await {
                    Ok(()) => report.merged += 1,
                    Err(e) if e.kind() == ErrorKind::VersionConflict => {
                        // Local moved on while merging; next pass sees the new version.
                        self.queue.mark(id);
                        self.statuses.set_state(id, SyncState::Pending);
                    }
                    Err(e) => {
                        tracing::error!(thread_id = %id, error = %e, "Diverged thread cannot be merged");
                        self.statuses.update(id, |status| {
                            status.state = SyncState::Conflict;
                            status.last_error = Some(e.to_string());
                        });
                        report.conflicts += 1;
                    }
                }
            }
            Ok(PushOutcome::Rejected(reason)) => {
                self.record_push(PushOutcomeLabel::Rejected);
                tracing::error!(thread_id = %id, reason = %reason, "Remote rejected thread");
                self.fail_permanently(id, reason);
                report.rejected += 1;
            }
            Err(e) => {
                self.record_push(PushOutcomeLabel::Failed);
                self.retry_later(id, attempts, e.to_string());
                report.failed += 1;
            }
        }
    }

    async fn merge_diverged(
        &self,
        local: &Thread,
        base: Option<Thread>,
        remote: Thread,
    ) -> Result<(), SyncError> {
        let base = base.unwrap_or_else(|| remote.clone());
        let merged = merge_threads(&base, local, &remote, self.policy)?;
        let merged = self.store.replace(local.id, local.version, merged).await?;

        tracing::info!(
            thread_id = %local.id,
            local_version = local.version,
            remote_version = remote.version,
            merged_version = merged.version,
            "Merged diverged thread"
        );
        self.bases.insert(local.id, remote);
        self.queue.mark(local.id);
        self.statuses.set_state(local.id, SyncState::Pending);
        Ok(())
    }

    fn retry_later(&self, id: ThreadId, attempts: u32, error: String) {
        let attempts = attempts + 1;
        if attempts >= self.config.max_attempts {
            tracing::error!(thread_id = %id, attempts, error = %error, "Sync retries exhausted");
            self.fail_permanently(id, error);
            return;
        }

        let delay = self.backoff.delay(attempts);
        tracing::warn!(
            thread_id = %id,
            attempts,
            retry_in_ms = delay.as_millis() as u64,
            error = %error,
            "Sync push failed; backing off"
        );
        self.queue.retry_at(id, attempts, Instant::now() + delay);
        self.statuses.update(id, |status| {
            status.state = SyncState::Pending;
            status.last_error = Some(error);
        });
    }

    /// Leave the queue until the thread is marked dirty again
    fn fail_permanently(&self, id: ThreadId, error: String) {
        self.queue.remove(id);
        self.statuses.update(id, |status| {
            status.state = SyncState::Error;
            status.last_error = Some(error);
        });
    }

    fn record_push(&self, outcome: PushOutcomeLabel) {
        if let Some(metrics) = &self.metrics {
            metrics.record_sync_push(outcome);
        }
    }

    fn update_dirty_gauge(&self) {
        if let Some(metrics) = &self.metrics {
            metrics.set_dirty_threads(self.queue.len());
        }
    }
}

/// Whether `remote` is an ancestor of `local`, so pushing local as-is
/// loses nothing from the remote.
fn is_fast_forward(base: Option<&Thread>, local: &Thread, remote: &Thread) -> bool {
    let scalars = |t: &Thread| (t.title.clone(), t.parent_thread_id);
    let scalars_kept = scalars(remote) == scalars(local)
        || base.is_some_and(|b| scalars(remote) == scalars(b));

    remote.version < local.version
        && local.messages.starts_with(&remote.messages)
        && remote
            .child_thread_ids
            .iter()
            .all(|child| local.child_thread_ids.contains(child))
        && scalars_kept
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::InMemoryRemoteStore;
    use futures::StreamExt;
    use std::time::Duration;
    use weft_core::ThreadsConfig;
    use weft_thread::{InMemoryColdStorage, Message, Role, ThreadDelta};

    struct Fixture {
        store: Arc<ThreadStore>,
        remote: Arc<InMemoryRemoteStore>,
        sync: Arc<SyncService>,
    }

    fn fixture(config: SyncConfig) -> Fixture {
        let store = Arc::new(ThreadStore::new(
            ThreadsConfig::default(),
            Arc::new(InMemoryColdStorage::new()),
        ));
        let remote = Arc::new(InMemoryRemoteStore::new());
        let sync = Arc::new(SyncService::new(
            Arc::clone(&store),
            remote.clone(),
            config,
            ScalarConflictPolicy::LocalWins,
        ));
        Fixture {
            store,
            remote,
            sync,
        }
    }

    fn fast_retries(max_attempts: u32) -> SyncConfig {
        SyncConfig {
            interval: Duration::from_millis(10),
            backoff_base: Duration::from_millis(1),
            backoff_max: Duration::from_millis(2),
            jitter: 0.0,
            max_attempts,
            ..SyncConfig::default()
        }
    }

    async fn say(store: &ThreadStore, id: ThreadId, text: &str) -> Thread {
        store
            .apply_latest(id, ThreadDelta::append(Message::new(Role::User, text)))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn accepted_push_marks_synced() {
        let f = fixture(SyncConfig::default());
        let thread = f.store.create();
        let v2 = say(&f.store, thread.id, "hello").await;

        f.sync.mark_dirty(thread.id);
        assert_eq!(f.sync.status(thread.id).unwrap().state, SyncState::Pending);

        let report = f.sync.sync_once().await;
        assert_eq!(report.accepted, 1);
        let status = f.sync.status(thread.id).unwrap();
        assert_eq!(status.state, SyncState::Synced);
        assert_eq!(status.last_synced_version, Some(v2.version));
        assert_eq!(f.remote.fetch(thread.id).await.unwrap(), Some(v2));
        assert_eq!(f.sync.dirty_count(), 0);
    }

    #[tokio::test]
    async fn divergence_merges_and_repushes() {
        let f = fixture(SyncConfig::default());
        let thread = f.store.create();
        let synced = say(&f.store, thread.id, "A").await;
        f.sync.mark_dirty(thread.id);
        f.sync.sync_once().await;

        let theirs = weft_thread::apply_delta(
            &synced,
            &ThreadDelta::append(Message::new(Role::Assistant, "from another client")),
        )
        .unwrap();
        f.remote.put(theirs.clone()).await;

        let ours = say(&f.store, thread.id, "local follow-up").await;
        f.sync.mark_dirty(thread.id);

        let first = f.sync.sync_once().await;
        assert_eq!(first.merged, 1);
        let merged = f.store.get(thread.id).await.unwrap();
        assert_eq!(merged.version, ours.version.max(theirs.version) + 1);
        assert_eq!(merged.messages.len(), 3);
        assert_eq!(f.sync.status(thread.id).unwrap().state, SyncState::Pending);

        let second = f.sync.sync_once().await;
        assert_eq!(second.accepted, 1);
        assert_eq!(f.remote.fetch(thread.id).await.unwrap(), Some(merged.clone()));
        assert_eq!(
            f.sync.status(thread.id).unwrap().last_synced_version,
            Some(merged.version)
        );
    }

    #[tokio::test]
    async fn remote_ancestor_fast_forwards_without_merging() {
        let f = fixture(SyncConfig::default());
        let thread = f.store.create();
        let pushed = say(&f.store, thread.id, "A").await;
        f.remote.put(pushed.clone()).await;

        // No recorded base, as after a restart.
        let ours = say(&f.store, thread.id, "B").await;
        f.sync.mark_dirty(thread.id);

        let report = f.sync.sync_once().await;
        assert_eq!(report.accepted, 1);
        assert_eq!(report.merged, 0);
        assert_eq!(f.store.get(thread.id).await.unwrap(), ours);
        assert_eq!(f.remote.fetch(thread.id).await.unwrap(), Some(ours.clone()));
        assert_eq!(
            f.sync.status(thread.id).unwrap().last_synced_version,
            Some(pushed.version + 1)
        );
    }

    #[tokio::test]
    async fn remote_title_change_is_not_a_fast_forward() {
        let f = fixture(SyncConfig::default());
        let thread = f.store.create();
        let shared = say(&f.store, thread.id, "A").await;
        f.sync.mark_dirty(thread.id);
        f.sync.sync_once().await;
        let renamed = weft_thread::apply_delta(
            &shared,
            &ThreadDelta::SetTitle {
                title: Some("renamed elsewhere".into()),
            },
        )
        .unwrap();
        f.remote.put(renamed).await;

        let _ours = say(&f.store, thread.id, "B").await;
        let _ours = say(&f.store, thread.id, "C").await;
        f.sync.mark_dirty(thread.id);

        assert_eq!(f.sync.sync_once().await.merged, 1);
        let merged = f.store.get(thread.id).await.unwrap();
        assert_eq!(merged.title.as_deref(), Some("renamed elsewhere"));
    }

    #[tokio::test]
    async fn adopted_thread_pushes_against_fetched_version() {
        let f = fixture(SyncConfig::default());
        let elsewhere = weft_thread::apply_delta(
            &Thread::new(),
            &ThreadDelta::append(Message::new(Role::User, "from another client")),
        )
        .unwrap();
        f.remote.put(elsewhere.clone()).await;

        let adopted = f.sync.adopt(elsewhere.id).await.unwrap().unwrap();
        assert_eq!(adopted, elsewhere);
        let status = f.sync.status(elsewhere.id).unwrap();
        assert_eq!(status.state, SyncState::Synced);
        assert_eq!(status.last_synced_version, Some(elsewhere.version));

        let ours = say(&f.store, elsewhere.id, "reply").await;
        f.sync.mark_dirty(elsewhere.id);
        let report = f.sync.sync_once().await;
        assert_eq!(report.accepted, 1);
        assert_eq!(report.merged, 0);
        assert_eq!(ours.version, elsewhere.version + 1);
        assert_eq!(f.remote.fetch(elsewhere.id).await.unwrap(), Some(ours));
        assert_eq!(f.remote.push_count(), 1);
    }

    #[tokio::test]
    async fn adopting_unknown_thread_returns_none() {
        let f = fixture(SyncConfig::default());
        assert!(f.sync.adopt(ThreadId::generate()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn failures_back_off_then_error() {
        let f = fixture(fast_retries(3));
        let thread = f.store.create();
        f.remote.set_offline(true);
        f.sync.mark_dirty(thread.id);

        for _ in 0..3 {
            tokio::time::sleep(Duration::from_millis(10)).await;
            f.sync.sync_once().await;
        }

        let status = f.sync.status(thread.id).unwrap();
        assert_eq!(status.state, SyncState::Error);
        assert!(status.last_error.is_some());
        assert_eq!(f.sync.dirty_count(), 0);
        assert_eq!(f.remote.push_count(), 3);

        // Marking dirty again resumes syncing.
        f.remote.set_offline(false);
        f.sync.mark_dirty(thread.id);
        f.sync.sync_once().await;
        assert_eq!(f.sync.status(thread.id).unwrap().state, SyncState::Synced);
    }

    #[tokio::test]
    async fn backoff_defers_retry() {
        let f = fixture(SyncConfig {
            backoff_base: Duration::from_secs(60),
            jitter: 0.0,
            ..SyncConfig::default()
        });
        let thread = f.store.create();
        f.remote.set_offline(true);
        f.sync.mark_dirty(thread.id);

        assert_eq!(f.sync.sync_once().await.failed, 1);
        f.remote.set_offline(false);
        assert_eq!(f.sync.sync_once().await.attempted, 0);
        assert_eq!(f.sync.dirty_count(), 1);
    }

    #[tokio::test]
    async fn rejection_is_terminal_until_marked_again() {
        let f = fixture(SyncConfig::default());
        let thread = f.store.create();
        f.remote.reject_with(Some("read-only remote".into())).await;
        f.sync.mark_dirty(thread.id);

        let report = f.sync.sync_once().await;
        assert_eq!(report.rejected, 1);
        let status = f.sync.status(thread.id).unwrap();
        assert_eq!(status.state, SyncState::Error);
        assert_eq!(status.last_error.as_deref(), Some("read-only remote"));
        assert_eq!(f.sync.dirty_count(), 0);
    }

    #[tokio::test]
    async fn observe_streams_status_changes() {
        let f = fixture(SyncConfig::default());
        let thread = f.store.create();
        f.sync.mark_dirty(thread.id);

        let mut stream = f.sync.observe(thread.id);
        assert_eq!(stream.next().await.unwrap().state, SyncState::Pending);

        f.sync.sync_once().await;
        let status = stream.next().await.unwrap();
        assert_eq!(status.state, SyncState::Synced);
        assert_eq!(status.last_synced_version, Some(1));
    }

    #[tokio::test]
    async fn background_loop_pushes_and_stops() {
        let f = fixture(fast_retries(8));
        let handle = f.sync.start();
        let thread = f.store.create();
        let mut rx = f.sync.subscribe(thread.id);
        f.sync.mark_dirty(thread.id);

        tokio::time::timeout(Duration::from_secs(5), async {
            while rx.borrow_and_update().state != SyncState::Synced {
                rx.changed().await.unwrap();
            }
        })
        .await
        .unwrap();

        handle.stop().await;
        assert!(f.remote.fetch(thread.id).await.unwrap().is_some());
    }
}
