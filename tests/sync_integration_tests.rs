//! Sync scenarios between clients sharing one remote store

use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use weft::thread::{ColdStorage, FileColdStorage};
use weft::{
    Classify, ErrorKind, InMemoryRemoteStore, Orchestrator, OrchestratorError, RemoteStore, Role,
    SyncState, Thread, ThreadDelta, ToolRegistry, WeftConfig,
};
use weft_permissions::InMemoryGrantStore;
use weft_testing::{ThreadBuilder, message_at};

fn client(remote: &Arc<InMemoryRemoteStore>) -> Orchestrator {
    let mut config = WeftConfig::default();
    config.permissions.interactive = false;
    config.sync.backoff_base = Duration::from_millis(1);
    config.sync.backoff_max = Duration::from_millis(5);
    config.sync.max_attempts = 3;
    Orchestrator::new(config, ToolRegistry::new(), remote.clone()).expect("client should build")
}

#[tokio::test]
async fn test_two_clients_converge_by_timestamp() {
    let remote = Arc::new(InMemoryRemoteStore::new());
    let alice = client(&remote);
    let bob = client(&remote);

    // v4: [A, B, C]
    let shared = ThreadBuilder::new()
        .user("A")
        .assistant("B")
        .user("C")
        .build();
    assert_eq!(shared.version, 4);
    let id = shared.id;
    let start = shared.created;
    alice.threads().insert(shared).await.unwrap();
    alice.sync().mark_dirty(id);
    assert_eq!(alice.sync().sync_once().await.accepted, 1);

    // Bob adopts the thread and appends E; his push is a plain fast-forward.
    let adopted = bob.adopt_thread(id).await.unwrap();
    assert_eq!(adopted.version, 4);
    let bobs = bob
        .threads()
        .apply_latest(
            id,
            ThreadDelta::append(message_at(start, 5_000, Role::User, "E")),
        )
        .await
        .unwrap();
    assert_eq!(bobs.version, 5);
    bob.sync().mark_dirty(id);
    let first = bob.sync().sync_once().await;
    assert_eq!(first.accepted, 1);
    assert_eq!(first.merged, 0);
    assert_eq!(remote.fetch(id).await.unwrap().unwrap().version, 5);

    // Alice appends D, stamped before E, without having seen E.
    alice
        .threads()
        .apply_latest(
            id,
            ThreadDelta::append(message_at(start, 4_000, Role::Assistant, "D")),
        )
        .await
        .unwrap();
    alice.sync().mark_dirty(id);
    assert_eq!(alice.sync().sync_once().await.merged, 1);
    assert_eq!(alice.sync().sync_once().await.accepted, 1);

    let merged = alice.thread(id).await.unwrap();
    let contents: Vec<&str> = merged.messages.iter().map(|m| m.content.as_str()).collect();
    assert_eq!(contents, vec!["A", "B", "C", "D", "E"]);
    assert_eq!(merged.version, 6);
    assert_eq!(remote.fetch(id).await.unwrap().unwrap(), merged);
    assert_eq!(alice.sync().status(id).unwrap().state, SyncState::Synced);
    assert_eq!(
        alice.sync().status(id).unwrap().last_synced_version,
        Some(merged.version)
    );
}

#[tokio::test]
async fn test_outage_surfaces_error_then_recovers() {
    let remote = Arc::new(InMemoryRemoteStore::new());
    let orch = client(&remote);
    let thread = orch.create_thread();
    let mut statuses = orch.observe_sync_status(thread.id);
    assert_eq!(statuses.next().await.unwrap().state, SyncState::Pending);

    remote.set_offline(true);
    for _ in 0..3 {
        orch.sync().sync_once().await;
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    let status = orch.sync().status(thread.id).unwrap();
    assert_eq!(status.state, SyncState::Error);
    assert!(status.last_error.is_some());
    assert_eq!(orch.sync().dirty_count(), 0);

    remote.set_offline(false);
    orch.append_message(thread.id, Role::User, "back online")
        .await
        .unwrap();
    orch.sync().sync_once().await;
    assert_eq!(
        orch.sync().status(thread.id).unwrap().state,
        SyncState::Synced
    );

    let mut saw_synced = false;
    while let Ok(Some(status)) =
        tokio::time::timeout(Duration::from_millis(50), statuses.next()).await
    {
        if status.state == SyncState::Synced {
            saw_synced = true;
            break;
        }
    }
    assert!(saw_synced);
}

#[tokio::test]
async fn test_archived_threads_restore_and_keep_syncing() {
    let dir = tempfile::tempdir().unwrap();
    let cold: Arc<dyn ColdStorage> = Arc::new(FileColdStorage::new(dir.path()));
    let mut config = WeftConfig::default();
    config.permissions.interactive = false;
    config.threads.archive_after = Duration::ZERO;
    let remote = Arc::new(InMemoryRemoteStore::new());
    let orch = Orchestrator::with_stores(
        config,
        ToolRegistry::new(),
        Arc::new(InMemoryGrantStore::new()),
        cold.clone(),
        remote.clone(),
    )
    .unwrap();

    let thread = orch.create_thread();
    orch.append_message(thread.id, Role::User, "before archive")
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(5)).await;

    let archived = orch.archive_inactive().await;
    assert_eq!(archived, vec![thread.id]);
    assert!(!orch.threads().is_hot(thread.id));
    assert_eq!(cold.list().await.unwrap(), vec![thread.id]);

    let updated = orch
        .append_message(thread.id, Role::Assistant, "after restore")
        .await
        .unwrap();
    assert_eq!(updated.messages.len(), 2);
    assert!(orch.threads().is_hot(thread.id));

    orch.shutdown().await;
    assert_eq!(remote.fetch(thread.id).await.unwrap().unwrap(), updated);
}

#[tokio::test]
async fn test_adopting_unknown_thread_is_an_error() {
    let remote = Arc::new(InMemoryRemoteStore::new());
    let orch = client(&remote);
    let thread = Thread::new();

    let err = orch.adopt_thread(thread.id).await.unwrap_err();
    assert!(matches!(err, OrchestratorError::UnknownThread(id) if id == thread.id));
    assert_eq!(err.kind(), ErrorKind::OperationFailed);
}
