//! Per-thread sync status

use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;
use weft_core::ThreadId;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncState {
    #[default]
    Pending,
    Syncing,
    Synced,
    /// Divergence that could not be merged; needs manual resolution
    Conflict,
    /// Retries exhausted or push rejected
    Error,
}

impl SyncState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncState::Pending => "pending",
            SyncState::Syncing => "syncing",
            SyncState::Synced => "synced",
            SyncState::Conflict => "conflict",
            SyncState::Error => "error",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncStatus {
    pub state: SyncState,
    /// Highest local version the remote has accepted
    pub last_synced_version: Option<u64>,
    pub last_error: Option<String>,
}

/// One watch channel per thread. Senders stay in the map, so subscribers
/// never see the channel close while the board lives.
#[derive(Debug, Default)]
pub struct StatusBoard {
    channels: DashMap<ThreadId, watch::Sender<SyncStatus>>,
}

impl StatusBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&self, id: ThreadId, change: impl FnOnce(&mut SyncStatus)) {
        self.channels
            .entry(id)
            .or_insert_with(|| watch::channel(SyncStatus::default()).0)
            .send_modify(change);
    }

    pub fn set_state(&self, id: ThreadId, state: SyncState) {
        self.update(id, |status| status.state = state);
    }

    pub fn get(&self, id: ThreadId) -> Option<SyncStatus> {
        self.channels.get(&id).map(|tx| tx.borrow().clone())
    }

    pub fn subscribe(&self, id: ThreadId) -> watch::Receiver<SyncStatus> {
        self.channels
            .entry(id)
            .or_insert_with(|| watch::channel(SyncStatus::default()).0)
            .subscribe()
    }

    /// Stream of status changes, starting with the current one
    pub fn observe(&self, id: ThreadId) -> WatchStream<SyncStatus> {
        WatchStream::new(self.subscribe(id))
    }
}
