//! # Weft Sync
//!
//! Pushes locally written threads to a [`RemoteStore`] in the background.
//! Failed pushes back off exponentially with jitter; a diverged remote is
//! merged three-way into the local copy and pushed again. Per-thread status
//! is observable as a stream.

pub mod backoff;
pub mod error;
pub mod queue;
pub mod remote;
pub mod service;
pub mod status;

pub use backoff::Backoff;
pub use error::SyncError;
pub use queue::{DirtyQueue, QueueEntry};
pub use remote::{InMemoryRemoteStore, PushOutcome, RemoteStore};
pub use service::{SyncHandle, SyncReport, SyncService};
pub use status::{StatusBoard, SyncState, SyncStatus};
