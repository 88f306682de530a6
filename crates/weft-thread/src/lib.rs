//! # Weft Thread
//!
//! Versioned conversation threads. A [`Thread`] changes only through
//! [`ThreadDelta`]s applied under an optimistic version check, or by
//! installing the result of a three-way [`merge_threads`]. Idle threads are
//! moved to a [`ColdStorage`] tier and restored on demand.

pub mod cold;
pub mod delta;
pub mod error;
pub mod merge;
pub mod store;
pub mod thread;

pub use cold::{ColdStorage, FileColdStorage, InMemoryColdStorage, cold_storage_for};
pub use delta::{MAX_TITLE_CHARS, ThreadDelta, apply_delta};
pub use error::ThreadError;
pub use merge::merge_threads;
pub use store::ThreadStore;
pub use thread::{DEDUPE_PREFIX_CHARS, Message, Role, Thread};
