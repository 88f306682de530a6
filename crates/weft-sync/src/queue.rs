//! Dirty-thread queue
//!
//! Each entry remembers when it may next be pushed and how many consecutive
//! pushes have failed. Ready entries drain oldest-first.

use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::time::Instant;
use weft_core::ThreadId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueEntry {
    pub ready_at: Instant,
    pub attempts: u32,
    seq: u64,
}

#[derive(Debug, Default)]
pub struct DirtyQueue {
    entries: DashMap<ThreadId, QueueEntry>,
    next_seq: AtomicU64,
}

impl DirtyQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn seq(&self) -> u64 {
        self.next_seq.fetch_add(1, Ordering::Relaxed)
    }

    /// Queue `id` for an immediate push. A thread already waiting out a
    /// backoff keeps its schedule. Returns whether the thread was newly queued.
    pub fn mark(&self, id: ThreadId) -> bool {
        let mut inserted = false;
        self.entries.entry(id).or_insert_with(|| {
            inserted = true;
            QueueEntry {
                ready_at: Instant::now(),
                attempts: 0,
                seq: self.seq(),
            }
        });
        inserted
    }

    /// Re-queue after a failed push
    pub fn retry_at(&self, id: ThreadId, attempts: u32, ready_at: Instant) {
        let seq = self.seq();
        self.entries
            .entry(id)
            .and_modify(|entry| {
                entry.attempts = entry.attempts.max(attempts);
                entry.ready_at = entry.ready_at.max(ready_at);
            })
            .or_insert(QueueEntry {
                ready_at,
                attempts,
                seq,
            });
    }

    /// Remove and return up to `limit` entries that are due at `now`
    pub fn take_ready(&self, now: Instant, limit: usize) -> Vec<(ThreadId, QueueEntry)> {
        let mut ready: Vec<(ThreadId, QueueEntry)> = self
            .entries
            .iter()
            .filter(|e| e.ready_at <= now)
            .map(|e| (*e.key(), *e.value()))
            .collect();
        ready.sort_by_key(|(_, entry)| (entry.ready_at, entry.seq));
        ready.truncate(limit);

        ready
            .into_iter()
            .filter_map(|(id, _)| self.entries.remove(&id))
            .collect()
    }

    pub fn contains(&self, id: ThreadId) -> bool {
        self.entries.contains_key(&id)
    }

    pub fn remove(&self, id: ThreadId) -> bool {
        self.entries.remove(&id).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn drains_oldest_first_up_to_limit() {
        let queue = DirtyQueue::new();
        let ids: Vec<ThreadId> = (0..3).map(|_| ThreadId::generate()).collect();
        for id in &ids {
            assert!(queue.mark(*id));
        }
        assert!(!queue.mark(ids[0]));

        let now = Instant::now();
        let first: Vec<ThreadId> = queue.take_ready(now, 2).into_iter().map(|(id, _)| id).collect();
        assert_eq!(first, ids[..2]);
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn backoff_entries_wait() {
        let queue = DirtyQueue::new();
        let id = ThreadId::generate();
        let now = Instant::now();
        queue.retry_at(id, 2, now + Duration::from_secs(5));

        assert!(queue.take_ready(now, 10).is_empty());
        assert!(!queue.mark(id));

        let due = queue.take_ready(now + Duration::from_secs(6), 10);
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].1.attempts, 2);
        assert!(queue.is_empty());
    }
}
