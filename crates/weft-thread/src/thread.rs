//! Thread and message model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use weft_core::{MessageId, ThreadId};

/// Number of content characters that take part in merge deduplication
pub const DEDUPE_PREFIX_CHARS: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            id: MessageId::generate(),
            role,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Identity used when merging: role, timestamp and the first
    /// [`DEDUPE_PREFIX_CHARS`] characters of content.
    pub fn dedupe_key(&self) -> (Role, DateTime<Utc>, String) {
        (
            self.role,
            self.timestamp,
            self.content.chars().take(DEDUPE_PREFIX_CHARS).collect(),
        )
    }
}

/// Versioned, append-only record of one conversation.
///
/// Only changed through [`crate::delta::apply_delta`] or by installing a
/// merge result; every applied delta advances `version` by exactly one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Thread {
    pub id: ThreadId,
    pub version: u64,
    pub created: DateTime<Utc>,
    pub title: Option<String>,
    pub messages: Vec<Message>,
    pub parent_thread_id: Option<ThreadId>,
    pub child_thread_ids: Vec<ThreadId>,
}

impl Thread {
    /// A fresh empty thread at version 1
    pub fn new() -> Self {
        Self::with_id(ThreadId::generate())
    }

    pub fn with_id(id: ThreadId) -> Self {
        Self {
            id,
            version: 1,
            created: Utc::now(),
            title: None,
            messages: Vec::new(),
            parent_thread_id: None,
            child_thread_ids: Vec::new(),
        }
    }

    pub fn contains_message(&self, id: MessageId) -> bool {
        self.messages.iter().any(|m| m.id == id)
    }

    pub fn last_message(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// Timestamp of the newest message, or creation time for an empty thread
    pub fn last_activity(&self) -> DateTime<Utc> {
        self.messages
            .iter()
            .map(|m| m.timestamp)
            .max()
            .map_or(self.created, |latest| latest.max(self.created))
    }
}

impl Default for Thread {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;

    #[test]
    fn new_threads_start_at_version_one() {
        let thread = Thread::new();
        assert_eq!(thread.version, 1);
        assert!(thread.messages.is_empty());
        assert_eq!(thread.last_activity(), thread.created);
    }

    #[test]
    fn dedupe_key_truncates_content() {
        let long = "x".repeat(80);
        let a = Message::new(Role::User, format!("{long}-a"));
        let b = Message {
            id: MessageId::generate(),
            content: format!("{long}-b"),
            ..a.clone()
        };
        assert_eq!(a.dedupe_key(), b.dedupe_key());
        assert_eq!(a.dedupe_key().2.chars().count(), DEDUPE_PREFIX_CHARS);
    }

    #[test]
    fn last_activity_tracks_newest_message() {
        let mut thread = Thread::new();
        let later = thread.created + TimeDelta::minutes(5);
        thread
            .messages
            .push(Message::new(Role::User, "hi").with_timestamp(later));
        assert_eq!(thread.last_activity(), later);
    }
}
