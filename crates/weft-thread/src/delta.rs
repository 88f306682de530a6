//! Thread deltas
//!
//! [`apply_delta`] is a pure function: the same thread and delta always give
//! the same result, and the input thread is never touched.

use crate::error::ThreadError;
use crate::thread::{Message, Thread};
use serde::{Deserialize, Serialize};
use weft_core::ThreadId;

/// Longest accepted title, in characters
pub const MAX_TITLE_CHARS: usize = 256;

/// An atomic state transition of a thread
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ThreadDelta {
    /// Append a message; a message id already present is ignored
    AppendMessage { message: Message },
    SetTitle { title: Option<String> },
    /// Keep the first `keep` messages
    Truncate { keep: usize },
    /// Record a child; already-linked children are ignored
    LinkChild { child: ThreadId },
    UnlinkChild { child: ThreadId },
    SetParent { parent: Option<ThreadId> },
}

impl ThreadDelta {
    pub fn append(message: Message) -> Self {
        Self::AppendMessage { message }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ThreadDelta::AppendMessage { .. } => "append_message",
            ThreadDelta::SetTitle { .. } => "set_title",
            ThreadDelta::Truncate { .. } => "truncate",
            ThreadDelta::LinkChild { .. } => "link_child",
            ThreadDelta::UnlinkChild { .. } => "unlink_child",
            ThreadDelta::SetParent { .. } => "set_parent",
        }
    }
}

/// Apply `delta` to `thread`, producing the thread at `version + 1`.
pub fn apply_delta(thread: &Thread, delta: &ThreadDelta) -> Result<Thread, ThreadError> {
    let mut next = thread.clone();

    match delta {
        ThreadDelta::AppendMessage { message } => {
            if !next.contains_message(message.id) {
                next.messages.push(message.clone());
            }
        }
        ThreadDelta::SetTitle { title } => {
            if let Some(title) = title {
                let chars = title.chars().count();
                if chars > MAX_TITLE_CHARS {
                    return Err(ThreadError::invalid_delta(format!(
                        "title is {chars} characters, max {MAX_TITLE_CHARS}"
                    )));
                }
            }
            next.title = title.clone();
        }
        ThreadDelta::Truncate { keep } => {
            if *keep > next.messages.len() {
                return Err(ThreadError::invalid_delta(format!(
                    "cannot keep {keep} of {} messages",
                    next.messages.len()
                )));
            }
            next.messages.truncate(*keep);
        }
        ThreadDelta::LinkChild { child } => {
            if *child == thread.id {
                return Err(ThreadError::invalid_delta("a thread cannot be its own child"));
            }
            if !next.child_thread_ids.contains(child) {
                next.child_thread_ids.push(*child);
            }
        }
        ThreadDelta::UnlinkChild { child } => {
            next.child_thread_ids.retain(|c| c != child);
        }
        ThreadDelta::SetParent { parent } => {
            if *parent == Some(thread.id) {
                return Err(ThreadError::invalid_delta("a thread cannot be its own parent"));
            }
            next.parent_thread_id = *parent;
        }
    }

    next.version = thread.version + 1;
    Ok(next)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::thread::Role;

    #[test]
    fn append_is_idempotent_per_message_id() {
        let thread = Thread::new();
        let message = Message::new(Role::User, "hello");
        let once = apply_delta(&thread, &ThreadDelta::append(message.clone())).unwrap();
        let twice = apply_delta(&once, &ThreadDelta::append(message)).unwrap();

        assert_eq!(once.messages.len(), 1);
        assert_eq!(twice.messages.len(), 1);
        assert_eq!(twice.version, 3);
        assert_eq!(thread.version, 1);
    }

    #[test]
    fn truncate_bounds_are_checked() {
        let mut thread = Thread::new();
        for text in ["a", "b", "c"] {
            thread = apply_delta(&thread, &ThreadDelta::append(Message::new(Role::User, text))).unwrap();
        }
        let cut = apply_delta(&thread, &ThreadDelta::Truncate { keep: 1 }).unwrap();
        assert_eq!(cut.messages.len(), 1);
        assert_eq!(cut.messages[0].content, "a");

        let err = apply_delta(&thread, &ThreadDelta::Truncate { keep: 4 }).unwrap_err();
        assert!(matches!(err, ThreadError::InvalidDelta(_)));
    }

    #[test]
    fn titles_are_length_limited() {
        let thread = Thread::new();
        let ok = "t".repeat(MAX_TITLE_CHARS);
        assert!(apply_delta(&thread, &ThreadDelta::SetTitle { title: Some(ok) }).is_ok());

        let long = "t".repeat(MAX_TITLE_CHARS + 1);
        assert!(apply_delta(&thread, &ThreadDelta::SetTitle { title: Some(long) }).is_err());

        let cleared = apply_delta(&thread, &ThreadDelta::SetTitle { title: None }).unwrap();
        assert_eq!(cleared.title, None);
    }

    #[test]
    fn child_links_reject_self_and_ignore_duplicates() {
        let thread = Thread::new();
        let child = ThreadId::generate();

        let linked = apply_delta(&thread, &ThreadDelta::LinkChild { child }).unwrap();
        let again = apply_delta(&linked, &ThreadDelta::LinkChild { child }).unwrap();
        assert_eq!(again.child_thread_ids, vec![child]);

        let unlinked = apply_delta(&again, &ThreadDelta::UnlinkChild { child }).unwrap();
        assert!(unlinked.child_thread_ids.is_empty());

        assert!(apply_delta(&thread, &ThreadDelta::LinkChild { child: thread.id }).is_err());
        assert!(apply_delta(&thread, &ThreadDelta::SetParent { parent: Some(thread.id) }).is_err());
    }

    #[test]
    fn delta_serializes_tagged() {
        let value = serde_json::to_value(ThreadDelta::Truncate { keep: 2 }).unwrap();
        assert_eq!(value["type"], "truncate");
        assert_eq!(value["keep"], 2);
    }
}
