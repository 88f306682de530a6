//! Three-way thread merge
//!
//! Given the last common snapshot (`base`) and two diverged copies of the
//! same thread, [`merge_threads`]:
//!
//! - keeps the longest message prefix both sides agree on, index by index;
//! - interleaves the remaining messages of both sides by timestamp (local
//!   first on ties, then original order) and drops duplicates, where two
//!   messages are duplicates when role, timestamp and the first 50
//!   characters of content match;
//! - takes a scalar field from whichever side changed it, falling back to the
//!   [`ScalarConflictPolicy`] when both changed it differently;
//! - unions child links, local order first;
//! - sets the version to `max(local, remote) + 1`.

use crate::error::ThreadError;
use crate::thread::{Message, Thread};
use std::collections::HashSet;
use weft_core::ScalarConflictPolicy;

pub fn merge_threads(
    base: &Thread,
    local: &Thread,
    remote: &Thread,
    policy: ScalarConflictPolicy,
) -> Result<Thread, ThreadError> {
    if local.id != remote.id || base.id != local.id {
        return Err(ThreadError::MergeMismatch {
            local: local.id,
            remote: remote.id,
        });
    }

    let prefix_len = common_prefix_len(&local.messages, &remote.messages);
    let mut messages = local.messages[..prefix_len].to_vec();
    messages.extend(merge_suffixes(
        &local.messages[prefix_len..],
        &remote.messages[prefix_len..],
    ));

    let mut child_thread_ids = local.child_thread_ids.clone();
    for child in &remote.child_thread_ids {
        if !child_thread_ids.contains(child) {
            child_thread_ids.push(*child);
        }
    }

    Ok(Thread {
        id: local.id,
        version: local.version.max(remote.version) + 1,
        created: local.created.min(remote.created),
        title: merge_scalar(&base.title, &local.title, &remote.title, policy),
        messages,
        parent_thread_id: merge_scalar(
            &base.parent_thread_id,
            &local.parent_thread_id,
            &remote.parent_thread_id,
            policy,
        ),
        child_thread_ids,
    })
}

fn common_prefix_len(local: &[Message], remote: &[Message]) -> usize {
    local
        .iter()
        .zip(remote)
        .take_while(|(l, r)| l == r)
        .count()
}

fn merge_suffixes(local: &[Message], remote: &[Message]) -> Vec<Message> {
    // (timestamp, side, position) orders ties local-first, then by position.
    let mut tagged: Vec<(usize, usize, &Message)> = local
        .iter()
        .enumerate()
        .map(|(i, m)| (0, i, m))
        .chain(remote.iter().enumerate().map(|(i, m)| (1, i, m)))
        .collect();
    tagged.sort_by(|a, b| {
        a.2.timestamp
            .cmp(&b.2.timestamp)
            .then(a.0.cmp(&b.0))
            .then(a.1.cmp(&b.1))
    });

    let mut seen = HashSet::new();
    tagged
        .into_iter()
        .filter(|(_, _, m)| seen.insert(m.dedupe_key()))
        .map(|(_, _, m)| m.clone())
        .collect()
}

fn merge_scalar<T: Clone + PartialEq>(
    base: &T,
    local: &T,
    remote: &T,
    policy: ScalarConflictPolicy,
) -> T {
    if local == remote || remote == base {
        local.clone()
    } else if local == base {
        remote.clone()
    } else {
        match policy {
            ScalarConflictPolicy::LocalWins => local.clone(),
            ScalarConflictPolicy::RemoteWins => remote.clone(),
        }
    }
}
