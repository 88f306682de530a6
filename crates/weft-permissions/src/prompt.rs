//! Pending permission prompts
//!
//! When a request needs the user's approval the gateway registers a pending
//! entry, publishes a [`PermissionPrompt`] and hands the caller a
//! [`PendingApproval`] to await. The entry is resolved by
//! `PermissionGateway::decide`, by the optional decision timeout, or removed
//! when the waiter goes away.

use crate::grant::GrantScope;
use crate::state::{DecisionState, PermissionState};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use weft_core::{RequestId, ToolId};

/// The user's answer to a prompt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Approved,
    Denied,
}

impl Decision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Decision::Approved => "approved",
            Decision::Denied => "denied",
        }
    }
}

impl From<Decision> for DecisionState {
    fn from(decision: Decision) -> Self {
        match decision {
            Decision::Approved => DecisionState::Approved,
            Decision::Denied => DecisionState::Denied,
        }
    }
}

/// Published to the UI when a request waits for the user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PermissionPrompt {
    pub request_id: RequestId,
    pub tool_name: ToolId,
    /// Candidate scopes, narrowest first
    pub suggested_scopes: Vec<GrantScope>,
    pub requested_at: DateTime<Utc>,
}

pub(crate) struct PendingEntry {
    pub(crate) prompt: PermissionPrompt,
    pub(crate) state: PermissionState,
    pub(crate) responder: oneshot::Sender<Decision>,
}

pub(crate) type PendingMap = Arc<DashMap<RequestId, PendingEntry>>;

/// Awaitable handle on one pending decision
#[derive(Debug)]
pub struct PendingApproval {
    request_id: RequestId,
    receiver: oneshot::Receiver<Decision>,
    timeout: Option<Duration>,
    pending: PendingMap,
}

impl std::fmt::Debug for PendingEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingEntry")
            .field("prompt", &self.prompt)
            .field("state", &self.state)
            .finish()
    }
}

impl PendingApproval {
    pub(crate) fn new(
        request_id: RequestId,
        receiver: oneshot::Receiver<Decision>,
        timeout: Option<Duration>,
        pending: PendingMap,
    ) -> Self {
        Self {
            request_id,
            receiver,
            timeout,
            pending,
        }
    }

    pub fn request_id(&self) -> RequestId {
        self.request_id
    }

    /// Wait for the decision. A timed-out or abandoned prompt is `Denied`.
    pub async fn wait(mut self) -> Decision {
        let Some(timeout) = self.timeout else {
            return (&mut self.receiver).await.unwrap_or(Decision::Denied);
        };

        match tokio::time::timeout(timeout, &mut self.receiver).await {
            Ok(decision) => decision.unwrap_or(Decision::Denied),
            Err(_) => {
                if self.pending.remove(&self.request_id).is_some() {
                    tracing::warn!(
                        request_id = %self.request_id,
                        timeout_ms = timeout.as_millis() as u64,
                        "Permission prompt timed out; denying"
                    );
                    Decision::Denied
                } else {
                    // A decision was taken concurrently with the timeout.
                    (&mut self.receiver).await.unwrap_or(Decision::Denied)
                }
            }
        }
    }
}

impl Drop for PendingApproval {
    fn drop(&mut self) {
        self.pending.remove(&self.request_id);
    }
}
