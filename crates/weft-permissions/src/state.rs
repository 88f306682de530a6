//! Per-request permission state machine
//!
//! ```text
//! Unchecked ──► Approved
//!     │    ╲──► Denied
//!     ▼
//! PendingUserDecision ──► Approved | Denied
//! ```
//!
//! Terminal states are never left or re-entered.

use crate::error::GatewayError;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionState {
    Unchecked,
    Approved,
    Denied,
    PendingUserDecision,
}

impl DecisionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, DecisionState::Approved | DecisionState::Denied)
    }

    pub fn can_transition_to(&self, next: DecisionState) -> bool {
        use DecisionState::*;
        matches!(
            (self, next),
            (Unchecked, Approved)
                | (Unchecked, Denied)
                | (Unchecked, PendingUserDecision)
                | (PendingUserDecision, Approved)
                | (PendingUserDecision, Denied)
        )
    }
}

/// Tracks one request instance through the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PermissionState {
    current: DecisionState,
}

impl Default for PermissionState {
    fn default() -> Self {
        Self::new()
    }
}

impl PermissionState {
    pub fn new() -> Self {
        Self {
            current: DecisionState::Unchecked,
        }
    }

    pub fn current(&self) -> DecisionState {
        self.current
    }

    pub fn transition(&mut self, next: DecisionState) -> Result<(), GatewayError> {
        if !self.current.can_transition_to(next) {
            return Err(GatewayError::IllegalTransition {
                from: self.current,
                to: next,
            });
        }
        self.current = next;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legal_paths() {
        let mut direct = PermissionState::new();
        direct.transition(DecisionState::Approved).unwrap();
        assert!(direct.current().is_terminal());

        let mut prompted = PermissionState::new();
        prompted.transition(DecisionState::PendingUserDecision).unwrap();
        prompted.transition(DecisionState::Denied).unwrap();
        assert_eq!(prompted.current(), DecisionState::Denied);
    }

    #[test]
    fn terminal_states_are_final() {
        let mut state = PermissionState::new();
        state.transition(DecisionState::Denied).unwrap();
        let err = state.transition(DecisionState::Approved).unwrap_err();
        assert!(matches!(
            err,
            GatewayError::IllegalTransition {
                from: DecisionState::Denied,
                to: DecisionState::Approved
            }
        ));
        assert!(state.transition(DecisionState::Denied).is_err());
    }

    #[test]
    fn cannot_return_to_unchecked_or_pending() {
        let mut state = PermissionState::new();
        state.transition(DecisionState::PendingUserDecision).unwrap();
        assert!(state.transition(DecisionState::PendingUserDecision).is_err());
        assert!(state.transition(DecisionState::Unchecked).is_err());
    }
}
