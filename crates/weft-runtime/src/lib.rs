//! # Weft Runtime
//!
//! The [`Orchestrator`] is the composition root of the coordination core.
//! It admits batches through the permission gateway, runs them on the
//! scheduler one batch after another, records every result on its thread
//! and marks the thread for sync. [`Orchestrator::run_turns`] drives
//! multi-turn tool use through a [`TurnDriver`].

pub mod batch;
pub mod error;
pub mod orchestrator;
pub mod turns;

pub use batch::BatchRun;
pub use error::OrchestratorError;
pub use orchestrator::Orchestrator;
pub use turns::{StopReason, TurnDriver, TurnSummary};
