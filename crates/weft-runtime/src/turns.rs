//! Multi-turn tool use
//!
//! [`Orchestrator::run_turns`] is an explicit work-queue loop: run a batch,
//! hand its ordered results to a [`TurnDriver`], run whatever batch the
//! driver returns next. The model behind the driver is opaque to the core.

use crate::error::OrchestratorError;
use crate::orchestrator::Orchestrator;
use async_trait::async_trait;
use serde::Serialize;
use weft_core::{ActionRequest, ActionResult, ThreadId};

/// Produces the next batch from the results of the previous one.
#[async_trait]
pub trait TurnDriver: Send {
    /// `turn` counts from 1. Returning `None` or an empty batch ends the loop.
    async fn next_batch(
        &mut self,
        turn: usize,
        results: &[ActionResult],
    ) -> Option<Vec<ActionRequest>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    DriverFinished,
    TurnLimit,
}

/// What a [`Orchestrator::run_turns`] loop did
#[derive(Debug, Clone, Serialize)]
pub struct TurnSummary {
    pub turns: usize,
    /// Ordered results, one entry per turn
    pub results: Vec<Vec<ActionResult>>,
    pub stopped: StopReason,
}

impl TurnSummary {
    pub fn last_results(&self) -> &[ActionResult] {
        self.results.last().map(Vec::as_slice).unwrap_or(&[])
    }
}

impl Orchestrator {
    /// Run `initial`, then keep running the driver's batches until it has
    /// nothing left or `runtime.max_turns` batches have run.
    ///
    /// A batch-level error ends the loop and is returned; failed operations
    /// inside a batch are just results the driver gets to see.
    pub async fn run_turns<D>(
        &self,
        thread_id: ThreadId,
        initial: Vec<ActionRequest>,
        driver: &mut D,
    ) -> Result<TurnSummary, OrchestratorError>
    where
        D: TurnDriver + ?Sized,
    {
        let max_turns = self.config().runtime.max_turns;
        let mut queue = Some(initial);
        let mut results: Vec<Vec<ActionResult>> = Vec::new();

        loop {
            let Some(batch) = queue.take().filter(|batch| !batch.is_empty()) else {
                return Ok(TurnSummary {
                    turns: results.len(),
                    results,
                    stopped: StopReason::DriverFinished,
                });
            };
            if results.len() >= max_turns {
                tracing::warn!(thread_id = %thread_id, max_turns, "Turn limit reached");
                return Ok(TurnSummary {
                    turns: results.len(),
                    results,
                    stopped: StopReason::TurnLimit,
                });
            }

            let turn = results.len() + 1;
            tracing::debug!(thread_id = %thread_id, turn, batch_size = batch.len(), "Turn started");
            let ordered = self.submit_batch(thread_id, batch).await?.collect_ordered().await;

            queue = driver.next_batch(turn, &ordered).await;
            results.push(ordered);
        }
    }
}
