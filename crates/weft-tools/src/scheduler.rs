//! Parallel execution scheduler
//!
//! A batch made only of read-only requests runs through a sliding window of
//! at most `max_concurrency` operations: as soon as one finishes the next
//! queued one starts and the finished result is emitted. A batch containing
//! any mutating request runs strictly one operation at a time, in request
//! order.
//!
//! Every operation runs on its own tokio task. Cancellation is a single token
//! per batch: operations that have not started report `Cancelled` without
//! running, and in-flight ones get `grace_period` to finish or observe the
//! token before their task is aborted.

use crate::batch::BatchExecution;
use crate::error::ToolError;
use crate::tool::{ActionTool, ToolContext};
use crate::tracker::FileChangeTracker;
use chrono::Utc;
use futures::future::BoxFuture;
use futures::{FutureExt, StreamExt};
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use weft_core::{
    ActionRequest, ActionResult, Classify, ErrorKind, FileChangeRecord, OperationId,
    ResourceLimiter, SchedulerConfig,
};

/// Verdict of a pre-execution check, such as a pending permission prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    Proceed,
    Reject { kind: ErrorKind, message: String },
}

impl Admission {
    pub fn reject(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self::Reject {
            kind,
            message: message.into(),
        }
    }
}

/// One request paired with the tool that serves it.
///
/// The optional admission future is awaited when the operation reaches the
/// front of the queue, before it takes a concurrency slot.
pub struct ScheduledAction {
    request: ActionRequest,
    tool: Arc<dyn ActionTool>,
    admission: Option<BoxFuture<'static, Admission>>,
}

impl std::fmt::Debug for ScheduledAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScheduledAction")
            .field("request", &self.request)
            .field("tool", &self.tool.name())
            .field("gated", &self.admission.is_some())
            .finish()
    }
}

impl ScheduledAction {
    pub fn new(request: ActionRequest, tool: Arc<dyn ActionTool>) -> Self {
        Self {
            request,
            tool,
            admission: None,
        }
    }

    /// Run only if `admission` resolves to [`Admission::Proceed`].
    pub fn with_admission<F>(mut self, admission: F) -> Self
    where
        F: Future<Output = Admission> + Send + 'static,
    {
        self.admission = Some(admission.boxed());
        self
    }

    /// Never run; report `kind` instead.
    pub fn rejected(self, kind: ErrorKind, message: impl Into<String>) -> Self {
        let verdict = Admission::reject(kind, message);
        self.with_admission(async move { verdict })
    }

    pub fn request(&self) -> &ActionRequest {
        &self.request
    }
}

/// How a batch will run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionMode {
    Concurrent { window: usize },
    Serial,
}

impl ExecutionMode {
    pub fn for_batch(actions: &[ScheduledAction], max_concurrency: usize) -> Self {
        if actions.iter().all(|a| a.request.read_only) {
            ExecutionMode::Concurrent {
                window: max_concurrency.max(1),
            }
        } else {
            ExecutionMode::Serial
        }
    }
}

struct ExecutionEnv {
    limiter: ResourceLimiter,
    tracker: FileChangeTracker,
    workspace_root: Arc<PathBuf>,
    grace_period: Duration,
}

/// Runs batches of [`ScheduledAction`]s.
///
/// Cheap to clone; clones share the resource limiter and change tracker.
#[derive(Clone)]
pub struct Scheduler {
    env: Arc<ExecutionEnv>,
    max_concurrency: usize,
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("max_concurrency", &self.max_concurrency)
            .field("grace_period", &self.env.grace_period)
            .field("workspace_root", &self.env.workspace_root)
            .finish()
    }
}

impl Scheduler {
    pub fn new(
        config: &SchedulerConfig,
        limiter: ResourceLimiter,
        tracker: FileChangeTracker,
        workspace_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            env: Arc::new(ExecutionEnv {
                limiter,
                tracker,
                workspace_root: Arc::new(workspace_root.into()),
                grace_period: config.grace_period,
            }),
            max_concurrency: config.max_concurrency.max(1),
        }
    }

    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }

    pub fn tracker(&self) -> &FileChangeTracker {
        &self.env.tracker
    }

    pub fn limiter(&self) -> &ResourceLimiter {
        &self.env.limiter
    }

    /// Start a batch. Must be called from within a tokio runtime.
    pub fn execute(&self, actions: Vec<ScheduledAction>, cancel: CancellationToken) -> BatchExecution {
        self.execute_gated(actions, cancel, async {})
    }

    /// Start a batch once `gate` resolves, holding its output until the batch
    /// is done. Used to run batches one after another behind a lock.
    pub fn execute_gated<G, T>(
        &self,
        actions: Vec<ScheduledAction>,
        cancel: CancellationToken,
        gate: G,
    ) -> BatchExecution
    where
        G: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let (sender, receiver) = mpsc::unbounded_channel();
        let len = actions.len();
        let mode = ExecutionMode::for_batch(&actions, self.max_concurrency);
        let env = Arc::clone(&self.env);
        let token = cancel.clone();

        tokio::spawn(async move {
            let _held = tokio::select! {
                held = gate => held,
                _ = token.cancelled() => {
                    for (index, action) in actions.into_iter().enumerate() {
                        let _ = sender.send((index, ActionResult::cancelled(&action.request, None)));
                    }
                    return;
                }
            };

            tracing::info!(batch_size = len, mode = ?mode, "Batch started");
            match mode {
                ExecutionMode::Serial => {
                    for (index, action) in actions.into_iter().enumerate() {
                        let result = run_action(Arc::clone(&env), action, token.clone()).await;
                        log_result(index, &result);
                        let _ = sender.send((index, result));
                    }
                }
                ExecutionMode::Concurrent { window } => {
                    let mut results = futures::stream::iter(actions.into_iter().enumerate())
                        .map(|(index, action)| {
                            let env = Arc::clone(&env);
                            let token = token.clone();
                            async move { (index, run_action(env, action, token).await) }
                        })
                        .buffer_unordered(window);

                    while let Some((index, result)) = results.next().await {
                        log_result(index, &result);
                        let _ = sender.send((index, result));
                    }
                }
            }
            tracing::info!(batch_size = len, cancelled = token.is_cancelled(), "Batch finished");
        });

        BatchExecution::new(receiver, cancel, len)
    }
}

fn log_result(index: usize, result: &ActionResult) {
    tracing::debug!(
        index,
        request_id = %result.request_id,
        tool = %result.tool_name,
        status = result.status.as_str(),
        "Operation finished"
    );
}

fn touched(env: &ExecutionEnv, operation_id: OperationId) -> Vec<FileChangeRecord> {
    env.tracker.records_for(operation_id)
}

async fn run_action(
    env: Arc<ExecutionEnv>,
    action: ScheduledAction,
    cancel: CancellationToken,
) -> ActionResult {
    let ScheduledAction {
        request,
        tool,
        admission,
    } = action;

    if cancel.is_cancelled() {
        return ActionResult::cancelled(&request, None);
    }

    if let Some(admission) = admission {
        let verdict = tokio::select! {
            verdict = admission => verdict,
            _ = cancel.cancelled() => return ActionResult::cancelled(&request, None),
        };
        if let Admission::Reject { kind, message } = verdict {
            return ActionResult::not_started(&request, kind, message);
        }
    }

    let permit = tokio::select! {
        permit = env.limiter.acquire() => match permit {
            Ok(permit) => permit,
            Err(limit) => return ActionResult::not_started(&request, limit.kind(), limit.to_string()),
        },
        _ = cancel.cancelled() => return ActionResult::cancelled(&request, None),
    };

    let started_at = Utc::now();
    tracing::debug!(request_id = %request.id, tool = %request.tool_name, "Operation started");

    let ctx = ToolContext::new(
        request.id,
        cancel.clone(),
        env.tracker.clone(),
        Arc::clone(&env.workspace_root),
    );
    let limiter = env.limiter.clone();
    let arguments = request.arguments.clone();
    let mut handle = tokio::spawn(async move {
        let _permit = permit;
        let output = limiter.run_with_timeout(tool.execute(arguments, ctx)).await??;
        limiter.check_output(&output)?;
        Ok::<_, ToolError>(output)
    });

    let joined = tokio::select! {
        joined = &mut handle => joined,
        _ = cancel.cancelled() => {
            match tokio::time::timeout(env.grace_period, &mut handle).await {
                Ok(joined) => joined,
                Err(_) => {
                    handle.abort();
                    tracing::warn!(
                        request_id = %request.id,
                        grace_ms = env.grace_period.as_millis() as u64,
                        "Operation ignored cancellation; aborted after grace period"
                    );
                    return ActionResult::failure(
                        &request,
                        ErrorKind::Cancelled,
                        "aborted after grace period",
                        touched(&env, request.id),
                        started_at,
                    );
                }
            }
        }
    };

    let files = touched(&env, request.id);
    match joined {
        Ok(Ok(output)) => ActionResult::success(&request, output, files, started_at),
        Ok(Err(error)) => {
            ActionResult::failure(&request, error.kind(), error.to_string(), files, started_at)
        }
        Err(join_error) if join_error.is_panic() => {
            tracing::warn!(request_id = %request.id, "Tool panicked");
            ActionResult::failure(
                &request,
                ErrorKind::OperationFailed,
                "tool panicked",
                files,
                started_at,
            )
        }
        Err(_) => ActionResult::failure(
            &request,
            ErrorKind::Cancelled,
            "operation task was cancelled",
            files,
            started_at,
        ),
    }
}
