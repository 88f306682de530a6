//! The orchestrator
//!
//! One [`Orchestrator`] owns a tool registry, scheduler, permission gateway,
//! thread store, sync service and metrics registry. Nothing is shared
//! through process globals.

use crate::batch::{BatchQueue, BatchRun};
use crate::error::OrchestratorError;
use chrono::Utc;
use serde_json::json;
use std::sync::Arc;
use tokio::sync::{Mutex, broadcast, mpsc};
use tokio_stream::wrappers::WatchStream;
use tokio_util::sync::CancellationToken;
use weft_core::{
    ActionRequest, ActionResult, ErrorKind, OperationId, RequestId, ResourceLimiter, ThreadId,
    WeftConfig,
};
use weft_observability::WeftMetrics;
use weft_permissions::{
    Decision, GatewayError, GrantExpiry, GrantKey, GrantScope, GrantStore, PermissionCheck,
    PermissionGateway, PermissionGrant, PermissionPrompt, store_for,
};
use weft_sync::{RemoteStore, SyncHandle, SyncService, SyncStatus};
use weft_thread::{ColdStorage, Message, Role, Thread, ThreadDelta, ThreadStore, cold_storage_for};
use weft_tools::{
    Admission, BatchExecution, FileChangeTracker, RollbackReport, ScheduledAction, Scheduler,
    ToolRegistry,
};

pub struct Orchestrator {
    config: WeftConfig,
    registry: ToolRegistry,
    scheduler: Scheduler,
    gateway: Arc<PermissionGateway>,
    threads: Arc<ThreadStore>,
    sync: Arc<SyncService>,
    sync_handle: Mutex<Option<SyncHandle>>,
    metrics: Arc<WeftMetrics>,
    batches: BatchQueue,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("tools", &self.registry.names())
            .field("scheduler", &self.scheduler)
            .field("gateway", &self.gateway)
            .field("threads", &self.threads)
            .field("sync", &self.sync)
            .finish()
    }
}

/// Records one finished action on its thread
#[derive(Clone)]
struct ResultRecorder {
    thread_id: ThreadId,
    threads: Arc<ThreadStore>,
    sync: Arc<SyncService>,
    metrics: Arc<WeftMetrics>,
}

impl ResultRecorder {
    async fn record(&self, result: &ActionResult) {
        self.metrics.record_action(result);

        let body = json!({
            "request_id": result.request_id,
            "tool": result.tool_name,
            "status": result.status,
            "payload": result.payload,
        });
        let message = Message::new(Role::Tool, body.to_string()).with_timestamp(result.finished_at);
        match self
            .threads
            .apply_latest(self.thread_id, ThreadDelta::append(message))
            .await
        {
            Ok(_) => self.sync.mark_dirty(self.thread_id),
            Err(e) => tracing::warn!(
                thread_id = %self.thread_id,
                request_id = %result.request_id,
                error = %e,
                "Failed to record action result on thread"
            ),
        }
    }
}

impl Orchestrator {
    /// Build an orchestrator whose grant store and cold storage follow
    /// `config`.
    pub fn new(
        config: WeftConfig,
        registry: ToolRegistry,
        remote: Arc<dyn RemoteStore>,
    ) -> Result<Self, OrchestratorError> {
        let grants = store_for(&config.permissions);
        let cold = cold_storage_for(&config.threads);
        Self::with_stores(config, registry, grants, cold, remote)
    }

    pub fn with_stores(
        config: WeftConfig,
        registry: ToolRegistry,
        grants: Arc<dyn GrantStore>,
        cold: Arc<dyn ColdStorage>,
        remote: Arc<dyn RemoteStore>,
    ) -> Result<Self, OrchestratorError> {
        config.validate()?;

        let metrics = Arc::new(WeftMetrics::new(&config.observability.metrics_namespace)?);
        let gateway = Arc::new(PermissionGateway::new(&config.permissions, grants));
        let scheduler = Scheduler::new(
            &config.scheduler,
            ResourceLimiter::new(config.limits.clone()),
            FileChangeTracker::default(),
            gateway.workspace_root().to_path_buf(),
        );
        let threads = Arc::new(ThreadStore::new(config.threads.clone(), cold));
        let sync = Arc::new(
            SyncService::new(
                Arc::clone(&threads),
                remote,
                config.sync.clone(),
                config.threads.scalar_conflict,
            )
            .with_metrics(Arc::clone(&metrics)),
        );

        tracing::info!(
            tools = registry.len(),
            max_concurrency = config.scheduler.max_concurrency,
            interactive = config.permissions.interactive,
            workspace_root = %gateway.workspace_root().display(),
            "Orchestrator initialized"
        );

        Ok(Self {
            config,
            registry,
            scheduler,
            gateway,
            threads,
            sync,
            sync_handle: Mutex::new(None),
            metrics,
            batches: BatchQueue::default(),
        })
    }

    pub fn config(&self) -> &WeftConfig {
        &self.config
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub fn gateway(&self) -> &PermissionGateway {
        &self.gateway
    }

    pub fn threads(&self) -> &ThreadStore {
        &self.threads
    }

    pub fn sync(&self) -> &SyncService {
        &self.sync
    }

    pub fn metrics(&self) -> &WeftMetrics {
        &self.metrics
    }

    /// Prometheus text exposition of this instance's metrics
    pub fn metrics_text(&self) -> Result<String, OrchestratorError> {
        Ok(self.metrics.gather_text()?)
    }

    /// Build a request for a registered tool
    pub fn request(
        &self,
        tool: &str,
        arguments: serde_json::Value,
    ) -> Result<ActionRequest, OrchestratorError> {
        Ok(self.registry.request(tool, arguments)?)
    }

    /// Submit a batch on `thread_id`.
    ///
    /// Fails before anything runs if the thread is unknown, a tool is not
    /// registered, or the grant store cannot be read. Otherwise every
    /// request yields exactly one result, recorded on the thread as a tool
    /// message.
    pub async fn submit_batch(
        &self,
        thread_id: ThreadId,
        requests: Vec<ActionRequest>,
    ) -> Result<BatchRun, OrchestratorError> {
        if !self.threads.contains(thread_id).await? {
            return Err(OrchestratorError::UnknownThread(thread_id));
        }

        let tools = requests
            .iter()
            .map(|request| self.registry.resolve(request))
            .collect::<Result<Vec<_>, _>>()?;
        let grants = self.gateway.snapshot().await?;

        let mut actions = Vec::with_capacity(requests.len());
        for (request, tool) in requests.into_iter().zip(tools) {
            let scope = if tool.requires_permission() {
                match tool.permission_scope(&request.arguments) {
                    Ok(scope) => Some(scope),
                    Err(e) => {
                        let action = ScheduledAction::new(request, tool)
                            .rejected(ErrorKind::OperationFailed, e.to_string());
                        actions.push(action);
                        continue;
                    }
                }
            } else {
                None
            };

            let check = self.gateway.evaluate(&grants, &request, scope.as_ref());
            let action = match check {
                PermissionCheck::Approved => {
                    self.metrics.record_permission_decision("approved");
                    ScheduledAction::new(request, tool)
                }
                PermissionCheck::Denied { reason } => {
                    self.metrics.record_permission_decision("denied");
                    tracing::info!(request_id = %request.id, tool = %request.tool_name, reason = %reason, "Permission denied");
                    ScheduledAction::new(request, tool).rejected(ErrorKind::PermissionDenied, reason)
                }
                PermissionCheck::RequiresInteractiveApproval { suggested_scopes } => {
                    self.metrics.record_permission_decision("prompted");
                    let pending = self.gateway.request_decision(&request, suggested_scopes)?;
                    ScheduledAction::new(request, tool).with_admission(async move {
                        match pending.wait().await {
                            Decision::Approved => Admission::Proceed,
                            Decision::Denied => {
                                Admission::reject(ErrorKind::PermissionDenied, "denied by user")
                            }
                        }
                    })
                }
            };
            actions.push(action);
        }

        let len = actions.len();
        let cancel = CancellationToken::new();
        let turn = self.batches.ticket().await;
        let mut execution = self.scheduler.execute_gated(actions, cancel.clone(), turn);

        let recorder = ResultRecorder {
            thread_id,
            threads: Arc::clone(&self.threads),
            sync: Arc::clone(&self.sync),
            metrics: Arc::clone(&self.metrics),
        };
        let (sender, receiver) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            while let Some((index, result)) = execution.next_indexed().await {
                recorder.record(&result).await;
                // The caller may have dropped the run; results stay on the thread.
                let _ = sender.send((index, result));
            }
        });

        tracing::info!(thread_id = %thread_id, batch_size = len, "Batch submitted");
        Ok(BatchRun::new(
            thread_id,
            BatchExecution::new(receiver, cancel, len),
        ))
    }

    /// Answer a pending prompt, granting its narrowest suggestion on approval
    pub async fn decide(
        &self,
        request_id: RequestId,
        decision: Decision,
        expiry: GrantExpiry,
    ) -> Result<(), OrchestratorError> {
        self.gateway.decide(request_id, decision, expiry).await?;
        self.metrics.record_permission_decision(decision.as_str());
        Ok(())
    }

    /// Answer a pending prompt, granting `scope` (one of its suggestions)
    pub async fn decide_with_scope(
        &self,
        request_id: RequestId,
        decision: Decision,
        scope: GrantScope,
        expiry: GrantExpiry,
    ) -> Result<(), OrchestratorError> {
        self.gateway
            .decide_with_scope(request_id, decision, scope, expiry)
            .await?;
        self.metrics.record_permission_decision(decision.as_str());
        Ok(())
    }

    /// Prompts published from now on
    pub fn prompts(&self) -> broadcast::Receiver<PermissionPrompt> {
        self.gateway.subscribe()
    }

    /// Prompts currently waiting, oldest first
    pub fn pending_prompts(&self) -> Vec<PermissionPrompt> {
        self.gateway.pending_prompts()
    }

    pub async fn grant(&self, scope: GrantScope, expiry: GrantExpiry) -> Result<(), GatewayError> {
        self.gateway.grant(scope, expiry).await
    }

    pub async fn revoke(&self, key: &GrantKey) -> Result<bool, GatewayError> {
        self.gateway.revoke(key).await
    }

    pub async fn list_grants(&self) -> Result<Vec<PermissionGrant>, GatewayError> {
        self.gateway.list_grants().await
    }

    pub fn observe_sync_status(&self, thread_id: ThreadId) -> WatchStream<SyncStatus> {
        self.sync.observe(thread_id)
    }

    /// Undo every file change of one operation, newest first
    pub async fn rollback(&self, operation_id: OperationId) -> RollbackReport {
        self.scheduler.tracker().rollback(operation_id).await
    }

    pub fn create_thread(&self) -> Thread {
        let thread = self.threads.create();
        self.sync.mark_dirty(thread.id);
        thread
    }

    /// Install a thread another client created, taking the remote copy as
    /// the synced base.
    pub async fn adopt_thread(&self, thread_id: ThreadId) -> Result<Thread, OrchestratorError> {
        self.sync
            .adopt(thread_id)
            .await?
            .ok_or(OrchestratorError::UnknownThread(thread_id))
    }

    pub async fn thread(&self, thread_id: ThreadId) -> Result<Thread, OrchestratorError> {
        Ok(self.threads.get(thread_id).await?)
    }

    pub async fn append_message(
        &self,
        thread_id: ThreadId,
        role: Role,
        content: impl Into<String>,
    ) -> Result<Thread, OrchestratorError> {
        let thread = self
            .threads
            .apply_latest(thread_id, ThreadDelta::append(Message::new(role, content)))
            .await?;
        self.sync.mark_dirty(thread_id);
        Ok(thread)
    }

    pub async fn spawn_child_thread(&self, parent: ThreadId) -> Result<Thread, OrchestratorError> {
        let child = self.threads.spawn_child(parent).await?;
        self.sync.mark_dirty(parent);
        self.sync.mark_dirty(child.id);
        Ok(child)
    }

    /// Move idle threads to cold storage
    pub async fn archive_inactive(&self) -> Vec<ThreadId> {
        self.threads.archive_inactive(Utc::now()).await
    }

    /// Start the background sync loop; a no-op when already running
    pub async fn start_sync(&self) {
        let mut handle = self.sync_handle.lock().await;
        if handle.is_none() {
            *handle = Some(self.sync.start());
        }
    }

    /// Stop the sync loop and push whatever is still dirty once more
    pub async fn shutdown(&self) {
        if let Some(handle) = self.sync_handle.lock().await.take() {
            handle.stop().await;
        }
        self.sync.shutdown();
        let report = self.sync.sync_once().await;
        tracing::info!(
            pushed = report.accepted,
            remaining = self.sync.dirty_count(),
            "Orchestrator shut down"
        );
    }
}
