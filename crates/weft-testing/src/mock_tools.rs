//! # Mock Tools for Testing
//!
//! Tools with predictable timing and failure behaviour for exercising the
//! scheduler, the permission gateway and the orchestrator.
//!
//! All of them accept a JSON object of arguments. Recognised keys:
//!
//! - `delay_ms`: how long to run (default 0)
//! - `label`: echoed back as the output (default `"done"`)
//! - `path`: when present, the permission scope is this path instead of the
//!   whole tool

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use weft_core::{Access, PermissionScope};
use weft_tools::{ActionTool, ToolContext, ToolError};

fn delay(arguments: &Value) -> Duration {
    Duration::from_millis(arguments.get("delay_ms").and_then(Value::as_u64).unwrap_or(0))
}

fn label(arguments: &Value) -> String {
    arguments
        .get("label")
        .and_then(Value::as_str)
        .unwrap_or("done")
        .to_string()
}

fn scope(arguments: &Value, read_only: bool) -> PermissionScope {
    let access = if read_only { Access::Read } else { Access::Write };
    match arguments.get("path").and_then(Value::as_str) {
        Some(path) => PermissionScope::path(path, access),
        None => PermissionScope::Tool { access },
    }
}

/// Shared counters tracking how many probed tools run at once
#[derive(Debug, Default)]
pub struct ConcurrencyProbe {
    in_flight: AtomicUsize,
    peak: AtomicUsize,
    started: AtomicUsize,
    completed: AtomicUsize,
}

impl ConcurrencyProbe {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Highest number of simultaneously running tools observed
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    pub fn started(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }

    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }

    fn enter(self: &Arc<Self>) -> ProbeGuard {
        self.started.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        ProbeGuard {
            probe: Arc::clone(self),
            completed: false,
        }
    }
}

struct ProbeGuard {
    probe: Arc<ConcurrencyProbe>,
    completed: bool,
}

impl Drop for ProbeGuard {
    fn drop(&mut self) {
        self.probe.in_flight.fetch_sub(1, Ordering::SeqCst);
        if self.completed {
            self.probe.completed.fetch_add(1, Ordering::SeqCst);
        }
    }
}

/// Sleeps for `delay_ms`, honouring cancellation, then returns `label`.
#[derive(Debug, Clone)]
pub struct DelayedTool {
    name: String,
    read_only: bool,
    requires_permission: bool,
    probe: Option<Arc<ConcurrencyProbe>>,
}

impl DelayedTool {
    pub fn read_only(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            read_only: true,
            requires_permission: false,
            probe: None,
        }
    }

    pub fn mutating(name: impl Into<String>) -> Self {
        Self {
            read_only: false,
            ..Self::read_only(name)
        }
    }

    pub fn with_probe(mut self, probe: Arc<ConcurrencyProbe>) -> Self {
        self.probe = Some(probe);
        self
    }

    /// Route this tool through the permission gateway
    pub fn requiring_permission(mut self) -> Self {
        self.requires_permission = true;
        self
    }
}

#[async_trait]
impl ActionTool for DelayedTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_read_only(&self) -> bool {
        self.read_only
    }

    fn requires_permission(&self) -> bool {
        self.requires_permission
    }

    fn permission_scope(&self, arguments: &Value) -> Result<PermissionScope, ToolError> {
        Ok(scope(arguments, self.read_only))
    }

    async fn execute(&self, arguments: Value, ctx: ToolContext) -> Result<String, ToolError> {
        let mut guard = self.probe.as_ref().map(|p| p.enter());
        ctx.checkpoint()?;

        tokio::select! {
            _ = tokio::time::sleep(delay(&arguments)) => {}
            _ = ctx.cancellation().cancelled() => return Err(ToolError::Cancelled),
        }

        if let Some(guard) = guard.as_mut() {
            guard.completed = true;
        }
        Ok(label(&arguments))
    }
}

/// Always fails with `message` after `delay_ms`.
#[derive(Debug, Clone)]
pub struct FailingTool {
    name: String,
    message: String,
}

impl FailingTool {
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
        }
    }
}

#[async_trait]
impl ActionTool for FailingTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_read_only(&self) -> bool {
        true
    }

    fn requires_permission(&self) -> bool {
        false
    }

    fn permission_scope(&self, arguments: &Value) -> Result<PermissionScope, ToolError> {
        Ok(scope(arguments, true))
    }

    async fn execute(&self, arguments: Value, _ctx: ToolContext) -> Result<String, ToolError> {
        tokio::time::sleep(delay(&arguments)).await;
        Err(ToolError::Failed(self.message.clone()))
    }
}

/// Ignores cancellation entirely; only the grace-period abort stops it.
#[derive(Debug, Clone)]
pub struct StubbornTool {
    name: String,
    finished: Arc<AtomicUsize>,
}

impl StubbornTool {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            finished: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// How many executions ran to completion
    pub fn finished(&self) -> usize {
        self.finished.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ActionTool for StubbornTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_read_only(&self) -> bool {
        true
    }

    fn requires_permission(&self) -> bool {
        false
    }

    fn permission_scope(&self, arguments: &Value) -> Result<PermissionScope, ToolError> {
        Ok(scope(arguments, true))
    }

    async fn execute(&self, arguments: Value, _ctx: ToolContext) -> Result<String, ToolError> {
        tokio::time::sleep(delay(&arguments)).await;
        self.finished.fetch_add(1, Ordering::SeqCst);
        Ok(label(&arguments))
    }
}

/// Panics inside `execute`.
#[derive(Debug, Clone)]
pub struct PanickingTool {
    name: String,
}

impl PanickingTool {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[async_trait]
impl ActionTool for PanickingTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_read_only(&self) -> bool {
        true
    }

    fn requires_permission(&self) -> bool {
        false
    }

    fn permission_scope(&self, arguments: &Value) -> Result<PermissionScope, ToolError> {
        Ok(scope(arguments, true))
    }

    async fn execute(&self, _arguments: Value, _ctx: ToolContext) -> Result<String, ToolError> {
        panic!("{} panicked on purpose", self.name);
    }
}

/// Returns `bytes` bytes of output, for exercising the output cap.
#[derive(Debug, Clone)]
pub struct VerboseTool {
    name: String,
}

impl VerboseTool {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[async_trait]
impl ActionTool for VerboseTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_read_only(&self) -> bool {
        true
    }

    fn requires_permission(&self) -> bool {
        false
    }

    fn permission_scope(&self, arguments: &Value) -> Result<PermissionScope, ToolError> {
        Ok(scope(arguments, true))
    }

    async fn execute(&self, arguments: Value, _ctx: ToolContext) -> Result<String, ToolError> {
        let bytes = arguments
            .get("bytes")
            .and_then(Value::as_u64)
            .ok_or_else(|| ToolError::invalid_arguments("missing integer field 'bytes'"))?;
        let bytes = usize::try_from(bytes)
            .map_err(|_| ToolError::invalid_arguments("'bytes' is too large"))?;
        Ok("x".repeat(bytes))
    }
}
