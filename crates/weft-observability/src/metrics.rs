//! Coordination metrics
//!
//! Every [`WeftMetrics`] owns its own Prometheus [`Registry`]; nothing is
//! registered globally, so several orchestrators can live in one process.
//! Label sets are fixed and small: tool names come from the registry, the
//! other labels are closed enums.

use crate::LATENCY_BUCKETS;
use prometheus::{
    HistogramOpts, HistogramVec, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
};
use std::time::Duration;
use thiserror::Error;
use weft_core::{ActionResult, Classify, ErrorKind};

#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("Prometheus error: {0}")]
    Prometheus(#[from] prometheus::Error),
}

impl Classify for MetricsError {
    fn kind(&self) -> ErrorKind {
        ErrorKind::OperationFailed
    }
}

/// Outcome label for `*_sync_pushes_total`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcomeLabel {
    Accepted,
    Diverged,
    Rejected,
    Failed,
}

impl PushOutcomeLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            PushOutcomeLabel::Accepted => "accepted",
            PushOutcomeLabel::Diverged => "diverged",
            PushOutcomeLabel::Rejected => "rejected",
            PushOutcomeLabel::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone)]
pub struct WeftMetrics {
    registry: Registry,
    actions_total: IntCounterVec,
    action_duration_seconds: HistogramVec,
    permission_decisions_total: IntCounterVec,
    sync_pushes_total: IntCounterVec,
    sync_dirty_threads: IntGauge,
}

impl WeftMetrics {
    pub fn new(namespace: &str) -> Result<Self, MetricsError> {
        let registry = Registry::new();

        let actions_total = IntCounterVec::new(
            Opts::new(
                format!("{namespace}_actions_total"),
                "Completed actions by tool and terminal status",
            ),
            &["tool", "status"],
        )?;
        let action_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                format!("{namespace}_action_duration_seconds"),
                "Action execution time in seconds by tool",
            )
            .buckets(LATENCY_BUCKETS.to_vec()),
            &["tool"],
        )?;
        let permission_decisions_total = IntCounterVec::new(
            Opts::new(
                format!("{namespace}_permission_decisions_total"),
                "Permission outcomes by decision",
            ),
            &["decision"],
        )?;
        let sync_pushes_total = IntCounterVec::new(
            Opts::new(
                format!("{namespace}_sync_pushes_total"),
                "Remote push attempts by outcome",
            ),
            &["outcome"],
        )?;
        let sync_dirty_threads = IntGauge::with_opts(Opts::new(
            format!("{namespace}_sync_dirty_threads"),
            "Threads waiting to be pushed",
        ))?;

        registry.register(Box::new(actions_total.clone()))?;
        registry.register(Box::new(action_duration_seconds.clone()))?;
        registry.register(Box::new(permission_decisions_total.clone()))?;
        registry.register(Box::new(sync_pushes_total.clone()))?;
        registry.register(Box::new(sync_dirty_threads.clone()))?;

        Ok(Self {
            registry,
            actions_total,
            action_duration_seconds,
            permission_decisions_total,
            sync_pushes_total,
            sync_dirty_threads,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn record_action(&self, result: &ActionResult) {
        let tool = result.tool_name.as_str();
        self.actions_total
            .with_label_values(&[tool, result.status.as_str()])
            .inc();

        let seconds = result
            .duration()
            .to_std()
            .unwrap_or(Duration::ZERO)
            .as_secs_f64();
        self.action_duration_seconds
            .with_label_values(&[tool])
            .observe(seconds);
    }

    /// `decision` is one of `approved`, `denied`, `prompted`
    pub fn record_permission_decision(&self, decision: &str) {
        self.permission_decisions_total
            .with_label_values(&[decision])
            .inc();
    }

    pub fn record_sync_push(&self, outcome: PushOutcomeLabel) {
        self.sync_pushes_total
            .with_label_values(&[outcome.as_str()])
            .inc();
    }

    pub fn set_dirty_threads(&self, count: usize) {
        self.sync_dirty_threads
            .set(i64::try_from(count).unwrap_or(i64::MAX));
    }

    /// Render every metric in the Prometheus text exposition format
    pub fn gather_text(&self) -> Result<String, MetricsError> {
        let families = self.registry.gather();
        Ok(TextEncoder::new().encode_to_string(&families)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use weft_core::{ActionRequest, ToolId};

    #[test]
    fn registries_are_independent() {
        let a = WeftMetrics::new("weft").unwrap();
        let b = WeftMetrics::new("weft").unwrap();

        a.record_permission_decision("approved");
        let text_a = a.gather_text().unwrap();
        let text_b = b.gather_text().unwrap();
        assert!(text_a.contains("weft_permission_decisions_total{decision=\"approved\"} 1"));
        assert!(!text_b.contains("decision=\"approved\""));
    }

    #[test]
    fn actions_are_counted_by_tool_and_status() {
        let metrics = WeftMetrics::new("weft").unwrap();
        let request = ActionRequest::new(ToolId::new_unchecked("file_read"), json!({}), true);
        let result = weft_core::ActionResult::success(&request, "ok".into(), vec![], chrono::Utc::now());

        metrics.record_action(&result);
        metrics.record_sync_push(PushOutcomeLabel::Diverged);
        metrics.set_dirty_threads(3);

        let text = metrics.gather_text().unwrap();
        assert!(text.contains("weft_actions_total{status=\"success\",tool=\"file_read\"} 1"));
        assert!(text.contains("weft_action_duration_seconds_count{tool=\"file_read\"} 1"));
        assert!(text.contains("weft_sync_pushes_total{outcome=\"diverged\"} 1"));
        assert!(text.contains("weft_sync_dirty_threads 3"));
    }
}
