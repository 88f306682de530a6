//! # Weft Observability
//!
//! Structured logging through `tracing-subscriber` and per-instance
//! Prometheus metrics for batches, permission decisions and sync.

pub mod metrics;
pub mod trace;

pub use metrics::{MetricsError, PushOutcomeLabel, WeftMetrics};
pub use trace::{env_filter, init_tracing};

/// Histogram buckets for action latency, 5ms to 2 minutes
pub const LATENCY_BUCKETS: &[f64] = &[
    0.005, 0.01, 0.02, 0.05, 0.1, 0.2, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 120.0,
];

#[derive(thiserror::Error, Debug)]
pub enum ObservabilityError {
    #[error("Tracing initialization failed: {0}")]
    TracingInit(String),

    #[error("Invalid log filter: {0}")]
    InvalidFilter(String),

    #[error("Metrics error: {0}")]
    Metrics(#[from] MetricsError),
}
