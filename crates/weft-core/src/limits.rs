//! Resource limits and enforcement

use crate::error::{Classify, ErrorKind};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Per-operation resource limits
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceLimits {
    /// Maximum wall-clock time for a single operation
    #[serde(with = "crate::config::duration_serde")]
    pub timeout: Duration,
    /// Maximum size of an operation's output in bytes
    pub max_output_bytes: usize,
    /// Maximum number of operations running at once across all batches
    pub max_concurrent_operations: u32,
    /// How long an operation may wait for a concurrency slot
    #[serde(with = "crate::config::duration_serde")]
    pub acquire_timeout: Duration,
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(120),
            max_output_bytes: 1024 * 1024,
            max_concurrent_operations: 10,
            acquire_timeout: Duration::from_secs(30),
        }
    }
}

/// A limit was hit
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LimitExceeded {
    #[error("operation timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("output too large: {size} bytes > {limit} bytes")]
    OutputTooLarge { size: usize, limit: usize },

    #[error("concurrency ceiling of {limit} reached, waited {waited_ms}ms for a slot")]
    ConcurrencyCeiling { limit: u32, waited_ms: u64 },
}

impl Classify for LimitExceeded {
    fn kind(&self) -> ErrorKind {
        ErrorKind::ResourceExceeded
    }
}

/// Enforces [`ResourceLimits`] for every operation the scheduler runs.
///
/// Cheap to clone; clones share the concurrency semaphore.
#[derive(Debug, Clone)]
pub struct ResourceLimiter {
    limits: ResourceLimits,
    slots: Arc<Semaphore>,
    active: Arc<AtomicU32>,
}

impl ResourceLimiter {
    pub fn new(limits: ResourceLimits) -> Self {
        let slots = Arc::new(Semaphore::new(limits.max_concurrent_operations as usize));
        Self {
            limits,
            slots,
            active: Arc::new(AtomicU32::new(0)),
        }
    }

    pub fn limits(&self) -> &ResourceLimits {
        &self.limits
    }

    /// Number of operations currently holding a slot
    pub fn active_operations(&self) -> u32 {
        self.active.load(Ordering::Acquire)
    }

    /// Wait for a concurrency slot, giving up after `acquire_timeout`.
    pub async fn acquire(&self) -> Result<OperationPermit, LimitExceeded> {
        let started = Instant::now();
        let acquire = Arc::clone(&self.slots).acquire_owned();
        let permit = match tokio::time::timeout(self.limits.acquire_timeout, acquire).await {
            Ok(Ok(permit)) => permit,
            // The semaphore is never closed; treat closure like a full ceiling.
            Ok(Err(_)) | Err(_) => {
                return Err(LimitExceeded::ConcurrencyCeiling {
                    limit: self.limits.max_concurrent_operations,
                    waited_ms: started.elapsed().as_millis() as u64,
                });
            }
        };

        self.active.fetch_add(1, Ordering::AcqRel);
        Ok(OperationPermit {
            _permit: permit,
            active: Arc::clone(&self.active),
            start_time: Instant::now(),
        })
    }

    /// Run `operation` under the per-operation timeout.
    pub async fn run_with_timeout<F, T>(&self, operation: F) -> Result<T, LimitExceeded>
    where
        F: Future<Output = T>,
    {
        tokio::time::timeout(self.limits.timeout, operation)
            .await
            .map_err(|_| LimitExceeded::Timeout {
                timeout_ms: self.limits.timeout.as_millis() as u64,
            })
    }

    /// Reject output above the configured cap.
    pub fn check_output(&self, output: &str) -> Result<(), LimitExceeded> {
        if output.len() > self.limits.max_output_bytes {
            return Err(LimitExceeded::OutputTooLarge {
                size: output.len(),
                limit: self.limits.max_output_bytes,
            });
        }
        Ok(())
    }
}

/// RAII guard for one running operation
#[derive(Debug)]
pub struct OperationPermit {
    _permit: OwnedSemaphorePermit,
    active: Arc<AtomicU32>,
    start_time: Instant,
}

impl OperationPermit {
    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }
}

impl Drop for OperationPermit {
    fn drop(&mut self) {
        self.active.fetch_sub(1, Ordering::AcqRel);
        tracing::debug!(
            duration_ms = self.start_time.elapsed().as_millis() as u64,
            "Operation slot released"
        );
    }
}
