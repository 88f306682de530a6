//! File change tracking and rollback
//!
//! Every file mutation a tool performs is appended to a per-operation log.
//! Records are shared as `Arc`s, so taking a snapshot never copies file
//! contents and never blocks writers of other operations. Entries are never
//! mutated once appended.

use chrono::Utc;
use dashmap::DashMap;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use weft_core::{ChangeType, FileChangeRecord, OperationId};

/// Append-only log of file mutations, keyed by operation.
///
/// Cheap to clone; clones share the log.
#[derive(Debug, Clone, Default)]
pub struct FileChangeTracker {
    records: Arc<DashMap<OperationId, Vec<Arc<FileChangeRecord>>>>,
}

impl FileChangeTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one mutation to the log of `operation_id`.
    pub fn record(
        &self,
        operation_id: OperationId,
        path: impl Into<PathBuf>,
        change_type: ChangeType,
        before_content: Option<String>,
        after_content: Option<String>,
    ) -> Arc<FileChangeRecord> {
        let record = Arc::new(FileChangeRecord {
            path: path.into(),
            change_type,
            before_content,
            after_content,
            timestamp: Utc::now(),
            operation_id,
        });

        tracing::debug!(
            operation_id = %operation_id,
            path = %record.path.display(),
            change = ?change_type,
            "File change recorded"
        );

        self.records
            .entry(operation_id)
            .or_default()
            .push(Arc::clone(&record));
        record
    }

    /// Shared handles to the records of one operation, oldest first.
    pub fn snapshot(&self, operation_id: OperationId) -> Vec<Arc<FileChangeRecord>> {
        self.records
            .get(&operation_id)
            .map(|entry| entry.value().clone())
            .unwrap_or_default()
    }

    /// Owned copies of the records of one operation, oldest first.
    pub fn records_for(&self, operation_id: OperationId) -> Vec<FileChangeRecord> {
        self.snapshot(operation_id)
            .iter()
            .map(|record| FileChangeRecord::clone(record))
            .collect()
    }

    /// Operations that have recorded at least one change.
    pub fn operations(&self) -> Vec<OperationId> {
        self.records.iter().map(|entry| *entry.key()).collect()
    }

    pub fn total_records(&self) -> usize {
        self.records.iter().map(|entry| entry.value().len()).sum()
    }

    /// Reverse every change of `operation_id`, newest first.
    ///
    /// Best effort: a change that cannot be reverted is logged and reported,
    /// and the remaining changes are still attempted.
    pub async fn rollback(&self, operation_id: OperationId) -> RollbackReport {
        let records = self.snapshot(operation_id);
        let mut report = RollbackReport {
            operation_id,
            reverted: Vec::new(),
            failed: Vec::new(),
        };

        for record in records.iter().rev() {
            match revert(record).await {
                Ok(()) => report.reverted.push(record.path.clone()),
                Err(error) => {
                    tracing::warn!(
                        operation_id = %operation_id,
                        path = %record.path.display(),
                        error = %error,
                        "Failed to revert file change"
                    );
                    report.failed.push(RollbackFailure {
                        path: record.path.clone(),
                        error,
                    });
                }
            }
        }

        tracing::info!(
            operation_id = %operation_id,
            reverted = report.reverted.len(),
            failed = report.failed.len(),
            "Rollback finished"
        );
        report
    }
}

async fn revert(record: &FileChangeRecord) -> Result<(), String> {
    match record.change_type {
        ChangeType::Create => match tokio::fs::remove_file(&record.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.to_string()),
        },
        ChangeType::Modify | ChangeType::Delete => {
            let Some(before) = &record.before_content else {
                return Err("no prior content was captured".to_string());
            };
            restore(&record.path, before).await.map_err(|e| e.to_string())
        }
    }
}

async fn restore(path: &Path, content: &str) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, content).await
}

/// Outcome of [`FileChangeTracker::rollback`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RollbackReport {
    pub operation_id: OperationId,
    /// Paths restored, in the order they were reverted
    pub reverted: Vec<PathBuf>,
    pub failed: Vec<RollbackFailure>,
}

impl RollbackReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RollbackFailure {
    pub path: PathBuf,
    pub error: String,
}
