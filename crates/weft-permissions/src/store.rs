//! Grant persistence
//!
//! Only `Permanent` grants reach a [`GrantStore`]; session grants live in the
//! gateway. [`FileGrantStore`] keeps one JSON document and replaces it
//! atomically (write to a temporary file, then rename), so a crash mid-write
//! never leaves a truncated grant file behind.

use crate::error::GatewayError;
use crate::grant::{GrantKey, PermissionGrant};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use weft_core::PermissionsConfig;

/// Storage backend for permanent grants
#[async_trait]
pub trait GrantStore: Send + Sync {
    /// All stored grants
    async fn load(&self) -> Result<Vec<PermissionGrant>, GatewayError>;

    /// Insert or replace the grant with the same key
    async fn save(&self, grant: PermissionGrant) -> Result<(), GatewayError>;

    /// Remove a grant; returns whether it existed
    async fn remove(&self, key: &GrantKey) -> Result<bool, GatewayError>;
}

/// Grant store backed by process memory
#[derive(Debug, Default)]
pub struct InMemoryGrantStore {
    grants: RwLock<BTreeMap<GrantKey, PermissionGrant>>,
}

impl InMemoryGrantStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl GrantStore for InMemoryGrantStore {
    async fn load(&self) -> Result<Vec<PermissionGrant>, GatewayError> {
        Ok(self.grants.read().await.values().cloned().collect())
    }

    async fn save(&self, grant: PermissionGrant) -> Result<(), GatewayError> {
        self.grants.write().await.insert(grant.key(), grant);
        Ok(())
    }

    async fn remove(&self, key: &GrantKey) -> Result<bool, GatewayError> {
        Ok(self.grants.write().await.remove(key).is_some())
    }
}

const DOCUMENT_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct GrantDocument {
    version: u32,
    grants: Vec<PermissionGrant>,
}

/// Grant store persisted as a JSON document on disk
#[derive(Debug)]
pub struct FileGrantStore {
    path: PathBuf,
    // Serializes read-modify-write cycles within this process.
    write_lock: Mutex<()>,
}

impl FileGrantStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_document(&self) -> Result<BTreeMap<GrantKey, PermissionGrant>, GatewayError> {
        let contents = match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = ?self.path, "Grant file not found, starting empty");
                return Ok(BTreeMap::new());
            }
            Err(e) => return Err(GatewayError::store_io(&self.path, e)),
        };

        let document: GrantDocument = serde_json::from_str(&contents).map_err(|e| {
            tracing::error!(path = ?self.path, error = %e, "Failed to parse grant file");
            GatewayError::StoreFormat(e)
        })?;

        Ok(document
            .grants
            .into_iter()
            .map(|grant| (grant.key(), grant))
            .collect())
    }

    async fn write_document(
        &self,
        grants: BTreeMap<GrantKey, PermissionGrant>,
    ) -> Result<(), GatewayError> {
        let document = GrantDocument {
            version: DOCUMENT_VERSION,
            grants: grants.into_values().collect(),
        };
        let json = serde_json::to_string_pretty(&document)?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| GatewayError::store_io(parent, e))?;
        }

        let tmp_path = self.path.with_extension("tmp");
        tokio::fs::write(&tmp_path, json).await.map_err(|e| {
            tracing::error!(path = ?tmp_path, error = %e, "Failed to write grant file");
            GatewayError::store_io(&tmp_path, e)
        })?;
        tokio::fs::rename(&tmp_path, &self.path).await.map_err(|e| {
            tracing::error!(
                from = ?tmp_path,
                to = ?self.path,
                error = %e,
                "Failed to atomically rename grant file"
            );
            GatewayError::store_io(&self.path, e)
        })?;

        tracing::debug!(path = ?self.path, grants = document.grants.len(), "Persisted grants");
        Ok(())
    }
}

#[async_trait]
impl GrantStore for FileGrantStore {
    async fn load(&self) -> Result<Vec<PermissionGrant>, GatewayError> {
        Ok(self.read_document().await?.into_values().collect())
    }

    async fn save(&self, grant: PermissionGrant) -> Result<(), GatewayError> {
        let _guard = self.write_lock.lock().await;
        let mut grants = self.read_document().await?;
        grants.insert(grant.key(), grant);
        self.write_document(grants).await
    }

    async fn remove(&self, key: &GrantKey) -> Result<bool, GatewayError> {
        let _guard = self.write_lock.lock().await;
        let mut grants = self.read_document().await?;
        let existed = grants.remove(key).is_some();
        if existed {
            self.write_document(grants).await?;
        }
        Ok(existed)
    }
}

/// The store named by `config.grants_file`, or an in-memory one.
pub fn store_for(config: &PermissionsConfig) -> Arc<dyn GrantStore> {
    match &config.grants_file {
        Some(path) => Arc::new(FileGrantStore::new(path.clone())),
        None => Arc::new(InMemoryGrantStore::new()),
    }
}
