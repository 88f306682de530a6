//! # File System Tools
//!
//! Read, list, write and delete files inside the workspace. Mutating tools
//! capture the prior content of every file they touch so the operation can
//! be rolled back.

use crate::error::ToolError;
use crate::tool::{ActionTool, ToolContext, required_str};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};
use std::path::Path;
use weft_core::{Access, ChangeType, PermissionScope};

/// Arguments for `file_write`
#[derive(Debug, Clone, Deserialize)]
pub struct WriteArgs {
    pub path: String,
    pub content: String,
    #[serde(default)]
    pub create_dirs: bool,
}

async fn read_existing(path: &Path) -> Result<Option<String>, ToolError> {
    match tokio::fs::read_to_string(path).await {
        Ok(content) => Ok(Some(content)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(ToolError::io(path, e)),
    }
}

/// Reads a UTF-8 file
#[derive(Debug, Default)]
pub struct ReadFileTool;

#[async_trait]
impl ActionTool for ReadFileTool {
    fn name(&self) -> &str {
        "file_read"
    }

    fn is_read_only(&self) -> bool {
        true
    }

    fn permission_scope(&self, arguments: &Value) -> Result<PermissionScope, ToolError> {
        Ok(PermissionScope::path(required_str(arguments, "path")?, Access::Read))
    }

    async fn execute(&self, arguments: Value, ctx: ToolContext) -> Result<String, ToolError> {
        let path = ctx.resolve_path(required_str(&arguments, "path")?);
        let content = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| ToolError::io(&path, e))?;

        Ok(json!({
            "path": path,
            "content": content,
            "size": content.len(),
        })
        .to_string())
    }
}

/// Lists directory entries, sorted by name
#[derive(Debug, Default)]
pub struct ListDirTool;

#[async_trait]
impl ActionTool for ListDirTool {
    fn name(&self) -> &str {
        "list_dir"
    }

    fn is_read_only(&self) -> bool {
        true
    }

    fn permission_scope(&self, arguments: &Value) -> Result<PermissionScope, ToolError> {
        Ok(PermissionScope::path(required_str(arguments, "path")?, Access::Read))
    }

    async fn execute(&self, arguments: Value, ctx: ToolContext) -> Result<String, ToolError> {
        let path = ctx.resolve_path(required_str(&arguments, "path")?);
        let mut dir = tokio::fs::read_dir(&path)
            .await
            .map_err(|e| ToolError::io(&path, e))?;

        let mut entries = Vec::new();
        while let Some(entry) = dir.next_entry().await.map_err(|e| ToolError::io(&path, e))? {
            ctx.checkpoint()?;
            let is_dir = entry
                .file_type()
                .await
                .map(|t| t.is_dir())
                .unwrap_or(false);
            entries.push((entry.file_name().to_string_lossy().into_owned(), is_dir));
        }
        entries.sort();

        let entries: Vec<Value> = entries
            .into_iter()
            .map(|(name, is_dir)| json!({"name": name, "is_dir": is_dir}))
            .collect();
        Ok(json!({"path": path, "entries": entries}).to_string())
    }
}

/// Creates or overwrites a file
#[derive(Debug, Default)]
pub struct WriteFileTool;

#[async_trait]
impl ActionTool for WriteFileTool {
    fn name(&self) -> &str {
        "file_write"
    }

    fn is_read_only(&self) -> bool {
        false
    }

    fn permission_scope(&self, arguments: &Value) -> Result<PermissionScope, ToolError> {
        Ok(PermissionScope::path(required_str(arguments, "path")?, Access::Write))
    }

    async fn execute(&self, arguments: Value, ctx: ToolContext) -> Result<String, ToolError> {
        let args: WriteArgs = serde_json::from_value(arguments)
            .map_err(|e| ToolError::invalid_arguments(e.to_string()))?;
        let path = ctx.resolve_path(&args.path);

        if let Some(parent) = args.create_dirs.then(|| path.parent()).flatten() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| ToolError::io(parent, e))?;
        }

        let before = read_existing(&path).await?;
        ctx.checkpoint()?;

        tokio::fs::write(&path, &args.content)
            .await
            .map_err(|e| ToolError::io(&path, e))?;

        let change_type = if before.is_some() {
            ChangeType::Modify
        } else {
            ChangeType::Create
        };
        ctx.record_change(&path, change_type, before, Some(args.content.clone()));

        Ok(json!({
            "path": path,
            "bytes_written": args.content.len(),
            "change": change_type,
        })
        .to_string())
    }
}

/// Deletes a file
#[derive(Debug, Default)]
pub struct DeleteFileTool;

#[async_trait]
impl ActionTool for DeleteFileTool {
    fn name(&self) -> &str {
        "file_delete"
    }

    fn is_read_only(&self) -> bool {
        false
    }

    fn permission_scope(&self, arguments: &Value) -> Result<PermissionScope, ToolError> {
        Ok(PermissionScope::path(required_str(arguments, "path")?, Access::Write))
    }

    async fn execute(&self, arguments: Value, ctx: ToolContext) -> Result<String, ToolError> {
        let path = ctx.resolve_path(required_str(&arguments, "path")?);
        let before = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| ToolError::io(&path, e))?;
        ctx.checkpoint()?;

        tokio::fs::remove_file(&path)
            .await
            .map_err(|e| ToolError::io(&path, e))?;
        ctx.record_change(&path, ChangeType::Delete, Some(before), None);

        Ok(json!({"path": path, "deleted": true}).to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracker::FileChangeTracker;
    use std::path::PathBuf;
    use std::sync::Arc;
    use tokio_util::sync::CancellationToken;
    use weft_core::RequestId;

    fn context(root: &Path, tracker: &FileChangeTracker) -> ToolContext {
        ToolContext::new(
            RequestId::generate(),
            CancellationToken::new(),
            tracker.clone(),
            Arc::new(root.to_path_buf()),
        )
    }

    #[tokio::test]
    async fn write_then_read_relative_path() {
        let dir = tempfile::tempdir().unwrap();
        let tracker = FileChangeTracker::new();

        let ctx = context(dir.path(), &tracker);
        WriteFileTool
            .execute(json!({"path": "a/b.txt", "content": "hello", "create_dirs": true}), ctx.clone())
            .await
            .unwrap();

        let records = tracker.records_for(ctx.operation_id());
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].change_type, ChangeType::Create);
        assert_eq!(records[0].path, dir.path().join("a/b.txt"));

        let out = ReadFileTool
            .execute(json!({"path": "a/b.txt"}), context(dir.path(), &tracker))
            .await
            .unwrap();
        let out: Value = serde_json::from_str(&out).unwrap();
        assert_eq!(out["content"], "hello");
        assert_eq!(out["size"], 5);
    }

    #[tokio::test]
    async fn overwrite_records_modify_with_prior_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f.txt");
        std::fs::write(&path, "old").unwrap();
        let tracker = FileChangeTracker::new();
        let ctx = context(dir.path(), &tracker);

        WriteFileTool
            .execute(json!({"path": "f.txt", "content": "new"}), ctx.clone())
            .await
            .unwrap();

        let record = &tracker.records_for(ctx.operation_id())[0];
        assert_eq!(record.change_type, ChangeType::Modify);
        assert_eq!(record.before_content.as_deref(), Some("old"));
        assert_eq!(record.after_content.as_deref(), Some("new"));
    }

    #[tokio::test]
    async fn delete_captures_content_for_rollback() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doomed.txt");
        std::fs::write(&path, "precious").unwrap();
        let tracker = FileChangeTracker::new();
        let ctx = context(dir.path(), &tracker);

        DeleteFileTool
            .execute(json!({"path": "doomed.txt"}), ctx.clone())
            .await
            .unwrap();
        assert!(!path.exists());

        tracker.rollback(ctx.operation_id()).await;
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "precious");
    }

    #[tokio::test]
    async fn list_dir_is_sorted() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.txt"), "").unwrap();
        std::fs::write(dir.path().join("a.txt"), "").unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();

        let out = ListDirTool
            .execute(json!({"path": "."}), context(dir.path(), &FileChangeTracker::new()))
            .await
            .unwrap();
        let out: Value = serde_json::from_str(&out).unwrap();
        let names: Vec<&str> = out["entries"]
            .as_array()
            .unwrap()
            .iter()
            .map(|e| e["name"].as_str().unwrap())
            .collect();
        assert_eq!(names, vec!["a.txt", "b.txt", "sub"]);
        assert_eq!(out["entries"][2]["is_dir"], true);
    }

    #[tokio::test]
    async fn missing_file_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = ReadFileTool
            .execute(json!({"path": "absent"}), context(dir.path(), &FileChangeTracker::new()))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::Io { .. }));
    }

    #[test]
    fn scopes_follow_access() {
        let args = json!({"path": "/repo/x"});
        assert_eq!(
            ReadFileTool.permission_scope(&args).unwrap(),
            PermissionScope::path(PathBuf::from("/repo/x"), Access::Read)
        );
        assert_eq!(WriteFileTool.permission_scope(&args).unwrap().access(), Access::Write);
        assert!(DeleteFileTool.permission_scope(&json!({})).is_err());
    }
}
