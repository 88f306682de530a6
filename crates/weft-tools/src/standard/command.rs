//! # Command Tool
//!
//! Runs a shell command in the workspace. The child process is killed when
//! the task running it is dropped, so an aborted operation never leaves a
//! process behind.

use crate::error::ToolError;
use crate::tool::{ActionTool, ToolContext, required_str};
use async_trait::async_trait;
use serde_json::Value;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::process::Command;
use weft_core::PermissionScope;

/// Runs `sh -c <command>`
#[derive(Debug, Default)]
pub struct RunCommandTool;

#[async_trait]
impl ActionTool for RunCommandTool {
    fn name(&self) -> &str {
        "run_command"
    }

    fn is_read_only(&self) -> bool {
        false
    }

    fn permission_scope(&self, arguments: &Value) -> Result<PermissionScope, ToolError> {
        let cwd = arguments.get("cwd").and_then(Value::as_str).map(PathBuf::from);
        Ok(PermissionScope::command_in(
            required_str(arguments, "command")?,
            cwd,
        ))
    }

    async fn execute(&self, arguments: Value, ctx: ToolContext) -> Result<String, ToolError> {
        let command = required_str(&arguments, "command")?;
        let cwd = match arguments.get("cwd").and_then(Value::as_str) {
            Some(dir) => ctx.resolve_path(dir),
            None => ctx.workspace_root().to_path_buf(),
        };

        let child = Command::new("sh")
            .arg("-c")
            .arg(command)
            .current_dir(&cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ToolError::io(&cwd, e))?;

        tracing::debug!(
            operation_id = %ctx.operation_id(),
            command,
            pid = child.id(),
            "Command spawned"
        );

        let output = tokio::select! {
            output = child.wait_with_output() => output.map_err(|e| ToolError::io(&cwd, e))?,
            _ = ctx.cancellation().cancelled() => return Err(ToolError::Cancelled),
        };

        if !output.status.success() {
            return Err(ToolError::CommandFailed {
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracker::FileChangeTracker;
    use serde_json::json;
    use std::path::Path;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;
    use weft_core::RequestId;

    fn context(root: &Path) -> ToolContext {
        ToolContext::new(
            RequestId::generate(),
            CancellationToken::new(),
            FileChangeTracker::new(),
            Arc::new(root.to_path_buf()),
        )
    }

    #[tokio::test]
    async fn runs_in_workspace_root() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("marker"), "").unwrap();

        let out = RunCommandTool
            .execute(json!({"command": "ls"}), context(dir.path()))
            .await
            .unwrap();
        assert_eq!(out.trim(), "marker");
    }

    #[tokio::test]
    async fn nonzero_exit_is_a_failure() {
        let dir = tempfile::tempdir().unwrap();
        let err = RunCommandTool
            .execute(json!({"command": "echo oops >&2; exit 3"}), context(dir.path()))
            .await
            .unwrap_err();
        match err {
            ToolError::CommandFailed { code, stderr } => {
                assert_eq!(code, Some(3));
                assert_eq!(stderr, "oops");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn cancellation_stops_the_child() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path());
        let token = ctx.cancellation().clone();

        let tool = Arc::new(RunCommandTool);
        let run = tokio::spawn(async move {
            tool.execute(json!({"command": "sleep 30"}), ctx).await
        });
        tokio::time::sleep(Duration::from_millis(50)).await;
        token.cancel();

        let result = tokio::time::timeout(Duration::from_secs(5), run)
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(result, Err(ToolError::Cancelled)));
    }

    #[test]
    fn scope_is_the_command_line() {
        assert_eq!(
            RunCommandTool.permission_scope(&json!({"command": "git status"})).unwrap(),
            PermissionScope::command("git status")
        );
    }

    #[test]
    fn scope_carries_the_working_directory() {
        assert_eq!(
            RunCommandTool
                .permission_scope(&json!({"command": "ls", "cwd": "../elsewhere"}))
                .unwrap(),
            PermissionScope::command_in("ls", Some(PathBuf::from("../elsewhere")))
        );
    }
}
