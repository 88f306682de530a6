//! # Standard Tools
//!
//! File system and shell tools available to every Orchestrator.
//!
//! | Tool | Read-only | Scope |
//! |---|---|---|
//! | `file_read` | yes | path, read |
//! | `list_dir` | yes | path, read |
//! | `file_write` | no | path, write |
//! | `file_delete` | no | path, write |
//! | `run_command` | no | command |

pub mod command;
pub mod file;

pub use command::RunCommandTool;
pub use file::{DeleteFileTool, ListDirTool, ReadFileTool, WriteFileTool};
