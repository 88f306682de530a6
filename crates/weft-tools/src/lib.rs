//! # Weft Tools
//!
//! The execution half of the coordination core:
//!
//! - [`ActionTool`]: the capability interface every tool implements
//! - [`ToolRegistry`]: name to tool lookup, and the only way requests are built
//! - [`Scheduler`]: runs batches concurrently or serially under the resource
//!   limiter and emits results as a [`BatchExecution`] stream
//! - [`FileChangeTracker`]: per-operation mutation log with rollback
//! - [`standard`]: file and shell tools

pub mod batch;
pub mod error;
pub mod registry;
pub mod scheduler;
pub mod standard;
pub mod tool;
pub mod tracker;

pub use batch::BatchExecution;
pub use error::ToolError;
pub use registry::ToolRegistry;
pub use scheduler::{Admission, ExecutionMode, ScheduledAction, Scheduler};
pub use standard::*;
pub use tool::{ActionTool, ToolContext, required_str};
pub use tracker::{FileChangeTracker, RollbackFailure, RollbackReport};
