//! # Weft Testing
//!
//! Mock tools with controllable timing and failure modes, concurrency
//! probes, thread builders, temporary workspaces and a grant store that can
//! be taken offline.

pub mod fixtures;
pub mod mock_tools;

pub use fixtures::{
    TempWorkspace, ThreadBuilder, UnavailableGrantStore, appended, message_at,
};
pub use mock_tools::{
    ConcurrencyProbe, DelayedTool, FailingTool, PanickingTool, StubbornTool, VerboseTool,
};
