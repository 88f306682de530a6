use crate::error::ToolError;
use crate::standard::{DeleteFileTool, ListDirTool, ReadFileTool, RunCommandTool, WriteFileTool};
use crate::tool::ActionTool;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use weft_core::{ActionRequest, ToolId};

/// Registry of the tools an Orchestrator may dispatch to.
///
/// Requests are built through [`ToolRegistry::request`], which copies the
/// tool's declared `read_only` flag into the request so the two can never
/// disagree.
///
/// ```rust
/// use serde_json::json;
/// use weft_tools::ToolRegistry;
///
/// let registry = ToolRegistry::with_standard_tools();
/// let request = registry.request("file_read", json!({"path": "README.md"})).unwrap();
/// assert!(request.read_only);
///
/// let write = registry.request("file_write", json!({"path": "a", "content": "b"})).unwrap();
/// assert!(!write.read_only);
/// ```
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: HashMap<ToolId, Arc<dyn ActionTool>>,
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.names())
            .finish()
    }
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry preloaded with the file and command tools.
    pub fn with_standard_tools() -> Self {
        let tools: [Arc<dyn ActionTool>; 5] = [
            Arc::new(ReadFileTool),
            Arc::new(ListDirTool),
            Arc::new(WriteFileTool),
            Arc::new(DeleteFileTool),
            Arc::new(RunCommandTool),
        ];

        let mut registry = Self::new();
        for tool in tools {
            let id = ToolId::new_unchecked(tool.name());
            registry.tools.insert(id, tool);
        }
        registry
    }

    /// Register a tool under its own name.
    pub fn register(&mut self, tool: Arc<dyn ActionTool>) -> Result<(), ToolError> {
        let id = ToolId::parse(tool.name())?;
        if self.tools.contains_key(&id) {
            return Err(ToolError::Duplicate(id.to_string()));
        }
        tracing::debug!(tool = %id, read_only = tool.is_read_only(), "Tool registered");
        self.tools.insert(id, tool);
        Ok(())
    }

    /// Builder-style [`ToolRegistry::register`].
    pub fn with_tool(mut self, tool: Arc<dyn ActionTool>) -> Result<Self, ToolError> {
        self.register(tool)?;
        Ok(self)
    }

    pub fn get(&self, id: &ToolId) -> Option<Arc<dyn ActionTool>> {
        self.tools.get(id).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        ToolId::parse(name)
            .map(|id| self.tools.contains_key(&id))
            .unwrap_or(false)
    }

    /// Registered tool names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tools.keys().map(ToolId::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Build a request for `name`, taking `read_only` from the tool.
    pub fn request(&self, name: &str, arguments: Value) -> Result<ActionRequest, ToolError> {
        let id = ToolId::parse(name)?;
        let tool = self
            .tools
            .get(&id)
            .ok_or_else(|| ToolError::NotFound(name.to_string()))?;
        let read_only = tool.is_read_only();
        Ok(ActionRequest::new(id, arguments, read_only))
    }

    /// Look up the tool a request was built for.
    pub fn resolve(&self, request: &ActionRequest) -> Result<Arc<dyn ActionTool>, ToolError> {
        self.get(&request.tool_name)
            .ok_or_else(|| ToolError::NotFound(request.tool_name.to_string()))
    }
}
