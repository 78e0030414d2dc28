//! Directory listing tool.

use async_trait::async_trait;
use ragweave_core::error::ToolError;
use ragweave_core::tool::{Tool, ToolResult};

use crate::workspace::{Workspace, resolve_in_any};

pub struct ListDirectoryTool {
    roots: Vec<Workspace>,
}

impl ListDirectoryTool {
    pub fn new(roots: Vec<Workspace>) -> Self {
        Self { roots }
    }
}

#[async_trait]
impl Tool for ListDirectoryTool {
    fn name(&self) -> &str {
        "list_directory"
    }

    fn description(&self) -> &str {
        "List the entries of a directory. Defaults to the output directory."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Directory to list (default: the output directory)"
                }
            }
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let requested = arguments["path"].as_str().unwrap_or(".");
        let dir = resolve_in_any(&self.roots, self.name(), requested)?;

        let failed = |reason: String| ToolError::ExecutionFailed {
            tool_name: "list_directory".into(),
            reason,
        };

        let mut reader = tokio::fs::read_dir(&dir)
            .await
            .map_err(|e| failed(format!("Failed to list {}: {e}", dir.display())))?;

        let mut entries = Vec::new();
        while let Some(entry) = reader
            .next_entry()
            .await
            .map_err(|e| failed(e.to_string()))?
        {
            let is_dir = entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false);
            let name = entry.file_name().to_string_lossy().into_owned();
            entries.push((is_dir, name));
        }
        entries.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(&b.1)));

        if entries.is_empty() {
            return Ok(ToolResult::ok(format!("{} is empty", dir.display())));
        }

        let listing: Vec<String> = entries
            .iter()
            .map(|(is_dir, name)| format!("{} {name}", if *is_dir { "[DIR] " } else { "[FILE]" }))
            .collect();
        Ok(ToolResult::ok(listing.join("\n")))
    }
}
