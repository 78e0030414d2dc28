//! File read tool: read a text file inside the readable directories.

use async_trait::async_trait;
use ragweave_core::error::ToolError;
use ragweave_core::tool::{Tool, ToolResult};

use crate::workspace::{Workspace, resolve_in_any};

/// Files larger than this are truncated in the tool output.
const MAX_READ_BYTES: usize = 256 * 1024;

pub struct FileReadTool {
    /// Readable roots; relative paths resolve against the first one.
    roots: Vec<Workspace>,
}

impl FileReadTool {
    pub fn new(roots: Vec<Workspace>) -> Self {
        Self { roots }
    }
}

#[async_trait]
impl Tool for FileReadTool {
    fn name(&self) -> &str {
        "file_read"
    }

    fn description(&self) -> &str {
        concat!(
            "Read the contents of a text file. ",
            "Relative paths are resolved against the output directory."
        )
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "The file path to read"
                }
            },
            "required": ["path"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let path = arguments["path"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'path' argument".into()))?;

        let resolved = resolve_in_any(&self.roots, self.name(), path)?;

        let content = tokio::fs::read_to_string(&resolved)
            .await
            .map_err(|e| ToolError::ExecutionFailed {
                tool_name: "file_read".into(),
                reason: format!("Failed to read {}: {e}", resolved.display()),
            })?;

        if content.len() > MAX_READ_BYTES {
            let mut cut = MAX_READ_BYTES;
            while !content.is_char_boundary(cut) {
                cut -= 1;
            }
            return Ok(ToolResult::ok(format!(
                "{}\n\n[truncated: showing {cut} of {} bytes]",
                &content[..cut],
                content.len()
            )));
        }

        Ok(ToolResult::ok(content))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tool_for(dir: &std::path::Path) -> FileReadTool {
        FileReadTool::new(vec![Workspace::new(dir)])
    }

    #[tokio::test]
    async fn read_relative_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("notes.md"), "# Notes").unwrap();

        let result = tool_for(dir.path())
            .execute(serde_json::json!({ "path": "notes.md" }))
            .await
            .unwrap();
        assert!(result.success);
        assert_eq!(result.output, "# Notes");
    }

    #[tokio::test]
    async fn missing_file_is_execution_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = tool_for(dir.path())
            .execute(serde_json::json!({ "path": "nope.txt" }))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::ExecutionFailed { .. }));
    }

    #[tokio::test]
    async fn outside_roots_is_denied() {
        let dir = tempfile::tempdir().unwrap();
        let err = tool_for(dir.path())
            .execute(serde_json::json!({ "path": "/etc/hostname" }))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::PermissionDenied { .. }));
    }

    #[tokio::test]
    async fn missing_path_argument() {
        let dir = tempfile::tempdir().unwrap();
        let err = tool_for(dir.path()).execute(serde_json::json!({})).await.unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
    }
}
