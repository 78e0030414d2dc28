//! File write tool: create, overwrite or append to files in the output
//! directory.
//!
//! Accepts either `path` (relative to the output directory, or absolute
//! inside it) or a bare `filename`, which always lands directly in the
//! output directory.

use async_trait::async_trait;
use ragweave_core::error::ToolError;
use ragweave_core::tool::{Tool, ToolResult};
use tokio::io::AsyncWriteExt;

use crate::workspace::Workspace;

pub struct FileWriteTool {
    output: Workspace,
}

impl FileWriteTool {
    pub fn new(output: Workspace) -> Self {
        Self { output }
    }

    fn target(&self, arguments: &serde_json::Value) -> Result<std::path::PathBuf, ToolError> {
        if let Some(path) = arguments["path"].as_str() {
            return self.output.resolve(self.name(), path);
        }
        if let Some(filename) = arguments["filename"].as_str() {
            let bare = std::path::Path::new(filename).file_name().ok_or_else(|| {
                ToolError::InvalidArguments(format!("Invalid filename '{filename}'"))
            })?;
            return Ok(self.output.root().join(bare));
        }
        Err(ToolError::InvalidArguments("Missing 'path' or 'filename' argument".into()))
    }
}

#[async_trait]
impl Tool for FileWriteTool {
    fn name(&self) -> &str {
        "file_write"
    }

    fn description(&self) -> &str {
        "Write content to a file in the output directory. Creates parent directories, \
         overwrites existing files unless 'append' is true."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "File path, relative to the output directory"
                },
                "filename": {
                    "type": "string",
                    "description": concat!(
                        "Bare file name placed directly in the output directory ",
                        "(alternative to 'path')"
                    )
                },
                "content": {
                    "type": "string",
                    "description": "The content to write"
                },
                "append": {
                    "type": "boolean",
                    "description": "Append instead of overwriting",
                    "default": false
                }
            },
            "required": ["content"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let content = arguments["content"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'content' argument".into()))?;
        let append = arguments["append"].as_bool().unwrap_or(false);
        let target = self.target(&arguments)?;

        let failed = |reason: String| ToolError::ExecutionFailed {
            tool_name: "file_write".into(),
            reason,
        };

        if let Some(parent) = target.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| failed(format!("Failed to create directory: {e}")))?;
        }

        if append {
            let mut file = tokio::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&target)
                .await
                .map_err(|e| failed(format!("Failed to open file: {e}")))?;
            file.write_all(content.as_bytes())
                .await
                .map_err(|e| failed(format!("Failed to append: {e}")))?;
        } else {
            tokio::fs::write(&target, content)
                .await
                .map_err(|e| failed(format!("Failed to write file: {e}")))?;
        }

        let verb = if append { "appended" } else { "wrote" };
        Ok(ToolResult {
            call_id: String::new(),
            success: true,
            output: format!("Successfully {verb} {} bytes to {}", content.len(), target.display()),
            data: Some(serde_json::json!({
                "path": target.display().to_string(),
                "bytes": content.len()
            })),
        })
    }
}
