//! Repository tree tool.
//!
//! Wraps the remote tree fetcher and summarizes the result for the model:
//! one line per file with its size and a short content preview. Full file
//! contents never go back to the model — a large repository would blow the
//! context budget otherwise.

use async_trait::async_trait;
use quarry_core::error::ToolError;
use quarry_core::tool::{Tool, ToolResult};
use quarry_remote::{SourceBrowser, fetch_tree};
use std::sync::Arc;

const PREVIEW_CHARS: usize = 160;

pub struct RepoTreeTool {
    source: Arc<dyn SourceBrowser>,
    default_branch: String,
}

impl RepoTreeTool {
    pub fn new(source: Arc<dyn SourceBrowser>, default_branch: impl Into<String>) -> Self {
        Self {
            source,
            default_branch: default_branch.into(),
        }
    }
}

#[async_trait]
impl Tool for RepoTreeTool {
    fn name(&self) -> &str {
        "repo_tree"
    }

    fn description(&self) -> &str {
        "Fetch the repository's file tree and a content preview of every file. \
         Hidden files and directories (names starting with '.') are excluded. \
         Use this to discover where functionality lives in the codebase."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Directory to start from, relative to the repository root. Defaults to the root."
                },
                "branch": {
                    "type": "string",
                    "description": "Branch to read. Defaults to the configured branch."
                }
            }
        })
    }

    async fn execute(
        &self,
        arguments: serde_json::Value,
    ) -> std::result::Result<ToolResult, ToolError> {
        let path = arguments["path"].as_str().unwrap_or("").to_string();
        let branch = arguments["branch"]
            .as_str()
            .unwrap_or(&self.default_branch)
            .to_string();

        let tree = fetch_tree(self.source.as_ref(), &branch, &path)
            .await
            .map_err(|e| ToolError::ExecutionFailed {
                tool_name: "repo_tree".into(),
                reason: e.to_string(),
            })?;

        if tree.is_empty() {
            return Ok(ToolResult {
                call_id: String::new(),
                success: true,
                output: format!("No files found under '{path}' on branch '{branch}'."),
            });
        }

        let mut output = format!("{} files on branch '{branch}':\n", tree.len());
        for (file_path, content) in &tree {
            output.push_str(&format!(
                "- {} ({} bytes): {}\n",
                file_path,
                content.len(),
                preview(content)
            ));
        }

        Ok(ToolResult {
            call_id: String::new(),
            success: true,
            output,
        })
    }
}

/// First `PREVIEW_CHARS` characters with newlines flattened, char-boundary
/// safe.
fn preview(content: &str) -> String {
    let flat: String = content
        .chars()
        .map(|c| if c == '\n' || c == '\r' { ' ' } else { c })
        .take(PREVIEW_CHARS)
        .collect();
    if content.chars().count() > PREVIEW_CHARS {
        format!("{flat}…")
    } else {
        flat
    }
}
