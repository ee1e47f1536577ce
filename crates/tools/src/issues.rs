//! Issue list tool — a stand-in, not a live tracker integration.
//!
//! Always reports an empty collection. The tool exists so the model knows
//! issues are a thing it can ask about; wiring a real tracker is a drop-in
//! replacement of `execute`.

use async_trait::async_trait;
use quarry_core::error::ToolError;
use quarry_core::tool::{Tool, ToolResult};

pub struct IssueListTool;

#[async_trait]
impl Tool for IssueListTool {
    fn name(&self) -> &str {
        "issue_list"
    }

    fn description(&self) -> &str {
        "List open issues in the workspace tracker."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "status": {
                    "type": "string",
                    "description": "Filter by status (open, closed). Defaults to open.",
                    "enum": ["open", "closed"]
                }
            }
        })
    }

    async fn execute(
        &self,
        _arguments: serde_json::Value,
    ) -> std::result::Result<ToolResult, ToolError> {
        Ok(ToolResult {
            call_id: String::new(),
            success: true,
            output: "No issues found.".into(),
        })
    }
}
