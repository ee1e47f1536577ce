//! Workspace documentation tool.
//!
//! Fetches the configured documentation pages and summarizes each one for
//! the model: title, author, URL, last update, and a plain-text excerpt of
//! the body. A page that fails to fetch degrades to an inline error note —
//! the rest of the batch still comes back.

use async_trait::async_trait;
use quarry_core::error::{FetchError, ToolError};
use quarry_core::tool::{Tool, ToolResult};
use quarry_remote::{ConfluenceClient, Document};
use std::sync::Arc;
use tracing::warn;

const SUMMARY_CHARS: usize = 300;

/// Seam over the documentation transport so tests can script page fetches.
#[async_trait]
pub trait DocSource: Send + Sync {
    async fn fetch_page(&self, id: &str) -> Result<Document, FetchError>;
}

#[async_trait]
impl DocSource for ConfluenceClient {
    async fn fetch_page(&self, id: &str) -> Result<Document, FetchError> {
        ConfluenceClient::fetch_page(self, id).await
    }
}

pub struct WorkspaceDocsTool {
    source: Arc<dyn DocSource>,
    page_ids: Vec<String>,
}

impl WorkspaceDocsTool {
    pub fn new(source: Arc<dyn DocSource>, page_ids: Vec<String>) -> Self {
        Self { source, page_ids }
    }
}

#[async_trait]
impl Tool for WorkspaceDocsTool {
    fn name(&self) -> &str {
        "workspace_docs"
    }

    fn description(&self) -> &str {
        "Fetch the workspace documentation pages. Returns title, author, URL \
         and a content summary for each configured page. Use this for \
         questions about processes, onboarding, or anything written down \
         outside the code."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "ids": {
                    "type": "array",
                    "items": { "type": "string" },
                    "description": "Specific page IDs to fetch. Defaults to all configured pages."
                }
            }
        })
    }

    async fn execute(
        &self,
        arguments: serde_json::Value,
    ) -> std::result::Result<ToolResult, ToolError> {
        let requested: Vec<String> = arguments["ids"]
            .as_array()
            .map(|ids| {
                ids.iter()
                    .filter_map(|v| v.as_str().map(String::from))
                    .collect()
            })
            .unwrap_or_else(|| self.page_ids.clone());

        if requested.is_empty() {
            return Ok(ToolResult {
                call_id: String::new(),
                success: true,
                output: "No documentation pages are configured.".into(),
            });
        }

        let mut output = String::new();
        for id in &requested {
            match self.source.fetch_page(id).await {
                Ok(doc) => {
                    output.push_str(&format!(
                        "## {}\nAuthor: {}\nURL: {}\nUpdated: {}\nSummary: {}\n\n",
                        doc.title,
                        doc.author_id,
                        doc.url,
                        doc.updated_at,
                        summarize(&doc.body)
                    ));
                }
                Err(e) => {
                    // Per-document soft fail: note the error inline and move on.
                    warn!(page_id = %id, error = %e, "Document fetch failed");
                    output.push_str(&format!("## (page {id})\n[error fetching document: {e}]\n\n"));
                }
            }
        }

        Ok(ToolResult {
            call_id: String::new(),
            success: true,
            output: output.trim_end().to_string(),
        })
    }
}

/// Strip storage-format markup and collapse whitespace into a short excerpt.
fn summarize(storage_body: &str) -> String {
    let mut text = String::with_capacity(storage_body.len());
    let mut in_tag = false;
    for c in storage_body.chars() {
        match c {
            '<' => in_tag = true,
            '>' => {
                in_tag = false;
                text.push(' ');
            }
            _ if !in_tag => text.push(c),
            _ => {}
        }
    }

    let collapsed: String = text.split_whitespace().collect::<Vec<_>>().join(" ");
    let excerpt: String = collapsed.chars().take(SUMMARY_CHARS).collect();
    if collapsed.chars().count() > SUMMARY_CHARS {
        format!("{excerpt}…")
    } else {
        excerpt
    }
}
