//! Built-in tool implementations for Quarry.
//!
//! Tools are what the model can ask for while answering a question about
//! the workspace: walk the repository tree, pull documentation pages, list
//! issues. The set is fixed at startup and registered in a stable order so
//! the model always sees the same schema set.

pub mod docs;
pub mod issues;
pub mod repo_tree;

pub use docs::{DocSource, WorkspaceDocsTool};
pub use issues::IssueListTool;
pub use repo_tree::RepoTreeTool;

use quarry_core::tool::ToolRegistry;
use quarry_remote::SourceBrowser;
use std::sync::Arc;

/// Create the default tool registry, in the order the model sees them:
/// `repo_tree`, `workspace_docs`, `issue_list`.
pub fn default_registry(
    source: Arc<dyn SourceBrowser>,
    docs: Arc<dyn DocSource>,
    default_branch: impl Into<String>,
    page_ids: Vec<String>,
) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(Box::new(RepoTreeTool::new(source, default_branch)));
    registry.register(Box::new(WorkspaceDocsTool::new(docs, page_ids)));
    registry.register(Box::new(IssueListTool));
    registry
}
