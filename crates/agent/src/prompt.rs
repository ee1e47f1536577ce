//! System prompt assembly.
//!
//! The prompt is built from the workspace configuration in tagged sections,
//! so the model knows which repository and documentation set it is standing
//! in front of. A configured override skips assembly entirely.

/// What the assistant is attached to.
#[derive(Debug, Clone, Default)]
pub struct WorkspaceContext {
    pub workspace: String,
    pub repository: String,
    pub default_branch: String,
    pub doc_page_count: usize,
}

impl WorkspaceContext {
    pub fn from_config(config: &quarry_config::AppConfig) -> Self {
        Self {
            workspace: config.bitbucket.workspace.clone(),
            repository: config.bitbucket.repository.clone(),
            default_branch: config.bitbucket.default_branch.clone(),
            doc_page_count: config.confluence.page_ids.len(),
        }
    }
}

/// Assemble the system prompt, honoring an optional override.
pub fn build_system_prompt(ctx: &WorkspaceContext, override_prompt: Option<&str>) -> String {
    if let Some(prompt) = override_prompt {
        return prompt.to_string();
    }

    let mut prompt = String::with_capacity(1024);

    prompt.push_str("<identity>\n");
    prompt.push_str(
        "You are Quarry, a workspace assistant. You answer questions about a \
         software repository and its documentation.\n",
    );
    prompt.push_str("</identity>\n\n");

    prompt.push_str("<workspace>\n");
    prompt.push_str(&format!(
        "Repository: {}/{} (default branch: {})\n",
        ctx.workspace, ctx.repository, ctx.default_branch
    ));
    if ctx.doc_page_count > 0 {
        prompt.push_str(&format!(
            "Documentation: {} configured page(s), reachable via the workspace_docs tool\n",
            ctx.doc_page_count
        ));
    }
    prompt.push_str("</workspace>\n\n");

    prompt.push_str("<capabilities>\n");
    prompt.push_str(
        "Use the repo_tree tool to inspect source files, workspace_docs for \
         written documentation, and issue_list for the tracker. Cite file \
         paths when you reference code. Be concise and accurate; say so when \
         you cannot find an answer.\n",
    );
    prompt.push_str("</capabilities>\n");

    prompt
}
