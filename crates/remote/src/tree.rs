//! Repository tree fetcher.
//!
//! Walks a remote directory listing into a flat `path → content` map.
//! The walk is iterative over an explicit stack of pending directories, so
//! directory depth is bounded only by the remote tree, never by the call
//! stack.

use crate::bitbucket::{DirectoryPage, EntryKind};
use async_trait::async_trait;
use quarry_core::FetchError;
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// The seam between the walk and the transport.
///
/// [`crate::BitbucketClient`] is the production implementation; tests drive
/// the walker with an in-memory fake.
#[async_trait]
pub trait SourceBrowser: Send + Sync {
    /// Fetch one listing page for `path`. `page_url` is the `next` pointer
    /// of the previous page, absent for the first page.
    async fn list_page(
        &self,
        branch: &str,
        path: &str,
        page_url: Option<&str>,
    ) -> Result<DirectoryPage, FetchError>;

    /// Fetch a file's raw content.
    async fn file_content(&self, branch: &str, path: &str) -> Result<String, FetchError>;
}

/// Fetch every non-hidden file under `root` on `branch`.
///
/// Semantics:
/// - entries whose basename starts with `.` are skipped, directories and
///   files alike (a hidden directory's whole subtree is never listed);
/// - all pages of a directory are folded in page order before the directory
///   counts as done;
/// - a failed content fetch degrades to a placeholder string for that path
///   and the walk continues;
/// - a failed listing fetch is fatal and propagates.
///
/// Keys are full forward-slash paths, unique by construction, so merging
/// sibling subtrees into the single accumulator can neither drop nor
/// duplicate entries. The snapshot is built fresh per call and never cached.
pub async fn fetch_tree(
    source: &dyn SourceBrowser,
    branch: &str,
    root: &str,
) -> Result<BTreeMap<String, String>, FetchError> {
    let mut files = BTreeMap::new();
    let mut pending = vec![root.trim_matches('/').to_string()];

    while let Some(dir) = pending.pop() {
        let mut page_url: Option<String> = None;

        loop {
            let page = source.list_page(branch, &dir, page_url.as_deref()).await?;

            for entry in page.values {
                if is_hidden(&entry.path) {
                    debug!(path = %entry.path, "Skipping hidden entry");
                    continue;
                }

                match entry.kind {
                    EntryKind::Directory => pending.push(entry.path),
                    EntryKind::File => {
                        let content = match source.file_content(branch, &entry.path).await {
                            Ok(content) => content,
                            Err(e) => {
                                warn!(path = %entry.path, error = %e, "Content fetch failed, inserting placeholder");
                                format!("[error fetching {}: {}]", entry.path, e)
                            }
                        };
                        files.insert(entry.path, content);
                    }
                }
            }

            match page.next {
                Some(next) => page_url = Some(next),
                None => break,
            }
        }
    }

    Ok(files)
}

/// Hidden-entry policy: the basename starts with `.`.
fn is_hidden(path: &str) -> bool {
    path.rsplit('/')
        .next()
        .is_some_and(|base| base.starts_with('.'))
}
