//! Remote transports for Quarry.
//!
//! Two clients over the workspace platform's HTTP APIs, and the tree
//! fetcher that walks a repository listing into a flat path → content map:
//!
//! - [`BitbucketClient`] — paginated directory listings and raw file content
//! - [`ConfluenceClient`] — documentation page fetch
//! - [`fetch_tree`] — the work-stack walk over any [`SourceBrowser`]
//!
//! Both clients speak HTTPS only and authenticate with HTTP Basic
//! credentials (account email + API token) loaded from configuration.

pub mod bitbucket;
pub mod confluence;
pub mod tree;

pub use bitbucket::{BitbucketClient, DirectoryPage, EntryKind, TreeEntry};
pub use confluence::{ConfluenceClient, Document};
pub use tree::{SourceBrowser, fetch_tree};

use base64::Engine;
use quarry_core::FetchError;

/// Build an HTTP Basic `Authorization` header value from stored credentials.
pub(crate) fn basic_auth_header(email: &str, token: &str) -> String {
    let encoded = base64::engine::general_purpose::STANDARD.encode(format!("{email}:{token}"));
    format!("Basic {encoded}")
}

/// Reject non-HTTPS endpoints. Credentials ride on every request, so
/// plaintext transports are never acceptable.
pub(crate) fn ensure_https(url: &str) -> Result<(), FetchError> {
    if url.starts_with("https://") {
        Ok(())
    } else {
        Err(FetchError::InsecureEndpoint(url.to_string()))
    }
}
