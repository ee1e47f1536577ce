//! Bitbucket repository source client.
//!
//! Speaks the `src` API of Bitbucket Cloud:
//!
//! - `GET /repositories/{workspace}/{repo}/src/{branch}/{path}` on a
//!   directory returns a listing page `{values: [{path, type}], next?}`
//! - the same endpoint on a file returns the raw content
//!
//! Pagination follows the `next` URL verbatim until it is absent.

use crate::tree::SourceBrowser;
use async_trait::async_trait;
use quarry_config::BitbucketConfig;
use quarry_core::FetchError;
use serde::Deserialize;
use tracing::debug;

const LIST_PAGE_LEN: u32 = 100;

/// One entry of a directory listing page.
#[derive(Debug, Clone, Deserialize)]
pub struct TreeEntry {
    /// Full path from the repository root, forward-slash separated.
    pub path: String,

    #[serde(rename = "type")]
    pub kind: EntryKind,
}

/// Listing entry discriminator. Bitbucket emits `commit_directory` /
/// `commit_file`; the generic spellings are accepted as aliases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum EntryKind {
    #[serde(rename = "commit_directory", alias = "directory")]
    Directory,
    #[serde(rename = "commit_file", alias = "file")]
    File,
}

/// One page of a directory listing.
#[derive(Debug, Clone, Deserialize)]
pub struct DirectoryPage {
    #[serde(default)]
    pub values: Vec<TreeEntry>,

    /// Absolute URL of the next page, absent on the terminal page.
    #[serde(default)]
    pub next: Option<String>,
}

/// Client for the Bitbucket repository source endpoints.
#[derive(Debug)]
pub struct BitbucketClient {
    client: reqwest::Client,
    base_url: String,
    workspace: String,
    repository: String,
    auth_header: Option<String>,
}

impl BitbucketClient {
    /// Build a client from configuration. Fails fast on a non-HTTPS base URL.
    pub fn from_config(config: &BitbucketConfig) -> Result<Self, FetchError> {
        crate::ensure_https(&config.base_url)?;

        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| FetchError::Network(e.to_string()))?;

        let auth_header = match (&config.email, &config.api_token) {
            (Some(email), Some(token)) => Some(crate::basic_auth_header(email, token)),
            _ => None,
        };

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            workspace: config.workspace.clone(),
            repository: config.repository.clone(),
            auth_header,
        })
    }

    /// URL of the first listing page for a directory.
    fn listing_url(&self, branch: &str, path: &str) -> String {
        let path = path.trim_matches('/');
        format!(
            "{}/repositories/{}/{}/src/{}/{}?pagelen={}",
            self.base_url, self.workspace, self.repository, branch, path, LIST_PAGE_LEN
        )
    }

    /// URL of a file's raw content.
    fn content_url(&self, branch: &str, path: &str) -> String {
        format!(
            "{}/repositories/{}/{}/src/{}/{}",
            self.base_url,
            self.workspace,
            self.repository,
            branch,
            path.trim_matches('/')
        )
    }

    fn get(&self, url: &str) -> reqwest::RequestBuilder {
        let mut req = self.client.get(url);
        if let Some(auth) = &self.auth_header {
            req = req.header("Authorization", auth);
        }
        req
    }
}

#[async_trait]
impl SourceBrowser for BitbucketClient {
    async fn list_page(
        &self,
        branch: &str,
        path: &str,
        page_url: Option<&str>,
    ) -> Result<DirectoryPage, FetchError> {
        let url = match page_url {
            Some(next) => next.to_string(),
            None => self.listing_url(branch, path),
        };

        debug!(%url, "Listing directory page");

        let response = self
            .get(&url)
            .send()
            .await
            .map_err(|e| FetchError::Network(e.to_string()))?;

        let status = response.status().as_u16();
        if status != 200 {
            return Err(FetchError::Listing {
                status,
                path: path.to_string(),
            });
        }

        response
            .json::<DirectoryPage>()
            .await
            .map_err(|e| FetchError::Malformed(e.to_string()))
    }

    async fn file_content(&self, branch: &str, path: &str) -> Result<String, FetchError> {
        let url = self.content_url(branch, path);

        let response = self
            .get(&url)
            .send()
            .await
            .map_err(|e| FetchError::Network(e.to_string()))?;

        let status = response.status().as_u16();
        if status != 200 {
            return Err(FetchError::Content {
                status,
                path: path.to_string(),
            });
        }

        response
            .text()
            .await
            .map_err(|e| FetchError::Network(e.to_string()))
    }
}
