//! Confluence documentation client.
//!
//! Fetches pages by ID with storage-format bodies. The site URL from
//! configuration is normalized before use: a trailing `/` is stripped, and a
//! trailing `/wiki` is stripped too, since users habitually paste the wiki
//! URL rather than the site root.

use quarry_config::ConfluenceConfig;
use quarry_core::FetchError;
use serde::Deserialize;
use tracing::debug;

/// A fetched documentation page.
#[derive(Debug, Clone)]
pub struct Document {
    pub id: String,
    pub title: String,
    pub space_id: String,
    pub author_id: String,
    /// Last-modified timestamp, as reported by the endpoint.
    pub updated_at: String,
    /// Page body in Confluence storage format (XHTML-ish markup).
    pub body: String,
    /// Browser URL of the page.
    pub url: String,
}

/// Wire shape of the page endpoint:
/// `{id, title, spaceId, authorId, version: {when}, body: {storage: {value}}}`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiPage {
    id: serde_json::Value,
    title: String,
    #[serde(default)]
    space_id: serde_json::Value,
    #[serde(default)]
    author_id: String,
    version: ApiVersion,
    body: ApiBody,
}

#[derive(Debug, Deserialize)]
struct ApiVersion {
    when: String,
}

#[derive(Debug, Deserialize)]
struct ApiBody {
    storage: ApiStorage,
}

#[derive(Debug, Deserialize)]
struct ApiStorage {
    value: String,
}

/// Client for the Confluence page endpoints.
#[derive(Debug)]
pub struct ConfluenceClient {
    client: reqwest::Client,
    base_url: String,
    auth_header: Option<String>,
}

impl ConfluenceClient {
    /// Build a client from configuration. Fails fast on a non-HTTPS URL.
    pub fn from_config(config: &ConfluenceConfig) -> Result<Self, FetchError> {
        let base_url = normalize_base_url(&config.base_url);
        crate::ensure_https(&base_url)?;

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
            base_url,
            auth_header,
        })
    }

    /// Fetch a single page by ID, including its storage-format body.
    pub async fn fetch_page(&self, id: &str) -> Result<Document, FetchError> {
        let url = format!(
            "{}/wiki/api/v2/pages/{}?body-format=storage",
            self.base_url, id
        );

        debug!(%url, "Fetching documentation page");

        let mut req = self.client.get(&url);
        if let Some(auth) = &self.auth_header {
            req = req.header("Authorization", auth);
        }

        let response = req
            .send()
            .await
            .map_err(|e| FetchError::Network(e.to_string()))?;

        let status = response.status().as_u16();
        if status != 200 {
            return Err(FetchError::Document {
                status,
                id: id.to_string(),
            });
        }

        let page: ApiPage = response
            .json()
            .await
            .map_err(|e| FetchError::Malformed(e.to_string()))?;

        let page_id = scalar_to_string(&page.id);
        let url = format!("{}/wiki/pages/{}", self.base_url, page_id);

        Ok(Document {
            id: page_id,
            title: page.title,
            space_id: scalar_to_string(&page.space_id),
            author_id: page.author_id,
            updated_at: page.version.when,
            body: page.body.storage.value,
            url,
        })
    }
}

/// The endpoint serves numeric IDs on some deployments and strings on
/// others; normalize both to a string.
fn scalar_to_string(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Number(n) => n.to_string(),
        _ => String::new(),
    }
}

/// Strip a trailing `/` and a trailing `/wiki` from a configured site URL.
fn normalize_base_url(url: &str) -> String {
    let trimmed = url.trim_end_matches('/');
    trimmed.strip_suffix("/wiki").unwrap_or(trimmed).to_string()
}
