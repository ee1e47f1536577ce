//! Configuration loading, validation, and management for Quarry.
//!
//! Loads configuration from `quarry.toml` (current directory, or
//! `~/.quarry/quarry.toml`) with environment variable overrides.
//! Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `quarry.toml`.
#[derive(Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    /// LLM provider settings
    #[serde(default)]
    pub llm: LlmConfig,

    /// Bitbucket workspace / repository the assistant answers about
    #[serde(default)]
    pub bitbucket: BitbucketConfig,

    /// Confluence documentation source
    #[serde(default)]
    pub confluence: ConfluenceConfig,

    /// Agent loop settings
    #[serde(default)]
    pub agent: AgentSettings,

    /// HTTP gateway settings
    #[serde(default)]
    pub gateway: GatewayConfig,
}

#[derive(Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Base URL of an OpenAI-compatible chat completions API
    #[serde(default = "default_llm_api_url")]
    pub api_url: String,

    /// API key (env: QUARRY_LLM_API_KEY)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Model identifier
    #[serde(default = "default_model")]
    pub model: String,

    /// Sampling temperature
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Max tokens per response
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Per-call timeout for model requests, in seconds
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_url: default_llm_api_url(),
            api_key: None,
            model: default_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct BitbucketConfig {
    /// Bitbucket API base URL
    #[serde(default = "default_bitbucket_api_url")]
    pub base_url: String,

    /// Workspace slug
    #[serde(default)]
    pub workspace: String,

    /// Repository slug
    #[serde(default)]
    pub repository: String,

    /// Branch walked when none is given
    #[serde(default = "default_branch")]
    pub default_branch: String,

    /// Account email for Basic auth (env: QUARRY_BITBUCKET_EMAIL)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    /// API token for Basic auth (env: QUARRY_BITBUCKET_TOKEN)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_token: Option<String>,
}

impl Default for BitbucketConfig {
    fn default() -> Self {
        Self {
            base_url: default_bitbucket_api_url(),
            workspace: String::new(),
            repository: String::new(),
            default_branch: default_branch(),
            email: None,
            api_token: None,
        }
    }
}

#[derive(Clone, Serialize, Deserialize, Default)]
pub struct ConfluenceConfig {
    /// Confluence site URL; trailing `/` and `/wiki` are normalized away
    /// by the client (env: QUARRY_CONFLUENCE_URL)
    #[serde(default)]
    pub base_url: String,

    /// Account email for Basic auth (env: QUARRY_CONFLUENCE_EMAIL)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    /// API token for Basic auth (env: QUARRY_CONFLUENCE_API_TOKEN)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_token: Option<String>,

    /// Page IDs the `workspace_docs` tool fetches
    #[serde(default)]
    pub page_ids: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSettings {
    /// Maximum tool-dispatch rounds per turn
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,

    /// Messages retained per session after each completed turn
    #[serde(default = "default_history_window")]
    pub history_window: usize,

    /// Optional system prompt override (skips the assembled workspace prompt)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt_override: Option<String>,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            history_window: default_history_window(),
            system_prompt_override: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Allowed CORS origin for browser clients
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cors_origin: Option<String>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_origin: None,
        }
    }
}

fn default_llm_api_url() -> String {
    "https://api.openai.com/v1".into()
}
fn default_model() -> String {
    "gpt-4o-mini".into()
}
fn default_temperature() -> f32 {
    0.3
}
fn default_max_tokens() -> u32 {
    1024
}
fn default_request_timeout_secs() -> u64 {
    45
}
fn default_bitbucket_api_url() -> String {
    "https://api.bitbucket.org/2.0".into()
}
fn default_branch() -> String {
    "main".into()
}
fn default_max_iterations() -> u32 {
    5
}
fn default_history_window() -> usize {
    10
}
fn default_host() -> String {
    "127.0.0.1".into()
}
fn default_port() -> u16 {
    8080
}

/// Redact a secret string for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("llm", &self.llm)
            .field("bitbucket", &self.bitbucket)
            .field("confluence", &self.confluence)
            .field("agent", &self.agent)
            .field("gateway", &self.gateway)
            .finish()
    }
}

impl std::fmt::Debug for LlmConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmConfig")
            .field("api_url", &self.api_url)
            .field("api_key", &redact(&self.api_key))
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .finish()
    }
}

impl std::fmt::Debug for BitbucketConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BitbucketConfig")
            .field("base_url", &self.base_url)
            .field("workspace", &self.workspace)
            .field("repository", &self.repository)
            .field("default_branch", &self.default_branch)
            .field("email", &self.email)
            .field("api_token", &redact(&self.api_token))
            .finish()
    }
}

impl std::fmt::Debug for ConfluenceConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfluenceConfig")
            .field("base_url", &self.base_url)
            .field("email", &self.email)
            .field("api_token", &redact(&self.api_token))
            .field("page_ids", &self.page_ids)
            .finish()
    }
}

impl AppConfig {
    /// Load configuration from the default locations.
    ///
    /// Search order: `./quarry.toml`, then `~/.quarry/quarry.toml`.
    /// A missing file yields the defaults; environment overrides always
    /// apply on top.
    pub fn load() -> Result<Self, ConfigError> {
        let candidates = [PathBuf::from("quarry.toml"), Self::config_path()];

        for path in &candidates {
            if path.is_file() {
                return Self::load_from(path);
            }
        }

        let mut config = Self::default();
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            source: e,
        })?;

        let mut config: AppConfig = toml::from_str(&raw).map_err(|e| ConfigError::Parse {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;

        config.apply_env_overrides();
        config.validate()?;

        tracing::debug!(path = %path.display(), "Configuration loaded");
        Ok(config)
    }

    /// The default config file location: `~/.quarry/quarry.toml`.
    pub fn config_path() -> PathBuf {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("."))
            .join(".quarry")
            .join("quarry.toml")
    }

    /// Apply `QUARRY_*` environment variable overrides on top of file values.
    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("QUARRY_LLM_API_KEY") {
            self.llm.api_key = Some(v);
        }
        if let Ok(v) = std::env::var("QUARRY_LLM_API_URL") {
            self.llm.api_url = v;
        }
        if let Ok(v) = std::env::var("QUARRY_BITBUCKET_EMAIL") {
            self.bitbucket.email = Some(v);
        }
        if let Ok(v) = std::env::var("QUARRY_BITBUCKET_TOKEN") {
            self.bitbucket.api_token = Some(v);
        }
        if let Ok(v) = std::env::var("QUARRY_CONFLUENCE_URL") {
            self.confluence.base_url = v;
        }
        if let Ok(v) = std::env::var("QUARRY_CONFLUENCE_EMAIL") {
            self.confluence.email = Some(v);
        }
        if let Ok(v) = std::env::var("QUARRY_CONFLUENCE_API_TOKEN") {
            self.confluence.api_token = Some(v);
        }
    }

    /// Validate settings that would otherwise fail deep inside a request.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.agent.max_iterations == 0 {
            return Err(ConfigError::Invalid(
                "agent.max_iterations must be at least 1".into(),
            ));
        }
        if self.agent.history_window == 0 {
            return Err(ConfigError::Invalid(
                "agent.history_window must be at least 1".into(),
            ));
        }
        if !(0.0..=2.0).contains(&self.llm.temperature) {
            return Err(ConfigError::Invalid(format!(
                "llm.temperature {} is out of range (0.0..=2.0)",
                self.llm.temperature
            )));
        }
        for (name, url) in [
            ("llm.api_url", &self.llm.api_url),
            ("bitbucket.base_url", &self.bitbucket.base_url),
        ] {
            if !url.starts_with("https://") && !url.starts_with("http://localhost") {
                return Err(ConfigError::Invalid(format!(
                    "{name} must be https (got '{url}')"
                )));
            }
        }
        if !self.confluence.base_url.is_empty() && !self.confluence.base_url.starts_with("https://")
        {
            return Err(ConfigError::Invalid(format!(
                "confluence.base_url must be https (got '{}')",
                self.confluence.base_url
            )));
        }
        Ok(())
    }

    /// Whether an LLM API key is available.
    pub fn has_api_key(&self) -> bool {
        self.llm.api_key.as_deref().is_some_and(|k| !k.is_empty())
    }

    /// The default config file content written by `quarry init`.
    pub fn default_toml() -> String {
        concat!(
            "# Quarry configuration\n",
            "\n",
            "[llm]\n",
            "api_url = \"https://api.openai.com/v1\"\n",
            "# api_key = \"sk-...\"            # or env QUARRY_LLM_API_KEY\n",
            "model = \"gpt-4o-mini\"\n",
            "temperature = 0.3\n",
            "max_tokens = 1024\n",
            "request_timeout_secs = 45\n",
            "\n",
            "[bitbucket]\n",
            "base_url = \"https://api.bitbucket.org/2.0\"\n",
            "workspace = \"my-workspace\"\n",
            "repository = \"my-repo\"\n",
            "default_branch = \"main\"\n",
            "# email = \"you@example.com\"     # or env QUARRY_BITBUCKET_EMAIL\n",
            "# api_token = \"...\"             # or env QUARRY_BITBUCKET_TOKEN\n",
            "\n",
            "[confluence]\n",
            "base_url = \"https://my-site.atlassian.net\"\n",
            "# email = \"you@example.com\"     # or env QUARRY_CONFLUENCE_EMAIL\n",
            "# api_token = \"...\"             # or env QUARRY_CONFLUENCE_API_TOKEN\n",
            "page_ids = []\n",
            "\n",
            "[agent]\n",
            "max_iterations = 5\n",
            "history_window = 10\n",
            "\n",
            "[gateway]\n",
            "host = \"127.0.0.1\"\n",
            "port = 8080\n",
        )
        .into()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config at {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("failed to parse config at {path}: {message}")]
    Parse { path: String, message: String },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.agent.max_iterations, 5);
        assert_eq!(config.agent.history_window, 10);
        assert_eq!(config.llm.request_timeout_secs, 45);
    }

    #[test]
    fn load_from_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("quarry.toml");
        std::fs::write(
            &path,
            r#"
[llm]
model = "gpt-4o"

[bitbucket]
workspace = "acme"
repository = "widgets"

[agent]
max_iterations = 3
"#,
        )
        .unwrap();

        let config = AppConfig::load_from(&path).unwrap();
        assert_eq!(config.llm.model, "gpt-4o");
        assert_eq!(config.bitbucket.workspace, "acme");
        assert_eq!(config.agent.max_iterations, 3);
        // Untouched sections keep their defaults.
        assert_eq!(config.agent.history_window, 10);
        assert_eq!(config.gateway.port, 8080);
    }

    #[test]
    fn default_toml_parses_back() {
        let config: AppConfig = toml::from_str(&AppConfig::default_toml()).unwrap();
        assert_eq!(config.bitbucket.workspace, "my-workspace");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_zero_iterations() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("quarry.toml");
        std::fs::write(&path, "[agent]\nmax_iterations = 0\n").unwrap();
        let err = AppConfig::load_from(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn rejects_insecure_confluence_url() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("quarry.toml");
        std::fs::write(
            &path,
            "[confluence]\nbase_url = \"http://my-site.atlassian.net\"\n",
        )
        .unwrap();
        let err = AppConfig::load_from(&path).unwrap_err();
        assert!(err.to_string().contains("https"));
    }

    #[test]
    fn debug_redacts_secrets() {
        let mut config = AppConfig::default();
        config.llm.api_key = Some("sk-secret".into());
        config.confluence.api_token = Some("token-secret".into());
        let debug = format!("{config:?}");
        assert!(!debug.contains("sk-secret"));
        assert!(!debug.contains("token-secret"));
        assert!(debug.contains("[REDACTED]"));
    }
}
