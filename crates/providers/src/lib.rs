//! LLM provider implementations for Quarry.
//!
//! The assistant talks to any OpenAI-compatible chat completions endpoint;
//! the `Provider` trait lives in `quarry-core` so the agent loop stays
//! backend-agnostic.

pub mod openai_compat;

pub use openai_compat::OpenAiCompatProvider;

use quarry_config::AppConfig;
use quarry_core::{Provider, ProviderError};
use std::sync::Arc;

/// Build the configured provider.
///
/// Fails when no API key is available — every supported backend requires
/// one, and a missing key would otherwise surface as a confusing 401 deep
/// inside the first turn.
pub fn from_config(config: &AppConfig) -> Result<Arc<dyn Provider>, ProviderError> {
    let api_key = config
        .llm
        .api_key
        .clone()
        .filter(|k| !k.is_empty())
        .ok_or_else(|| {
            ProviderError::NotConfigured(
                "no LLM API key — set llm.api_key or QUARRY_LLM_API_KEY".into(),
            )
        })?;

    Ok(Arc::new(OpenAiCompatProvider::new(
        "openai",
        &config.llm.api_url,
        api_key,
        std::time::Duration::from_secs(config.llm.request_timeout_secs),
    )))
}
