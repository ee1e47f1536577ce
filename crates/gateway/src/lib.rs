//! HTTP API gateway for Quarry.
//!
//! The facade the original chat UI would sit on top of:
//!
//! - `POST   /v1/chat`                  — send a message, get the turn outcome
//! - `GET    /v1/sessions/{id}/history` — ordered session history
//! - `DELETE /v1/sessions/{id}`         — clear a session (idempotent)
//! - `GET    /v1/repo/files`            — flat repository file map
//! - `GET    /v1/docs/{id}`             — one documentation page
//! - `GET    /v1/tools`                 — the registered tool descriptors
//! - `GET    /v1/logs`                  — SSE stream of domain events
//! - `GET    /health`                   — liveness
//!
//! Built on Axum; state is one shared struct behind `Arc`.

pub mod api;

use quarry_agent::{AgentLoop, WorkspaceContext, prompt};
use quarry_core::event::EventBus;
use quarry_remote::{BitbucketClient, ConfluenceClient, SourceBrowser};
use quarry_session::InMemorySessionStore;
use quarry_tools::DocSource;
use std::sync::Arc;
use tracing::info;

/// Shared application state for the gateway.
pub struct GatewayState {
    pub agent: Arc<AgentLoop>,
    pub source: Arc<dyn SourceBrowser>,
    pub docs: Arc<dyn DocSource>,
    pub event_bus: Arc<EventBus>,
    pub default_branch: String,
}

pub type SharedState = Arc<GatewayState>;

/// Build the full application state from configuration.
///
/// Every subsystem is constructed once and shared: one provider, one tool
/// registry, one session store, one event bus.
pub fn build_state(
    config: &quarry_config::AppConfig,
) -> Result<SharedState, Box<dyn std::error::Error>> {
    let provider = quarry_providers::from_config(config)?;
    let source: Arc<dyn SourceBrowser> =
        Arc::new(BitbucketClient::from_config(&config.bitbucket)?);
    let docs: Arc<dyn DocSource> = Arc::new(ConfluenceClient::from_config(&config.confluence)?);

    let tools = Arc::new(quarry_tools::default_registry(
        source.clone(),
        docs.clone(),
        config.bitbucket.default_branch.clone(),
        config.confluence.page_ids.clone(),
    ));
    let store = Arc::new(InMemorySessionStore::new());
    let event_bus = Arc::new(EventBus::default());

    let system_prompt = prompt::build_system_prompt(
        &WorkspaceContext::from_config(config),
        config.agent.system_prompt_override.as_deref(),
    );

    let agent = Arc::new(
        AgentLoop::new(
            provider,
            &config.llm.model,
            config.llm.temperature,
            tools,
            store,
            event_bus.clone(),
            system_prompt,
        )
        .with_max_iterations(config.agent.max_iterations)
        .with_history_window(config.agent.history_window)
        .with_max_tokens(config.llm.max_tokens),
    );

    Ok(Arc::new(GatewayState {
        agent,
        source,
        docs,
        event_bus,
        default_branch: config.bitbucket.default_branch.clone(),
    }))
}

/// Start the gateway HTTP server and serve until shutdown.
pub async fn start(config: quarry_config::AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let addr = format!("{}:{}", config.gateway.host, config.gateway.port);
    let state = build_state(&config)?;
    let app = api::router(state, config.gateway.cors_origin.as_deref());

    info!(addr = %addr, "Gateway starting");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
