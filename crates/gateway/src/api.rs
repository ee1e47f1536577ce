//! Route handlers and DTOs for the gateway API.

use crate::SharedState;
use axum::{
    Router,
    extract::{DefaultBodyLimit, Path, Query, State},
    http::StatusCode,
    response::sse::{Event as SseEvent, Sse},
    response::Json,
    routing::{delete, get, post},
};
use quarry_core::event::DomainEvent;
use quarry_core::message::{Message, SessionId};
use quarry_remote::fetch_tree;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::convert::Infallible;
use tokio_stream::StreamExt;
use tower_http::cors::CorsLayer;
use tracing::info;

/// Build the gateway router.
pub fn router(state: SharedState, cors_origin: Option<&str>) -> Router {
    let cors = match cors_origin.and_then(|o| o.parse().ok()) {
        Some(origin) => CorsLayer::new()
            .allow_origin(tower_http::cors::AllowOrigin::exact(origin))
            .allow_methods([
                axum::http::Method::GET,
                axum::http::Method::POST,
                axum::http::Method::DELETE,
            ])
            .allow_headers([axum::http::header::CONTENT_TYPE]),
        None => CorsLayer::new(),
    };

    Router::new()
        .route("/health", get(health_handler))
        .route("/v1/chat", post(chat_handler))
        .route("/v1/sessions/{id}/history", get(history_handler))
        .route("/v1/sessions/{id}", delete(clear_session_handler))
        .route("/v1/repo/files", get(repo_files_handler))
        .route("/v1/docs/{id}", get(document_handler))
        .route("/v1/tools", get(list_tools_handler))
        .route("/v1/logs", get(log_stream_handler))
        .layer(DefaultBodyLimit::max(1024 * 1024))
        .layer(cors)
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(state)
}

// ── Request / Response types ──────────────────────────────────────────────

#[derive(Deserialize)]
struct ChatRequest {
    /// Existing session ID (omit to start a new session).
    #[serde(default)]
    session_id: Option<String>,
    /// The user's message.
    message: String,
}

#[derive(Serialize)]
struct HistoryResponse {
    session_id: String,
    messages: Vec<MessageDto>,
    count: usize,
}

#[derive(Serialize)]
struct MessageDto {
    id: String,
    role: String,
    content: String,
    timestamp: String,
}

impl From<&Message> for MessageDto {
    fn from(m: &Message) -> Self {
        Self {
            id: m.id.clone(),
            role: format!("{:?}", m.role).to_lowercase(),
            content: m.content.clone(),
            timestamp: m.timestamp.to_rfc3339(),
        }
    }
}

#[derive(Deserialize)]
struct RepoFilesQuery {
    #[serde(default)]
    path: Option<String>,
    #[serde(default)]
    branch: Option<String>,
}

#[derive(Serialize)]
struct RepoFilesResponse {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    files: Option<BTreeMap<String, String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

#[derive(Serialize)]
struct DocumentResponse {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<DocumentDto>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

#[derive(Serialize)]
struct DocumentDto {
    id: String,
    title: String,
    space_id: String,
    author_id: String,
    updated_at: String,
    url: String,
    body: String,
}

#[derive(Serialize)]
struct ToolListResponse {
    tools: Vec<ToolDto>,
    count: usize,
}

#[derive(Serialize)]
struct ToolDto {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

// ── Handlers ──────────────────────────────────────────────────────────────

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// `POST /v1/chat` — run one agent turn.
///
/// Always answers 200 with the outcome envelope; loop-level faults are
/// reported in-band as `{success: false, error}`, matching the contract the
/// chat UI consumes.
async fn chat_handler(
    State(state): State<SharedState>,
    Json(payload): Json<ChatRequest>,
) -> Json<quarry_agent::InvokeOutcome> {
    let session = payload
        .session_id
        .filter(|s| !s.is_empty())
        .map(|s| SessionId::from(&s))
        .unwrap_or_default();

    info!(session_id = %session, "v1/chat request");

    Json(state.agent.invoke(&payload.message, &session).await)
}

async fn history_handler(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Json<HistoryResponse>, StatusCode> {
    let session = SessionId::from(&id);
    let history = state
        .agent
        .history(&session)
        .await
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    let messages: Vec<MessageDto> = history.iter().map(MessageDto::from).collect();
    let count = messages.len();

    Ok(Json(HistoryResponse {
        session_id: id,
        messages,
        count,
    }))
}

/// `DELETE /v1/sessions/{id}` — idempotent: clearing an unknown session
/// still answers 204.
async fn clear_session_handler(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<StatusCode, StatusCode> {
    state
        .agent
        .clear_memory(&SessionId::from(&id))
        .await
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn repo_files_handler(
    State(state): State<SharedState>,
    Query(query): Query<RepoFilesQuery>,
) -> Json<RepoFilesResponse> {
    let branch = query.branch.unwrap_or_else(|| state.default_branch.clone());
    let path = query.path.unwrap_or_default();

    match fetch_tree(state.source.as_ref(), &branch, &path).await {
        Ok(files) => Json(RepoFilesResponse {
            success: true,
            files: Some(files),
            error: None,
        }),
        Err(e) => Json(RepoFilesResponse {
            success: false,
            files: None,
            error: Some(e.to_string()),
        }),
    }
}

async fn document_handler(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Json<DocumentResponse> {
    match state.docs.fetch_page(&id).await {
        Ok(doc) => Json(DocumentResponse {
            success: true,
            result: Some(DocumentDto {
                id: doc.id,
                title: doc.title,
                space_id: doc.space_id,
                author_id: doc.author_id,
                updated_at: doc.updated_at,
                url: doc.url,
                body: doc.body,
            }),
            error: None,
        }),
        Err(e) => Json(DocumentResponse {
            success: false,
            result: None,
            error: Some(e.to_string()),
        }),
    }
}

async fn list_tools_handler(State(state): State<SharedState>) -> Json<ToolListResponse> {
    let defs = state.agent.tools().definitions();
    let count = defs.len();

    Json(ToolListResponse {
        tools: defs
            .into_iter()
            .map(|d| ToolDto {
                name: d.name,
                description: d.description,
                parameters: d.parameters,
            })
            .collect(),
        count,
    })
}

/// `GET /v1/logs` — SSE stream of domain events (turns, tool calls, errors).
async fn log_stream_handler(
    State(state): State<SharedState>,
) -> Sse<impl futures::Stream<Item = Result<SseEvent, Infallible>>> {
    let rx = state.event_bus.subscribe();
    let stream = tokio_stream::wrappers::BroadcastStream::new(rx)
        .filter_map(|result| result.ok())
        .map(|event| {
            let data = serde_json::to_string(event.as_ref()).unwrap_or_default();
            let event_name = match event.as_ref() {
                DomainEvent::MessageReceived { .. } => "message_received",
                DomainEvent::ResponseGenerated { .. } => "response_generated",
                DomainEvent::ToolExecuted { .. } => "tool_executed",
                DomainEvent::ErrorOccurred { .. } => "error_occurred",
            };
            Ok(SseEvent::default().event(event_name).data(data))
        });

    Sse::new(stream)
}
