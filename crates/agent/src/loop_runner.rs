//! The agent conversation loop implementation.
//!
//! A turn walks `Idle → AwaitingModel → (ToolDispatch → AwaitingModel)* →
//! Done`, with `Failed` reachable from anywhere. The loop terminates within
//! `max_iterations + 1` model calls; the iteration cap is the only
//! anti-loop safeguard — there is no detection of the model repeating the
//! same tool call.

use quarry_core::error::Error;
use quarry_core::event::{DomainEvent, EventBus};
use quarry_core::message::{Message, SessionId};
use quarry_core::provider::{Provider, ProviderRequest};
use quarry_core::session::SessionStore;
use quarry_core::tool::{ToolCall, ToolRegistry};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Returned when the model produces no usable text at all.
const FALLBACK_RESPONSE: &str = "I was unable to generate a response.";

/// The outcome of one `invoke` turn, exactly what callers see.
#[derive(Debug, Clone, Serialize)]
pub struct InvokeOutcome {
    pub success: bool,
    pub output: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub session_id: String,
}

/// The core agent loop that orchestrates LLM calls and tool execution.
pub struct AgentLoop {
    /// The LLM provider to use
    provider: Arc<dyn Provider>,

    /// The model to use
    model: String,

    /// Temperature setting
    temperature: f32,

    /// Default max tokens per response
    max_tokens: Option<u32>,

    /// Tool registry
    tools: Arc<ToolRegistry>,

    /// Session history store
    store: Arc<dyn SessionStore>,

    /// Event bus for domain events
    event_bus: Arc<EventBus>,

    /// Maximum tool-dispatch rounds per turn
    max_iterations: u32,

    /// Messages retained per session after each completed turn
    history_window: usize,

    /// The assembled system prompt
    system_prompt: String,
}

impl AgentLoop {
    /// Create a new agent loop.
    pub fn new(
        provider: Arc<dyn Provider>,
        model: impl Into<String>,
        temperature: f32,
        tools: Arc<ToolRegistry>,
        store: Arc<dyn SessionStore>,
        event_bus: Arc<EventBus>,
        system_prompt: impl Into<String>,
    ) -> Self {
        Self {
            provider,
            model: model.into(),
            temperature,
            max_tokens: None,
            tools,
            store,
            event_bus,
            max_iterations: 5,
            history_window: 10,
            system_prompt: system_prompt.into(),
        }
    }

    /// Set the maximum number of tool-dispatch rounds.
    pub fn with_max_iterations(mut self, max: u32) -> Self {
        self.max_iterations = max;
        self
    }

    /// Set the per-session history window.
    pub fn with_history_window(mut self, window: usize) -> Self {
        self.history_window = window;
        self
    }

    /// Set the default max tokens per LLM response.
    pub fn with_max_tokens(mut self, max: u32) -> Self {
        self.max_tokens = Some(max);
        self
    }

    /// Process one user input against a session and return the outcome.
    ///
    /// This is the external entry point; every fault below it is caught here
    /// and rendered into a `success: false` outcome, never a panic or an
    /// error type the caller must unpack.
    pub async fn invoke(&self, input: &str, session: &SessionId) -> InvokeOutcome {
        match self.run_turn(input, session).await {
            Ok(output) => InvokeOutcome {
                success: true,
                output: Some(output),
                error: None,
                session_id: session.to_string(),
            },
            Err(e) => {
                warn!(session_id = %session, error = %e, "Turn failed");
                self.event_bus.publish(DomainEvent::ErrorOccurred {
                    context: "agent_loop".into(),
                    error_message: e.to_string(),
                    timestamp: chrono::Utc::now(),
                });
                InvokeOutcome {
                    success: false,
                    output: None,
                    error: Some(e.to_string()),
                    session_id: session.to_string(),
                }
            }
        }
    }

    /// Read a session's committed history.
    pub async fn history(&self, session: &SessionId) -> Result<Vec<Message>, Error> {
        Ok(self.store.history(session).await?)
    }

    /// Clear a session. Clearing an unknown session is a no-op.
    pub async fn clear_memory(&self, session: &SessionId) -> Result<(), Error> {
        self.store.clear(session).await?;
        Ok(())
    }

    /// The tool registry this loop dispatches against.
    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    async fn run_turn(&self, input: &str, session: &SessionId) -> Result<String, Error> {
        if input.trim().is_empty() {
            // Rejected before any history mutation.
            return Err(Error::Validation("input is required".into()));
        }

        info!(session_id = %session, "Processing turn");
        self.event_bus.publish(DomainEvent::MessageReceived {
            session_id: session.to_string(),
            content_preview: input.chars().take(80).collect(),
            timestamp: chrono::Utc::now(),
        });

        // Commit the user message first. On a failed turn it stays behind
        // without a matching assistant turn — deliberate, so a retry invoke
        // still sees the question in context.
        self.store.append(session, Message::user(input)).await?;
        let history = self.store.history(session).await?;

        // Working message list for this turn: [system] ++ history.
        // Tool exchanges accumulate here and are never committed.
        let mut messages = Vec::with_capacity(history.len() + 1);
        messages.push(Message::system(&self.system_prompt));
        messages.extend(history);

        let tool_definitions = self.tools.definitions();
        let mut dispatch_rounds = 0u32;
        let mut last_content = String::new();
        let mut model = self.model.clone();
        let mut tokens_used = 0u32;

        loop {
            debug!(session_id = %session, round = dispatch_rounds, "Calling model");

            let request = ProviderRequest {
                model: self.model.clone(),
                messages: messages.clone(),
                temperature: self.temperature,
                max_tokens: self.max_tokens,
                tools: tool_definitions.clone(),
            };

            let response = self.provider.complete(request).await?;

            if let Some(usage) = &response.usage {
                tokens_used += usage.total_tokens;
            }
            model = response.model.clone();

            let assistant = response.message;
            if !assistant.content.is_empty() {
                last_content = assistant.content.clone();
            }

            if assistant.tool_calls.is_empty() {
                break;
            }

            if dispatch_rounds >= self.max_iterations {
                warn!(
                    session_id = %session,
                    rounds = dispatch_rounds,
                    "Max tool iterations reached, stopping with last content"
                );
                break;
            }

            debug!(
                tool_count = assistant.tool_calls.len(),
                "Executing tool calls"
            );

            let tool_calls = assistant.tool_calls.clone();
            messages.push(assistant);

            // Dispatch in call order so correlation IDs stay attributable.
            for tc in &tool_calls {
                let call = ToolCall {
                    id: tc.id.clone(),
                    name: tc.name.clone(),
                    arguments: serde_json::from_str(&tc.arguments).unwrap_or_default(),
                };

                let start = std::time::Instant::now();
                let result = self.tools.execute(&call).await;
                let duration_ms = start.elapsed().as_millis() as u64;

                match result {
                    Ok(tool_result) => {
                        self.event_bus.publish(DomainEvent::ToolExecuted {
                            tool_name: tc.name.clone(),
                            success: tool_result.success,
                            duration_ms,
                            timestamp: chrono::Utc::now(),
                        });
                        messages.push(Message::tool_result(&tc.id, &tool_result.output));
                    }
                    Err(e) => {
                        // Tool failures are data: report them to the model
                        // as tool-result text so it can adapt.
                        warn!(tool = %tc.name, error = %e, "Tool execution failed");
                        self.event_bus.publish(DomainEvent::ToolExecuted {
                            tool_name: tc.name.clone(),
                            success: false,
                            duration_ms,
                            timestamp: chrono::Utc::now(),
                        });
                        messages.push(Message::tool_result(&tc.id, format!("Error: {e}")));
                    }
                }
            }

            dispatch_rounds += 1;
        }

        let output = if last_content.is_empty() {
            FALLBACK_RESPONSE.to_string()
        } else {
            last_content
        };

        // Only the final assistant message is committed; then the sliding
        // window applies.
        self.store
            .append(session, Message::assistant(&output))
            .await?;
        self.store.trim(session, self.history_window).await?;

        self.event_bus.publish(DomainEvent::ResponseGenerated {
            session_id: session.to_string(),
            model,
            tokens_used,
            timestamp: chrono::Utc::now(),
        });

        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use quarry_core::error::{ProviderError, ToolError};
    use quarry_core::message::{MessageToolCall, Role};
    use quarry_core::provider::{ProviderResponse, Usage};
    use quarry_core::tool::{Tool, ToolResult};
    use quarry_session::InMemorySessionStore;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// A provider that replays a scripted queue of responses and records
    /// every request it received.
    #[derive(Debug)]
    struct ScriptedProvider {
        responses: Mutex<VecDeque<Result<ProviderResponse, ProviderError>>>,
        requests: Mutex<Vec<ProviderRequest>>,
        calls: AtomicUsize,
    }

    impl ScriptedProvider {
        fn new(responses: Vec<Result<ProviderResponse, ProviderError>>) -> Self {
            Self {
                responses: Mutex::new(responses.into()),
                requests: Mutex::new(Vec::new()),
                calls: AtomicUsize::new(0),
            }
        }

        fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Provider for ScriptedProvider {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn complete(
            &self,
            request: ProviderRequest,
        ) -> Result<ProviderResponse, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.requests.lock().unwrap().push(request);
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(ProviderError::Network("script exhausted".into())))
        }
    }

    /// A provider that always asks for the same tool again.
    #[derive(Debug)]
    struct RelentlessProvider {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Provider for RelentlessProvider {
        fn name(&self) -> &str {
            "relentless"
        }

        async fn complete(
            &self,
            _request: ProviderRequest,
        ) -> Result<ProviderResponse, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(tool_call_response(&[("call_x", "counter")]))
        }
    }

    struct CountingTool {
        executions: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Tool for CountingTool {
        fn name(&self) -> &str {
            "counter"
        }
        fn description(&self) -> &str {
            "Counts executions"
        }
        fn parameters_schema(&self) -> serde_json::Value {
            serde_json::json!({ "type": "object", "properties": {} })
        }
        async fn execute(&self, _arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
            self.executions.fetch_add(1, Ordering::SeqCst);
            Ok(ToolResult {
                call_id: String::new(),
                success: true,
                output: "counted".into(),
            })
        }
    }

    struct FailingTool;

    #[async_trait]
    impl Tool for FailingTool {
        fn name(&self) -> &str {
            "flaky"
        }
        fn description(&self) -> &str {
            "Always fails"
        }
        fn parameters_schema(&self) -> serde_json::Value {
            serde_json::json!({ "type": "object", "properties": {} })
        }
        async fn execute(&self, _arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
            Err(ToolError::ExecutionFailed {
                tool_name: "flaky".into(),
                reason: "remote listing unreachable".into(),
            })
        }
    }

    fn text_response(content: &str) -> Result<ProviderResponse, ProviderError> {
        Ok(ProviderResponse {
            message: Message::assistant(content),
            usage: Some(Usage {
                prompt_tokens: 10,
                completion_tokens: 5,
                total_tokens: 15,
            }),
            model: "test-model".into(),
        })
    }

    fn tool_call_response(calls: &[(&str, &str)]) -> ProviderResponse {
        let mut message = Message::assistant("");
        message.tool_calls = calls
            .iter()
            .map(|(id, name)| MessageToolCall {
                id: id.to_string(),
                name: name.to_string(),
                arguments: "{}".into(),
            })
            .collect();
        ProviderResponse {
            message,
            usage: None,
            model: "test-model".into(),
        }
    }

    fn loop_with(
        provider: Arc<dyn Provider>,
        tools: ToolRegistry,
        store: Arc<InMemorySessionStore>,
    ) -> AgentLoop {
        AgentLoop::new(
            provider,
            "test-model",
            0.3,
            Arc::new(tools),
            store,
            Arc::new(EventBus::default()),
            "You are a test assistant.",
        )
    }

    #[tokio::test]
    async fn simple_text_response_commits_both_turns() {
        let provider = Arc::new(ScriptedProvider::new(vec![text_response("Hello there!")]));
        let store = Arc::new(InMemorySessionStore::new());
        let agent = loop_with(provider.clone(), ToolRegistry::new(), store.clone());

        let session = SessionId::from("s1");
        let outcome = agent.invoke("hi", &session).await;

        assert!(outcome.success);
        assert_eq!(outcome.output.as_deref(), Some("Hello there!"));
        assert_eq!(outcome.session_id, "s1");
        assert_eq!(provider.call_count(), 1);

        let history = agent.history(&session).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].role, Role::User);
        assert_eq!(history[1].role, Role::Assistant);
    }

    #[tokio::test]
    async fn two_tool_calls_in_one_turn_then_text() {
        let executions = Arc::new(AtomicUsize::new(0));
        let mut tools = ToolRegistry::new();
        tools.register(Box::new(CountingTool {
            executions: executions.clone(),
        }));

        let provider = Arc::new(ScriptedProvider::new(vec![
            Ok(tool_call_response(&[
                ("call_1", "counter"),
                ("call_2", "counter"),
            ])),
            text_response("Both done."),
        ]));
        let store = Arc::new(InMemorySessionStore::new());
        let agent = loop_with(provider.clone(), tools, store);

        let outcome = agent.invoke("count twice", &SessionId::from("s1")).await;

        assert!(outcome.success);
        assert_eq!(outcome.output.as_deref(), Some("Both done."));
        assert_eq!(provider.call_count(), 2);
        assert_eq!(executions.load(Ordering::SeqCst), 2);

        // The second model call saw the assistant tool-call message and two
        // correlated tool results, in order.
        let requests = provider.requests.lock().unwrap();
        let second = &requests[1].messages;
        let tool_messages: Vec<&Message> =
            second.iter().filter(|m| m.role == Role::Tool).collect();
        assert_eq!(tool_messages.len(), 2);
        assert_eq!(tool_messages[0].tool_call_id.as_deref(), Some("call_1"));
        assert_eq!(tool_messages[1].tool_call_id.as_deref(), Some("call_2"));
    }

    #[tokio::test]
    async fn relentless_tool_calls_halt_at_cap() {
        let executions = Arc::new(AtomicUsize::new(0));
        let mut tools = ToolRegistry::new();
        tools.register(Box::new(CountingTool {
            executions: executions.clone(),
        }));

        let provider = Arc::new(RelentlessProvider {
            calls: AtomicUsize::new(0),
        });
        let store = Arc::new(InMemorySessionStore::new());
        let agent = loop_with(provider.clone(), tools, store);

        let outcome = agent.invoke("loop forever", &SessionId::from("s1")).await;

        // Exactly 5 dispatch rounds, max_iterations + 1 model calls, and a
        // successful turn with the fallback text (the stub never produced
        // content).
        assert!(outcome.success);
        assert_eq!(outcome.output.as_deref(), Some(FALLBACK_RESPONSE));
        assert_eq!(provider.calls.load(Ordering::SeqCst), 6);
        assert_eq!(executions.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn empty_input_is_rejected_without_history_mutation() {
        let provider = Arc::new(ScriptedProvider::new(vec![]));
        let store = Arc::new(InMemorySessionStore::new());
        let agent = loop_with(provider.clone(), ToolRegistry::new(), store);

        let session = SessionId::from("s1");
        for input in ["", "   ", "\n\t"] {
            let outcome = agent.invoke(input, &session).await;
            assert!(!outcome.success);
            assert_eq!(outcome.error.as_deref(), Some("input is required"));
            assert!(outcome.output.is_none());
        }

        assert_eq!(provider.call_count(), 0);
        assert!(agent.history(&session).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn failing_tool_becomes_tool_result_text() {
        let mut tools = ToolRegistry::new();
        tools.register(Box::new(FailingTool));

        let provider = Arc::new(ScriptedProvider::new(vec![
            Ok(tool_call_response(&[("call_1", "flaky")])),
            text_response("Recovered."),
        ]));
        let store = Arc::new(InMemorySessionStore::new());
        let agent = loop_with(provider.clone(), tools, store);

        let outcome = agent.invoke("try it", &SessionId::from("s1")).await;
        assert!(outcome.success);

        let requests = provider.requests.lock().unwrap();
        let tool_msg = requests[1]
            .messages
            .iter()
            .find(|m| m.role == Role::Tool)
            .unwrap();
        assert_eq!(tool_msg.tool_call_id.as_deref(), Some("call_1"));
        assert!(tool_msg.content.starts_with("Error:"));
        assert!(tool_msg.content.contains("remote listing unreachable"));
    }

    #[tokio::test]
    async fn unknown_tool_becomes_tool_result_text() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            Ok(tool_call_response(&[("call_1", "no_such_tool")])),
            text_response("Moving on."),
        ]));
        let store = Arc::new(InMemorySessionStore::new());
        let agent = loop_with(provider.clone(), ToolRegistry::new(), store);

        let outcome = agent.invoke("use a ghost tool", &SessionId::from("s1")).await;
        assert!(outcome.success);
        assert_eq!(outcome.output.as_deref(), Some("Moving on."));

        let requests = provider.requests.lock().unwrap();
        let tool_msg = requests[1]
            .messages
            .iter()
            .find(|m| m.role == Role::Tool)
            .unwrap();
        assert!(tool_msg.content.contains("Tool not found: no_such_tool"));
    }

    #[tokio::test]
    async fn history_never_exceeds_window() {
        let responses: Vec<_> = (0..12).map(|i| text_response(&format!("reply {i}"))).collect();
        let provider = Arc::new(ScriptedProvider::new(responses));
        let store = Arc::new(InMemorySessionStore::new());
        let agent = loop_with(provider, ToolRegistry::new(), store);

        let session = SessionId::from("s1");
        for i in 0..12 {
            let outcome = agent.invoke(&format!("question {i}"), &session).await;
            assert!(outcome.success);
            assert!(agent.history(&session).await.unwrap().len() <= 10);
        }

        let history = agent.history(&session).await.unwrap();
        assert_eq!(history.len(), 10);
        // Oldest turns fell off; the latest exchange is intact at the tail.
        assert_eq!(history[9].content, "reply 11");
    }

    #[tokio::test]
    async fn provider_fault_fails_turn_but_keeps_user_message() {
        let provider = Arc::new(ScriptedProvider::new(vec![Err(ProviderError::Timeout(
            "model call exceeded budget".into(),
        ))]));
        let store = Arc::new(InMemorySessionStore::new());
        let agent = loop_with(provider, ToolRegistry::new(), store);

        let session = SessionId::from("s1");
        let outcome = agent.invoke("slow question", &session).await;

        assert!(!outcome.success);
        assert!(outcome.output.is_none());
        assert!(outcome.error.unwrap().contains("timed out"));

        // The user message stays; no partial assistant turn was committed.
        let history = agent.history(&session).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].role, Role::User);
    }

    #[tokio::test]
    async fn cap_keeps_last_available_content() {
        // Every response carries both content and another tool call; at the
        // cap the loop must return the last content rather than the fallback.
        let mut responses = Vec::new();
        for i in 0..6 {
            let mut resp = tool_call_response(&[("call_n", "counter")]);
            resp.message.content = format!("thinking {i}");
            responses.push(Ok(resp));
        }
        let provider = Arc::new(ScriptedProvider::new(responses));

        let mut tools = ToolRegistry::new();
        tools.register(Box::new(CountingTool {
            executions: Arc::new(AtomicUsize::new(0)),
        }));
        let store = Arc::new(InMemorySessionStore::new());
        let agent = loop_with(provider, tools, store);

        let outcome = agent.invoke("keep going", &SessionId::from("s1")).await;
        assert!(outcome.success);
        assert_eq!(outcome.output.as_deref(), Some("thinking 5"));
    }

    #[tokio::test]
    async fn clear_memory_is_idempotent() {
        let provider = Arc::new(ScriptedProvider::new(vec![text_response("hi")]));
        let store = Arc::new(InMemorySessionStore::new());
        let agent = loop_with(provider, ToolRegistry::new(), store);

        let session = SessionId::from("s1");
        agent.invoke("hello", &session).await;
        assert_eq!(agent.history(&session).await.unwrap().len(), 2);

        agent.clear_memory(&session).await.unwrap();
        assert!(agent.history(&session).await.unwrap().is_empty());

        // Clearing again (now nonexistent) is a no-op.
        agent.clear_memory(&session).await.unwrap();
    }

    #[tokio::test]
    async fn system_prompt_leads_every_model_call() {
        let provider = Arc::new(ScriptedProvider::new(vec![text_response("ok")]));
        let store = Arc::new(InMemorySessionStore::new());
        let agent = loop_with(provider.clone(), ToolRegistry::new(), store);

        agent.invoke("check prompt", &SessionId::from("s1")).await;

        let requests = provider.requests.lock().unwrap();
        let first = &requests[0].messages[0];
        assert_eq!(first.role, Role::System);
        assert_eq!(first.content, "You are a test assistant.");
    }
}
