//! Streaming chat gateway: SSE chat endpoint plus liveness probe.
use std::{convert::Infallible, net::SocketAddr, sync::Arc};

use anyhow::{Context, Result};
use async_trait::async_trait;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use forge_agent_core::{Agent, AgentConfig, AgentEvent};
use forge_ai::{LlmClient, Message, MessageRole, StreamDeltaHandler};
use forge_auth::AuthError;
use forge_session::{ChatMessageRecord, ChatRole, SessionStore};
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{error, info};

#[cfg(test)]
mod tests;

const CHAT_STREAM_ENDPOINT: &str = "/chat/stream";
const HEALTH_ENDPOINT: &str = "/health";
const SERVICE_NAME: &str = "forge-coding-agent";
const HISTORY_CONTEXT_LIMIT: usize = 40;

#[async_trait]
/// Prepares an agent's capability tools for one exchange.
///
/// Registration resolves the GitHub credential first, so an exchange fails
/// before any tool runs when neither source yields a token.
pub trait GatewayToolProvider: Send + Sync {
    async fn register(&self, agent: &mut Agent) -> Result<(), AuthError>;
}

#[derive(Clone, Default)]
/// Provider that registers nothing; chat-only deployments.
pub struct NoopGatewayToolProvider;

#[async_trait]
impl GatewayToolProvider for NoopGatewayToolProvider {
    async fn register(&self, _agent: &mut Agent) -> Result<(), AuthError> {
        Ok(())
    }
}

/// Settings for the gateway server.
pub struct GatewayServerConfig {
    pub client: Arc<dyn LlmClient>,
    pub model: String,
    pub system_prompt: String,
    pub max_turns: usize,
    pub tool_provider: Arc<dyn GatewayToolProvider>,
    pub bind: String,
}

/// Shared handler state: configuration plus the session store.
pub struct GatewayServerState {
    config: GatewayServerConfig,
    sessions: SessionStore,
}

impl GatewayServerState {
    pub fn new(config: GatewayServerConfig) -> Self {
        Self {
            config,
            sessions: SessionStore::new(),
        }
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }
}

#[derive(Debug, Clone, Deserialize)]
/// Chat request body.
pub struct ChatStreamRequest {
    pub message: String,
    pub session_id: String,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
/// Typed frames written to the SSE stream.
pub enum SseFrame {
    Token { content: String },
    ToolUse { tool_name: String, tool_input: Value },
    Error { message: String },
    Done,
}

impl SseFrame {
    fn into_event(self) -> Event {
        match serde_json::to_string(&self) {
            Ok(data) => Event::default().data(data),
            Err(_) => Event::default()
                .data("{\"type\":\"error\",\"message\":\"frame serialization failed\"}"),
        }
    }
}

/// Builds the gateway router around shared state.
pub fn build_gateway_router(state: Arc<GatewayServerState>) -> Router {
    Router::new()
        .route(CHAT_STREAM_ENDPOINT, post(handle_chat_stream))
        .route(HEALTH_ENDPOINT, get(handle_health))
        .with_state(state)
}

/// Runs the gateway server until interrupted.
pub async fn run_gateway_server(config: GatewayServerConfig) -> Result<()> {
    let bind_addr = config
        .bind
        .parse::<SocketAddr>()
        .with_context(|| format!("invalid gateway bind address '{}'", config.bind))?;

    let listener = TcpListener::bind(bind_addr)
        .await
        .with_context(|| format!("failed to bind gateway server on {bind_addr}"))?;
    let local_addr = listener
        .local_addr()
        .context("failed to resolve bound gateway address")?;
    info!(endpoint = CHAT_STREAM_ENDPOINT, addr = %local_addr, "gateway listening");

    let state = Arc::new(GatewayServerState::new(config));
    let app = build_gateway_router(state);
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
        .context("gateway server exited unexpectedly")?;

    Ok(())
}

async fn handle_health() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "service": SERVICE_NAME,
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn handle_chat_stream(
    State(state): State<Arc<GatewayServerState>>,
    Json(request): Json<ChatStreamRequest>,
) -> Response {
    if request.message.trim().is_empty() || request.session_id.trim().is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "message and session_id must be non-empty" })),
        )
            .into_response();
    }

    info!(session_id = %request.session_id, "chat_request");

    let (tx, rx) = mpsc::unbounded_channel::<SseFrame>();
    tokio::spawn(execute_chat_exchange(state, request, tx));

    let stream =
        UnboundedReceiverStream::new(rx).map(|frame| Ok::<Event, Infallible>(frame.into_event()));
    Sse::new(stream)
        .keep_alive(KeepAlive::default())
        .into_response()
}

async fn execute_chat_exchange(
    state: Arc<GatewayServerState>,
    request: ChatStreamRequest,
    tx: mpsc::UnboundedSender<SseFrame>,
) {
    let history = state
        .sessions
        .read(&request.session_id, Some(HISTORY_CONTEXT_LIMIT));
    state.sessions.append(ChatMessageRecord::new(
        &request.session_id,
        ChatRole::User,
        &request.message,
    ));

    let mut agent = Agent::new(
        state.config.client.clone(),
        AgentConfig {
            model: state.config.model.clone(),
            system_prompt: state.config.system_prompt.clone(),
            max_turns: state.config.max_turns,
            ..AgentConfig::default()
        },
    );

    if let Err(auth_error) = state.config.tool_provider.register(&mut agent).await {
        match auth_error {
            AuthError::AuthorizationPending { authorization_url } => {
                let _ = tx.send(SseFrame::Token {
                    content: format!(
                        "GitHub authorization required. Visit {authorization_url} to grant \
                         access, then retry your request."
                    ),
                });
                let _ = tx.send(SseFrame::Error {
                    message: "user authorization required".to_string(),
                });
            }
            error @ (AuthError::MissingCredentials
            | AuthError::EmptyToken
            | AuthError::InvalidCredential(_)) => {
                let _ = tx.send(SseFrame::Error {
                    message: error.to_string(),
                });
            }
            AuthError::Identity(identity_error) => {
                error!(
                    session_id = %request.session_id,
                    error = %identity_error,
                    "tool registration failed"
                );
                let _ = tx.send(SseFrame::Error {
                    message: "authentication failed".to_string(),
                });
            }
        }
        return;
    }

    agent.extend_history(history.iter().map(|record| match record.role {
        ChatRole::User => Message::user(record.content.clone()),
        ChatRole::Assistant => Message::assistant_text(record.content.clone()),
    }));

    agent.subscribe({
        let tx = tx.clone();
        move |event| {
            if let AgentEvent::ToolExecutionStart {
                tool_name,
                arguments,
                ..
            } = event
            {
                let _ = tx.send(SseFrame::ToolUse {
                    tool_name: tool_name.clone(),
                    tool_input: arguments.clone(),
                });
            }
        }
    });

    let stream_handler: StreamDeltaHandler = {
        let tx = tx.clone();
        Arc::new(move |delta: String| {
            if delta.is_empty() {
                return;
            }
            let _ = tx.send(SseFrame::Token { content: delta });
        })
    };

    match agent
        .prompt_with_stream(&request.message, Some(stream_handler))
        .await
    {
        Ok(new_messages) => {
            let reply = collect_assistant_reply(&new_messages);
            if !reply.is_empty() {
                state.sessions.append(ChatMessageRecord::new(
                    &request.session_id,
                    ChatRole::Assistant,
                    reply,
                ));
            }
            let _ = tx.send(SseFrame::Done);
        }
        Err(agent_error) => {
            error!(
                session_id = %request.session_id,
                error = %agent_error,
                "chat exchange failed"
            );
            let _ = tx.send(SseFrame::Error {
                message: "agent exchange failed".to_string(),
            });
        }
    }
}

fn collect_assistant_reply(messages: &[Message]) -> String {
    messages
        .iter()
        .filter(|message| message.role == MessageRole::Assistant)
        .map(Message::text_content)
        .filter(|text| !text.trim().is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}
