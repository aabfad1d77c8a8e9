//! Gateway tests: frame shapes, validation, and live SSE exchanges.
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use forge_agent_core::{Agent, AgentTool, ToolExecutionResult};
use forge_ai::{
    AiError, ChatRequest, ChatResponse, ChatUsage, ContentBlock, LlmClient, Message,
    StreamDeltaHandler, ToolDefinition,
};
use forge_auth::AuthError;
use serde_json::{json, Value};

use super::{
    build_gateway_router, GatewayServerConfig, GatewayServerState, GatewayToolProvider,
    NoopGatewayToolProvider, SseFrame,
};

struct ScriptedClient {
    responses: Mutex<Vec<ChatResponse>>,
    requests_seen: Mutex<Vec<ChatRequest>>,
}

impl ScriptedClient {
    fn new(responses: Vec<ChatResponse>) -> Self {
        Self {
            responses: Mutex::new(responses),
            requests_seen: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl LlmClient for ScriptedClient {
    async fn complete(&self, request: ChatRequest) -> Result<ChatResponse, AiError> {
        self.requests_seen.lock().expect("lock").push(request);
        let mut responses = self.responses.lock().expect("lock");
        if responses.is_empty() {
            return Err(AiError::InvalidResponse("script exhausted".to_string()));
        }
        Ok(responses.remove(0))
    }

    async fn complete_with_stream(
        &self,
        request: ChatRequest,
        on_delta: Option<StreamDeltaHandler>,
    ) -> Result<ChatResponse, AiError> {
        let response = self.complete(request).await?;
        if let Some(on_delta) = on_delta {
            let text = response.message.text_content();
            if !text.is_empty() {
                on_delta(text);
            }
        }
        Ok(response)
    }
}

fn text_response(text: &str) -> ChatResponse {
    ChatResponse {
        message: Message::assistant_text(text),
        finish_reason: Some("end_turn".to_string()),
        usage: ChatUsage::default(),
    }
}

fn tool_call_response(name: &str, arguments: Value) -> ChatResponse {
    ChatResponse {
        message: Message::assistant_blocks(vec![ContentBlock::ToolCall {
            id: "call_1".to_string(),
            name: name.to_string(),
            arguments,
        }]),
        finish_reason: Some("tool_use".to_string()),
        usage: ChatUsage::default(),
    }
}

struct EchoTool;

#[async_trait]
impl AgentTool for EchoTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "echo".to_string(),
            description: "Echoes a message".to_string(),
            parameters: json!({ "type": "object" }),
        }
    }

    async fn execute(&self, arguments: Value) -> ToolExecutionResult {
        ToolExecutionResult::ok(arguments)
    }
}

struct EchoToolProvider;

#[async_trait]
impl GatewayToolProvider for EchoToolProvider {
    async fn register(&self, agent: &mut Agent) -> Result<(), AuthError> {
        agent.register_tool(EchoTool);
        Ok(())
    }
}

struct FailingToolProvider {
    error: fn() -> AuthError,
}

#[async_trait]
impl GatewayToolProvider for FailingToolProvider {
    async fn register(&self, _agent: &mut Agent) -> Result<(), AuthError> {
        Err((self.error)())
    }
}

async fn spawn_gateway(
    client: Arc<dyn LlmClient>,
    tool_provider: Arc<dyn GatewayToolProvider>,
) -> (String, Arc<GatewayServerState>) {
    let state = Arc::new(GatewayServerState::new(GatewayServerConfig {
        client,
        model: "test-model".to_string(),
        system_prompt: "assist".to_string(),
        max_turns: 4,
        tool_provider,
        bind: "127.0.0.1:0".to_string(),
    }));
    let app = build_gateway_router(state.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let addr = listener.local_addr().expect("addr");
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    (format!("http://{addr}"), state)
}

fn parse_frames(body: &str) -> Vec<Value> {
    body.lines()
        .filter_map(|line| line.strip_prefix("data: "))
        .filter_map(|data| serde_json::from_str(data).ok())
        .collect()
}

async fn post_chat(base: &str, message: &str, session_id: &str) -> reqwest::Response {
    reqwest::Client::new()
        .post(format!("{base}/chat/stream"))
        .json(&json!({ "message": message, "session_id": session_id }))
        .send()
        .await
        .expect("request")
}

#[test]
fn frames_serialize_to_typed_payloads() {
    let token = serde_json::to_value(SseFrame::Token {
        content: "hi".to_string(),
    })
    .expect("token");
    assert_eq!(token, json!({ "type": "token", "content": "hi" }));

    let tool_use = serde_json::to_value(SseFrame::ToolUse {
        tool_name: "echo".to_string(),
        tool_input: json!({ "message": "hi" }),
    })
    .expect("tool_use");
    assert_eq!(
        tool_use,
        json!({ "type": "tool_use", "tool_name": "echo", "tool_input": { "message": "hi" } })
    );

    let error = serde_json::to_value(SseFrame::Error {
        message: "boom".to_string(),
    })
    .expect("error");
    assert_eq!(error, json!({ "type": "error", "message": "boom" }));

    let done = serde_json::to_value(SseFrame::Done).expect("done");
    assert_eq!(done, json!({ "type": "done" }));
}

#[tokio::test]
async fn health_reports_liveness() {
    let (base, _state) = spawn_gateway(
        Arc::new(ScriptedClient::new(Vec::new())),
        Arc::new(NoopGatewayToolProvider),
    )
    .await;

    let payload: Value = reqwest::get(format!("{base}/health"))
        .await
        .expect("request")
        .json()
        .await
        .expect("json");
    assert_eq!(payload["status"], "healthy");
    assert_eq!(payload["service"], "forge-coding-agent");
}

#[tokio::test]
async fn rejects_blank_chat_requests() {
    let (base, _state) = spawn_gateway(
        Arc::new(ScriptedClient::new(Vec::new())),
        Arc::new(NoopGatewayToolProvider),
    )
    .await;

    let response = post_chat(&base, "   ", "s1").await;
    assert_eq!(response.status().as_u16(), 400);

    let response = post_chat(&base, "hello", "").await;
    assert_eq!(response.status().as_u16(), 400);
}

#[tokio::test]
async fn streams_tokens_then_done_and_persists_history() {
    let (base, state) = spawn_gateway(
        Arc::new(ScriptedClient::new(vec![text_response("Hello there")])),
        Arc::new(NoopGatewayToolProvider),
    )
    .await;

    let body = post_chat(&base, "hi", "s1").await.text().await.expect("body");
    let frames = parse_frames(&body);
    assert_eq!(frames.first().map(|f| f["type"].clone()), Some(json!("token")));
    assert_eq!(frames.first().map(|f| f["content"].clone()), Some(json!("Hello there")));
    assert_eq!(frames.last().map(|f| f["type"].clone()), Some(json!("done")));

    let records = state.sessions().read("s1", None);
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].content, "hi");
    assert_eq!(records[1].content, "Hello there");
}

#[tokio::test]
async fn emits_tool_use_frames() {
    let (base, _state) = spawn_gateway(
        Arc::new(ScriptedClient::new(vec![
            tool_call_response("echo", json!({ "message": "hi" })),
            text_response("echoed"),
        ])),
        Arc::new(EchoToolProvider),
    )
    .await;

    let body = post_chat(&base, "use echo", "s1").await.text().await.expect("body");
    let frames = parse_frames(&body);
    let tool_frame = frames
        .iter()
        .find(|frame| frame["type"] == "tool_use")
        .expect("tool_use frame");
    assert_eq!(tool_frame["tool_name"], "echo");
    assert_eq!(tool_frame["tool_input"], json!({ "message": "hi" }));
    assert_eq!(frames.last().map(|f| f["type"].clone()), Some(json!("done")));
}

#[tokio::test]
async fn missing_credentials_surface_both_remedies() {
    let (base, _state) = spawn_gateway(
        Arc::new(ScriptedClient::new(Vec::new())),
        Arc::new(FailingToolProvider {
            error: || AuthError::MissingCredentials,
        }),
    )
    .await;

    let body = post_chat(&base, "list repos", "s1").await.text().await.expect("body");
    let frames = parse_frames(&body);
    let error_frame = frames
        .iter()
        .find(|frame| frame["type"] == "error")
        .expect("error frame");
    let message = error_frame["message"].as_str().expect("message");
    assert!(message.contains("static GitHub token"));
    assert!(message.contains("OAuth"));
}

#[tokio::test]
async fn authorization_pending_streams_url_before_error() {
    let (base, _state) = spawn_gateway(
        Arc::new(ScriptedClient::new(Vec::new())),
        Arc::new(FailingToolProvider {
            error: || AuthError::AuthorizationPending {
                authorization_url: "https://auth.example/grant".to_string(),
            },
        }),
    )
    .await;

    let body = post_chat(&base, "list repos", "s1").await.text().await.expect("body");
    let frames = parse_frames(&body);
    assert_eq!(frames.len(), 2);
    assert_eq!(frames[0]["type"], "token");
    assert!(frames[0]["content"]
        .as_str()
        .expect("content")
        .contains("https://auth.example/grant"));
    assert_eq!(frames[1]["type"], "error");
}

#[tokio::test]
async fn seeds_prior_history_into_the_next_exchange() {
    let client = Arc::new(ScriptedClient::new(vec![
        text_response("first reply"),
        text_response("second reply"),
    ]));
    let (base, _state) =
        spawn_gateway(client.clone(), Arc::new(NoopGatewayToolProvider)).await;

    post_chat(&base, "first question", "s1").await.text().await.expect("body");
    post_chat(&base, "second question", "s1").await.text().await.expect("body");

    let requests = client.requests_seen.lock().expect("lock");
    assert_eq!(requests.len(), 2);
    let second = &requests[1];
    let texts = second
        .messages
        .iter()
        .map(Message::text_content)
        .collect::<Vec<_>>();
    assert!(texts.iter().any(|text| text == "first question"));
    assert!(texts.iter().any(|text| text == "first reply"));
    assert!(texts.iter().any(|text| text == "second question"));
}
