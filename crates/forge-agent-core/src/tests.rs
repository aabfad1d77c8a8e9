//! Agent loop tests with a scripted model client.
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use forge_ai::{
    AiError, ChatRequest, ChatResponse, ChatUsage, ContentBlock, LlmClient, Message,
    StreamDeltaHandler, ToolDefinition,
};
use serde_json::{json, Value};

use super::{Agent, AgentConfig, AgentError, AgentEvent, AgentTool, ToolExecutionResult};

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
}

fn text_response(text: &str) -> ChatResponse {
    ChatResponse {
        message: Message::assistant_text(text),
        finish_reason: Some("end_turn".to_string()),
        usage: ChatUsage {
            input_tokens: 10,
            output_tokens: 5,
            total_tokens: 15,
        },
    }
}

fn tool_call_response(id: &str, name: &str, arguments: Value) -> ChatResponse {
    ChatResponse {
        message: Message::assistant_blocks(vec![ContentBlock::ToolCall {
            id: id.to_string(),
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
            parameters: json!({
                "type": "object",
                "properties": {
                    "message": { "type": "string" }
                },
                "required": ["message"]
            }),
        }
    }

    async fn execute(&self, arguments: Value) -> ToolExecutionResult {
        ToolExecutionResult::ok(arguments)
    }
}

#[tokio::test]
async fn completes_tool_round_trip() {
    let client = Arc::new(ScriptedClient::new(vec![
        tool_call_response("call_1", "echo", json!({ "message": "hi" })),
        text_response("done"),
    ]));
    let mut agent = Agent::new(
        client.clone(),
        AgentConfig {
            system_prompt: "assist".to_string(),
            ..AgentConfig::default()
        },
    );
    agent.register_tool(EchoTool);

    let new_messages = agent.prompt("use echo").await.expect("prompt");

    // user, assistant tool call, tool result, final assistant
    assert_eq!(new_messages.len(), 4);
    let tool_message = &new_messages[2];
    assert_eq!(tool_message.tool_call_id.as_deref(), Some("call_1"));
    assert!(!tool_message.is_error);
    assert_eq!(new_messages[3].text_content(), "done");

    let requests = client.requests_seen.lock().expect("lock");
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0].tools.len(), 1);
}

#[tokio::test]
async fn rejects_invalid_tool_arguments_as_error_result() {
    let client = Arc::new(ScriptedClient::new(vec![
        tool_call_response("call_1", "echo", json!({ "message": 42 })),
        text_response("recovered"),
    ]));
    let mut agent = Agent::new(client, AgentConfig::default());
    agent.register_tool(EchoTool);

    let new_messages = agent.prompt("use echo badly").await.expect("prompt");
    let tool_message = &new_messages[2];
    assert!(tool_message.is_error);
    assert!(tool_message.text_content().contains("invalid arguments"));
}

#[tokio::test]
async fn reports_unregistered_tool() {
    let client = Arc::new(ScriptedClient::new(vec![
        tool_call_response("call_1", "missing", json!({})),
        text_response("ok"),
    ]));
    let mut agent = Agent::new(client, AgentConfig::default());

    let new_messages = agent.prompt("call something").await.expect("prompt");
    let tool_message = &new_messages[2];
    assert!(tool_message.is_error);
    assert!(tool_message.text_content().contains("not registered"));
}

#[tokio::test]
async fn exceeding_max_turns_fails() {
    let client = Arc::new(ScriptedClient::new(vec![
        tool_call_response("call_1", "echo", json!({ "message": "a" })),
        tool_call_response("call_2", "echo", json!({ "message": "b" })),
    ]));
    let mut agent = Agent::new(
        client,
        AgentConfig {
            max_turns: 2,
            ..AgentConfig::default()
        },
    );
    agent.register_tool(EchoTool);

    let error = agent.prompt("loop forever").await.expect_err("must fail");
    assert!(matches!(error, AgentError::MaxTurnsExceeded(2)));
}

#[tokio::test]
async fn emits_tool_events_in_order() {
    let client = Arc::new(ScriptedClient::new(vec![
        tool_call_response("call_1", "echo", json!({ "message": "hi" })),
        text_response("done"),
    ]));
    let mut agent = Agent::new(client, AgentConfig::default());
    agent.register_tool(EchoTool);

    let seen = Arc::new(Mutex::new(Vec::new()));
    agent.subscribe({
        let seen = seen.clone();
        move |event| {
            let label = match event {
                AgentEvent::AgentStart => "agent_start",
                AgentEvent::AgentEnd { .. } => "agent_end",
                AgentEvent::TurnStart { .. } => "turn_start",
                AgentEvent::TurnEnd { .. } => "turn_end",
                AgentEvent::MessageAdded { .. } => "message",
                AgentEvent::ToolExecutionStart { .. } => "tool_start",
                AgentEvent::ToolExecutionEnd { .. } => "tool_end",
            };
            seen.lock().expect("lock").push(label);
        }
    });

    agent.prompt("use echo").await.expect("prompt");

    let seen = seen.lock().expect("lock");
    let tool_start = seen.iter().position(|label| *label == "tool_start");
    let tool_end = seen.iter().position(|label| *label == "tool_end");
    assert!(tool_start.expect("tool_start") < tool_end.expect("tool_end"));
    assert_eq!(seen.first().copied(), Some("message"));
    assert_eq!(seen.last().copied(), Some("agent_end"));
}

#[tokio::test]
async fn streams_deltas_through_client() {
    struct StreamingClient;

    #[async_trait]
    impl LlmClient for StreamingClient {
        async fn complete(&self, _request: ChatRequest) -> Result<ChatResponse, AiError> {
            Ok(text_response("full"))
        }

        async fn complete_with_stream(
            &self,
            _request: ChatRequest,
            on_delta: Option<StreamDeltaHandler>,
        ) -> Result<ChatResponse, AiError> {
            if let Some(on_delta) = on_delta {
                on_delta("fu".to_string());
                on_delta("ll".to_string());
            }
            Ok(text_response("full"))
        }
    }

    let mut agent = Agent::new(Arc::new(StreamingClient), AgentConfig::default());
    let deltas = Arc::new(Mutex::new(String::new()));
    let handler: StreamDeltaHandler = {
        let deltas = deltas.clone();
        Arc::new(move |delta| deltas.lock().expect("lock").push_str(&delta))
    };

    agent
        .prompt_with_stream("hello", Some(handler))
        .await
        .expect("prompt");

    assert_eq!(deltas.lock().expect("lock").as_str(), "full");
}
