//! Bedrock runtime client speaking the Anthropic messages surface.
//!
//! The service treats model invocation as an opaque collaborator: requests
//! are shaped into the messages payload, responses are parsed back into the
//! neutral [`ChatResponse`] model, and streaming deltas are forwarded when
//! the endpoint answers with `text/event-stream`. Failures are surfaced to
//! the caller unchanged; no retry is attempted here.

use futures_util::StreamExt;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::{
    AiError, ChatRequest, ChatResponse, ChatUsage, ContentBlock, LlmClient, Message, MessageRole,
    StreamDeltaHandler, ToolDefinition,
};
use async_trait::async_trait;

const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_MAX_TOKENS: u32 = 4_096;

#[derive(Debug, Clone)]
/// Connection settings for the Bedrock runtime endpoint.
pub struct BedrockConfig {
    pub api_base: String,
    pub api_key: String,
    pub request_timeout_ms: u64,
}

impl BedrockConfig {
    /// Derives the regional runtime base URL when no override is configured.
    pub fn api_base_for_region(region: &str) -> String {
        format!("https://bedrock-runtime.{region}.amazonaws.com/anthropic/v1")
    }
}

#[derive(Debug, Clone)]
/// Model client for an Anthropic-compatible messages endpoint.
pub struct BedrockModelClient {
    client: reqwest::Client,
    config: BedrockConfig,
}

impl BedrockModelClient {
    pub fn new(config: BedrockConfig) -> Result<Self, AiError> {
        if config.api_key.trim().is_empty() {
            return Err(AiError::MissingApiKey);
        }

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", config.api_key.trim()))
                .map_err(|e| AiError::InvalidResponse(format!("invalid API key header: {e}")))?,
        );
        headers.insert(
            "anthropic-version",
            HeaderValue::from_static(ANTHROPIC_VERSION),
        );

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(std::time::Duration::from_millis(
                config.request_timeout_ms.max(1),
            ))
            .build()?;

        Ok(Self { client, config })
    }

    fn messages_url(&self) -> String {
        let base = self.config.api_base.trim_end_matches('/');
        if base.ends_with("/messages") {
            return base.to_string();
        }

        format!("{base}/messages")
    }

    async fn complete_with_mode(
        &self,
        request: ChatRequest,
        on_delta: Option<StreamDeltaHandler>,
    ) -> Result<ChatResponse, AiError> {
        let mut body = build_messages_request_body(&request);
        if on_delta.is_some() {
            body["stream"] = json!(true);
        }

        let response = self
            .client
            .post(self.messages_url())
            .json(&body)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let raw = response.text().await?;
            return Err(AiError::HttpStatus {
                status: status.as_u16(),
                body: raw,
            });
        }

        if let Some(delta_handler) = on_delta {
            let is_event_stream = response
                .headers()
                .get(CONTENT_TYPE)
                .and_then(|value| value.to_str().ok())
                .map(|value| value.to_ascii_lowercase().contains("text/event-stream"))
                .unwrap_or(false);
            if is_event_stream {
                return parse_messages_stream_response(response, delta_handler).await;
            }

            let raw = response.text().await?;
            let parsed = parse_messages_response(&raw)?;
            let text = parsed.message.text_content();
            if !text.is_empty() {
                delta_handler(text);
            }
            return Ok(parsed);
        }

        let raw = response.text().await?;
        parse_messages_response(&raw)
    }
}

#[async_trait]
impl LlmClient for BedrockModelClient {
    async fn complete(&self, request: ChatRequest) -> Result<ChatResponse, AiError> {
        self.complete_with_mode(request, None).await
    }

    async fn complete_with_stream(
        &self,
        request: ChatRequest,
        on_delta: Option<StreamDeltaHandler>,
    ) -> Result<ChatResponse, AiError> {
        self.complete_with_mode(request, on_delta).await
    }
}

fn build_messages_request_body(request: &ChatRequest) -> Value {
    let system = extract_system_text(&request.messages);
    let messages = to_messages_payload(&request.messages);

    let mut body = json!({
        "model": request.model,
        "messages": messages,
        "max_tokens": request.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
    });

    if !system.is_empty() {
        body["system"] = json!(system);
    }

    if !request.tools.is_empty() {
        body["tools"] = to_tools_payload(&request.tools);
    }

    if let Some(temperature) = request.temperature {
        body["temperature"] = json!(temperature);
    }

    body
}

fn extract_system_text(messages: &[Message]) -> String {
    messages
        .iter()
        .filter(|message| message.role == MessageRole::System)
        .map(Message::text_content)
        .filter(|text| !text.trim().is_empty())
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn to_tools_payload(tools: &[ToolDefinition]) -> Value {
    Value::Array(
        tools
            .iter()
            .map(|tool| {
                json!({
                    "name": tool.name,
                    "description": tool.description,
                    "input_schema": tool.parameters,
                })
            })
            .collect(),
    )
}

fn to_messages_payload(messages: &[Message]) -> Value {
    Value::Array(
        messages
            .iter()
            .filter_map(|message| match message.role {
                MessageRole::System => None,
                MessageRole::User => {
                    let parts = to_content_parts(message, false);
                    if parts.is_empty() {
                        None
                    } else {
                        Some(json!({ "role": "user", "content": parts }))
                    }
                }
                MessageRole::Assistant => {
                    let parts = to_content_parts(message, true);
                    if parts.is_empty() {
                        None
                    } else {
                        Some(json!({ "role": "assistant", "content": parts }))
                    }
                }
                MessageRole::Tool => {
                    if let Some(tool_call_id) = message.tool_call_id.as_deref() {
                        Some(json!({
                            "role": "user",
                            "content": [{
                                "type": "tool_result",
                                "tool_use_id": tool_call_id,
                                "content": message.text_content(),
                                "is_error": message.is_error,
                            }]
                        }))
                    } else {
                        Some(json!({
                            "role": "user",
                            "content": [{
                                "type": "text",
                                "text": "invalid tool result message: missing tool_call_id",
                            }]
                        }))
                    }
                }
            })
            .collect(),
    )
}

fn to_content_parts(message: &Message, allow_tool_calls: bool) -> Vec<Value> {
    let mut parts = Vec::new();
    for block in &message.content {
        match block {
            ContentBlock::Text { text } => {
                if !text.trim().is_empty() {
                    parts.push(json!({ "type": "text", "text": text }));
                }
            }
            ContentBlock::ToolCall {
                id,
                name,
                arguments,
            } if allow_tool_calls => {
                parts.push(json!({
                    "type": "tool_use",
                    "id": id,
                    "name": name,
                    "input": arguments,
                }));
            }
            ContentBlock::ToolCall { .. } => {}
        }
    }

    parts
}

fn parse_messages_response(raw: &str) -> Result<ChatResponse, AiError> {
    let parsed: MessagesResponse = serde_json::from_str(raw)?;

    let mut blocks = Vec::new();
    for part in parsed.content {
        match part {
            MessagesContent::Text { text } => {
                if !text.trim().is_empty() {
                    blocks.push(ContentBlock::Text { text });
                }
            }
            MessagesContent::ToolUse { id, name, input } => {
                blocks.push(ContentBlock::ToolCall {
                    id,
                    name,
                    arguments: input,
                });
            }
            MessagesContent::Other => {}
        }
    }

    let usage = parsed
        .usage
        .map(|usage| ChatUsage {
            input_tokens: usage.input_tokens,
            output_tokens: usage.output_tokens,
            total_tokens: usage.input_tokens + usage.output_tokens,
        })
        .unwrap_or_default();

    Ok(ChatResponse {
        message: Message::assistant_blocks(blocks),
        finish_reason: parsed.stop_reason,
        usage,
    })
}

async fn parse_messages_stream_response(
    response: reqwest::Response,
    on_delta: StreamDeltaHandler,
) -> Result<ChatResponse, AiError> {
    let mut stream = response.bytes_stream();
    let mut line_buffer = String::new();
    let mut current_data = String::new();

    let mut text = String::new();
    let mut tool_calls: Vec<ToolUseAccumulator> = Vec::new();
    let mut finish_reason = None;
    let mut usage = ChatUsage::default();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        let fragment = std::str::from_utf8(chunk.as_ref()).map_err(|error| {
            AiError::InvalidResponse(format!("invalid UTF-8 in streaming response: {error}"))
        })?;
        line_buffer.push_str(fragment);

        while let Some(pos) = line_buffer.find('\n') {
            let line = line_buffer[..pos].trim_end_matches('\r').to_string();
            line_buffer.drain(..=pos);

            if line.is_empty() {
                apply_stream_event(
                    current_data.trim(),
                    &on_delta,
                    &mut text,
                    &mut tool_calls,
                    &mut finish_reason,
                    &mut usage,
                )?;
                current_data.clear();
                continue;
            }

            if line.starts_with("event:") {
                continue;
            }

            if let Some(data) = line.strip_prefix("data:") {
                if !current_data.is_empty() {
                    current_data.push('\n');
                }
                current_data.push_str(data.trim());
            }
        }
    }

    if !current_data.trim().is_empty() {
        apply_stream_event(
            current_data.trim(),
            &on_delta,
            &mut text,
            &mut tool_calls,
            &mut finish_reason,
            &mut usage,
        )?;
    }

    Ok(finalize_stream_response(text, tool_calls, finish_reason, usage))
}

fn apply_stream_event(
    data: &str,
    on_delta: &StreamDeltaHandler,
    text: &mut String,
    tool_calls: &mut Vec<ToolUseAccumulator>,
    finish_reason: &mut Option<String>,
    usage: &mut ChatUsage,
) -> Result<(), AiError> {
    if data.is_empty() {
        return Ok(());
    }

    let payload: Value = serde_json::from_str(data)
        .map_err(|error| AiError::InvalidResponse(format!("failed to parse stream chunk: {error}")))?;
    let payload_type = payload
        .get("type")
        .and_then(Value::as_str)
        .unwrap_or_default();

    if payload_type == "error" {
        let error_message = payload
            .get("error")
            .and_then(Value::as_object)
            .and_then(|error| error.get("message"))
            .and_then(Value::as_str)
            .unwrap_or("model stream returned error event");
        return Err(AiError::InvalidResponse(error_message.to_string()));
    }

    match payload_type {
        "message_start" => {
            if let Some(input_tokens) = payload
                .get("message")
                .and_then(Value::as_object)
                .and_then(|message| message.get("usage"))
                .and_then(Value::as_object)
                .and_then(|usage| usage.get("input_tokens"))
                .and_then(Value::as_u64)
            {
                usage.input_tokens = input_tokens;
                usage.total_tokens = usage.input_tokens + usage.output_tokens;
            }
        }
        "content_block_start" => {
            let Some(index) = payload.get("index").and_then(Value::as_u64) else {
                return Ok(());
            };
            let index = index as usize;
            if tool_calls.len() <= index {
                tool_calls.resize_with(index + 1, ToolUseAccumulator::default);
            }

            let block = payload
                .get("content_block")
                .and_then(Value::as_object)
                .cloned()
                .unwrap_or_default();
            if block.get("type").and_then(Value::as_str) == Some("tool_use") {
                if let Some(id) = block.get("id").and_then(Value::as_str) {
                    tool_calls[index].id = id.to_string();
                }
                if let Some(name) = block.get("name").and_then(Value::as_str) {
                    tool_calls[index].name = name.to_string();
                }
                if let Some(input) = block.get("input") {
                    if !input.is_null() && input != &json!({}) {
                        tool_calls[index].input = Some(input.clone());
                    }
                }
            }
        }
        "content_block_delta" => {
            let index = payload
                .get("index")
                .and_then(Value::as_u64)
                .map(|value| value as usize)
                .unwrap_or(0);
            if tool_calls.len() <= index {
                tool_calls.resize_with(index + 1, ToolUseAccumulator::default);
            }

            let delta = payload
                .get("delta")
                .and_then(Value::as_object)
                .cloned()
                .unwrap_or_default();
            match delta
                .get("type")
                .and_then(Value::as_str)
                .unwrap_or_default()
            {
                "text_delta" => {
                    if let Some(delta_text) = delta.get("text").and_then(Value::as_str) {
                        if !delta_text.is_empty() {
                            text.push_str(delta_text);
                            on_delta(delta_text.to_string());
                        }
                    }
                }
                "input_json_delta" => {
                    if let Some(partial_json) = delta.get("partial_json").and_then(Value::as_str) {
                        tool_calls[index].partial_json.push_str(partial_json);
                    }
                }
                _ => {}
            }
        }
        "message_delta" => {
            if let Some(reason) = payload
                .get("delta")
                .and_then(Value::as_object)
                .and_then(|delta| delta.get("stop_reason"))
                .and_then(Value::as_str)
            {
                *finish_reason = Some(reason.to_string());
            }

            if let Some(output_tokens) = payload
                .get("usage")
                .and_then(Value::as_object)
                .and_then(|usage| usage.get("output_tokens"))
                .and_then(Value::as_u64)
            {
                usage.output_tokens = output_tokens;
                usage.total_tokens = usage.input_tokens + usage.output_tokens;
            }
        }
        _ => {}
    }

    Ok(())
}

fn finalize_stream_response(
    text: String,
    tool_calls: Vec<ToolUseAccumulator>,
    finish_reason: Option<String>,
    usage: ChatUsage,
) -> ChatResponse {
    let mut blocks = Vec::new();
    if !text.trim().is_empty() {
        blocks.push(ContentBlock::Text { text });
    }

    for (index, tool_call) in tool_calls.into_iter().enumerate() {
        if tool_call.name.trim().is_empty() {
            continue;
        }

        let id = if tool_call.id.trim().is_empty() {
            format!("bedrock_tool_{}", index + 1)
        } else {
            tool_call.id
        };
        let arguments = if let Some(input) = tool_call.input {
            input
        } else if !tool_call.partial_json.trim().is_empty() {
            match serde_json::from_str::<Value>(&tool_call.partial_json) {
                Ok(value) => value,
                Err(_) => Value::String(tool_call.partial_json),
            }
        } else {
            json!({})
        };

        blocks.push(ContentBlock::ToolCall {
            id,
            name: tool_call.name,
            arguments,
        });
    }

    ChatResponse {
        message: Message::assistant_blocks(blocks),
        finish_reason,
        usage,
    }
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<MessagesContent>,
    stop_reason: Option<String>,
    usage: Option<MessagesUsage>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum MessagesContent {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "tool_use")]
    ToolUse {
        id: String,
        name: String,
        input: Value,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct MessagesUsage {
    input_tokens: u64,
    output_tokens: u64,
}

#[derive(Debug, Default)]
struct ToolUseAccumulator {
    id: String,
    name: String,
    input: Option<Value>,
    partial_json: String,
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use httpmock::prelude::*;
    use serde_json::json;

    use super::{
        build_messages_request_body, finalize_stream_response, parse_messages_response,
        BedrockConfig, BedrockModelClient,
    };
    use crate::{ChatRequest, ContentBlock, LlmClient, Message, StreamDeltaHandler, ToolDefinition};

    fn request_with_tools() -> ChatRequest {
        ChatRequest {
            model: "anthropic.claude-sonnet-4-5".to_string(),
            messages: vec![
                Message::system("You are a coding assistant"),
                Message::user("List my repos"),
                Message::assistant_blocks(vec![ContentBlock::ToolCall {
                    id: "toolu_1".to_string(),
                    name: "list_repos".to_string(),
                    arguments: json!({ "limit": 5 }),
                }]),
                Message::tool_result("toolu_1", "list_repos", "[]", false),
            ],
            tools: vec![ToolDefinition {
                name: "list_repos".to_string(),
                description: "List repositories".to_string(),
                parameters: json!({ "type": "object" }),
            }],
            max_tokens: Some(512),
            temperature: Some(0.0),
        }
    }

    #[test]
    fn serializes_tool_messages() {
        let body = build_messages_request_body(&request_with_tools());

        assert_eq!(body["system"], "You are a coding assistant");
        assert_eq!(body["messages"][1]["content"][0]["type"], "tool_use");
        assert_eq!(body["messages"][2]["content"][0]["type"], "tool_result");
        assert_eq!(body["tools"][0]["name"], "list_repos");
        assert_eq!(body["max_tokens"], 512);
    }

    #[test]
    fn parses_tool_use_response() {
        let raw = json!({
            "content": [
                { "type": "text", "text": "Looking that up." },
                {
                    "type": "tool_use",
                    "id": "toolu_9",
                    "name": "get_repo",
                    "input": { "repo_full_name": "octo/hello" }
                }
            ],
            "stop_reason": "tool_use",
            "usage": { "input_tokens": 12, "output_tokens": 7 }
        })
        .to_string();

        let parsed = parse_messages_response(&raw).expect("parse");
        assert_eq!(parsed.finish_reason.as_deref(), Some("tool_use"));
        assert_eq!(parsed.usage.total_tokens, 19);
        let calls = parsed.message.tool_calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].name, "get_repo");
    }

    #[test]
    fn finalizes_partial_json_tool_arguments() {
        let accumulator = super::ToolUseAccumulator {
            id: "toolu_2".to_string(),
            name: "create_issue".to_string(),
            input: None,
            partial_json: "{\"title\":\"bug\"}".to_string(),
        };

        let response = finalize_stream_response(String::new(), vec![accumulator], None, Default::default());
        let calls = response.message.tool_calls();
        assert_eq!(calls[0].arguments, json!({ "title": "bug" }));
    }

    #[tokio::test]
    async fn streams_text_deltas_from_event_stream() {
        let server = MockServer::start();
        let sse_body = concat!(
            "event: message_start\n",
            "data: {\"type\":\"message_start\",\"message\":{\"usage\":{\"input_tokens\":4}}}\n\n",
            "event: content_block_delta\n",
            "data: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"text_delta\",\"text\":\"Hel\"}}\n\n",
            "event: content_block_delta\n",
            "data: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"text_delta\",\"text\":\"lo\"}}\n\n",
            "event: message_delta\n",
            "data: {\"type\":\"message_delta\",\"delta\":{\"stop_reason\":\"end_turn\"},\"usage\":{\"output_tokens\":2}}\n\n",
        );
        let mock = server
            .mock(|when, then| {
                when.method(POST).path("/messages");
                then.status(200)
                    .header("content-type", "text/event-stream")
                    .body(sse_body);
            });

        let client = BedrockModelClient::new(BedrockConfig {
            api_base: server.base_url(),
            api_key: "test-key".to_string(),
            request_timeout_ms: 5_000,
        })
        .expect("client");

        let deltas = Arc::new(Mutex::new(Vec::new()));
        let handler: StreamDeltaHandler = {
            let deltas = deltas.clone();
            Arc::new(move |delta| deltas.lock().expect("lock").push(delta))
        };

        let response = client
            .complete_with_stream(request_with_tools(), Some(handler))
            .await
            .expect("stream");

        mock.assert();
        assert_eq!(response.message.text_content(), "Hello");
        assert_eq!(response.finish_reason.as_deref(), Some("end_turn"));
        assert_eq!(response.usage.total_tokens, 6);
        assert_eq!(deltas.lock().expect("lock").join(""), "Hello");
    }

    #[tokio::test]
    async fn surfaces_http_status_errors() {
        let server = MockServer::start();
        server
            .mock(|when, then| {
                when.method(POST).path("/messages");
                then.status(429).body("throttled");
            });

        let client = BedrockModelClient::new(BedrockConfig {
            api_base: server.base_url(),
            api_key: "test-key".to_string(),
            request_timeout_ms: 5_000,
        })
        .expect("client");

        let error = client.complete(request_with_tools()).await.expect_err("error");
        match error {
            crate::AiError::HttpStatus { status, body } => {
                assert_eq!(status, 429);
                assert_eq!(body, "throttled");
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
