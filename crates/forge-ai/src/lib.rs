//! Model client abstraction for the Forge coding agent.
mod bedrock;
mod types;

pub use bedrock::{BedrockConfig, BedrockModelClient};
pub use types::{
    AiError, ChatRequest, ChatResponse, ChatUsage, ContentBlock, LlmClient, Message, MessageRole,
    StreamDeltaHandler, ToolCall, ToolDefinition,
};
