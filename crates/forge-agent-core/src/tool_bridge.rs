//! Tool-bridge helpers for argument validation and tool execution.

use std::{sync::Arc, time::Duration};

use forge_ai::{ToolCall, ToolDefinition};
use jsonschema::validator_for;
use serde_json::{json, Value};

use crate::{AgentTool, ToolExecutionResult};

pub(crate) async fn execute_tool_call(
    call: &ToolCall,
    registered: Option<(ToolDefinition, Arc<dyn AgentTool>)>,
    tool_timeout: Option<Duration>,
) -> ToolExecutionResult {
    let Some((definition, tool)) = registered else {
        return ToolExecutionResult::error(json!({
            "error": format!("tool '{}' is not registered", call.name)
        }));
    };

    if let Err(error) = validate_tool_arguments(&definition, &call.arguments) {
        return ToolExecutionResult::error(json!({ "error": error }));
    }

    if let Some(timeout) = tool_timeout {
        match tokio::time::timeout(timeout, tool.execute(call.arguments.clone())).await {
            Ok(result) => result,
            Err(_) => ToolExecutionResult::error(json!({
                "error": format!(
                    "tool '{}' timed out after {}ms",
                    definition.name,
                    timeout.as_millis()
                )
            })),
        }
    } else {
        tool.execute(call.arguments.clone()).await
    }
}

pub(crate) fn validate_tool_arguments(
    definition: &ToolDefinition,
    arguments: &Value,
) -> Result<(), String> {
    let validator = validator_for(&definition.parameters)
        .map_err(|error| format!("invalid JSON schema for '{}': {error}", definition.name))?;

    let mut errors = validator.iter_errors(arguments);
    if let Some(first) = errors.next() {
        return Err(format!(
            "invalid arguments for '{}': {}",
            definition.name, first
        ));
    }

    Ok(())
}
