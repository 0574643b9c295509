use anyhow::{anyhow, Result};
use serde_json::{json, Value};

use super::base::Usage;
use crate::models::message::Message;
use crate::models::response::ModelResponse;
use crate::models::role::Role;
use crate::models::tool::{Tool, ToolCall};

/// Convert internal Message format to OpenAI's API message specification
///
/// Each message becomes one `{role, content}` entry with the text of its parts joined by a
/// space. Parts without text are sent as their JSON payload. Empty messages are dropped.
pub fn messages_to_openai_spec(messages: &[Message]) -> Vec<Value> {
    let mut messages_spec = Vec::new();

    for message in messages {
        let parts: Vec<String> = message
            .content
            .iter()
            .filter_map(|part| {
                if !part.text.is_empty() {
                    Some(part.text.clone())
                } else {
                    part.payload.as_ref().map(|payload| payload.to_string())
                }
            })
            .collect();
        if parts.is_empty() {
            continue;
        }

        let mut converted = json!({
            "role": message.role,
            "content": parts.join(" "),
        });
        if message.role == Role::Tool {
            if let Some(name) = &message.author_name {
                converted["name"] = json!(name);
            }
        }
        messages_spec.push(converted);
    }

    messages_spec
}

/// Convert internal Tool format to OpenAI's API tool specification
pub fn tools_to_openai_spec(tools: &[Tool]) -> Result<Vec<Value>> {
    let mut tool_names = std::collections::HashSet::new();
    let mut result = Vec::new();

    for tool in tools {
        if !tool_names.insert(&tool.name) {
            return Err(anyhow!("Duplicate tool name: {}", tool.name));
        }

        result.push(json!({
            "type": "function",
            "function": {
                "name": tool.name,
                "description": tool.description,
                "parameters": tool.parameters,
            }
        }));
    }

    Ok(result)
}

/// Convert OpenAI's API response to the envelope the parser reads
pub fn openai_response_to_model_response(response: &Value) -> Result<ModelResponse> {
    let choice = response
        .get("choices")
        .and_then(|choices| choices.get(0))
        .ok_or_else(|| anyhow!("No response from model"))?;
    let original = &choice["message"];

    let content = original["content"].as_str().map(String::from);
    let reasoning = original["reasoning_content"]
        .as_str()
        .or_else(|| original["reasoning"].as_str())
        .map(String::from);

    let mut tool_calls = Vec::new();
    if let Some(calls) = original["tool_calls"].as_array() {
        for call in calls {
            let id = call["id"].as_str().unwrap_or_default();
            let name = call["function"]["name"].as_str().unwrap_or_default();
            let arguments = match &call["function"]["arguments"] {
                Value::Null => json!("{}"),
                arguments => arguments.clone(),
            };
            tool_calls.push(ToolCall::new(id, name, arguments));
        }
    }

    Ok(ModelResponse {
        content,
        reasoning,
        tool_calls,
        finish_reason: choice["finish_reason"].as_str().map(String::from),
    })
}

/// Token usage, if the server reported it
pub fn get_usage(data: &Value) -> Usage {
    let Some(usage) = data.get("usage") else {
        return Usage::default();
    };

    let input_tokens = usage
        .get("prompt_tokens")
        .and_then(|v| v.as_i64())
        .map(|v| v as i32);

    let output_tokens = usage
        .get("completion_tokens")
        .and_then(|v| v.as_i64())
        .map(|v| v as i32);

    let total_tokens = usage
        .get("total_tokens")
        .and_then(|v| v.as_i64())
        .map(|v| v as i32)
        .or_else(|| match (input_tokens, output_tokens) {
            (Some(input), Some(output)) => Some(input + output),
            _ => None,
        });

    Usage::new(input_tokens, output_tokens, total_tokens)
}

#[derive(Debug, thiserror::Error)]
#[error("Context length exceeded. Message: {0}")]
pub struct ContextLengthExceededError(String);

pub fn check_openai_context_length_error(error: &Value) -> Option<ContextLengthExceededError> {
    let code = error.get("code")?.as_str()?;
    if code == "context_length_exceeded" || code == "string_above_max_length" {
        let message = error
            .get("message")
            .and_then(|m| m.as_str())
            .unwrap_or("Unknown error")
            .to_string();
        Some(ContextLengthExceededError(message))
    } else {
        None
    }
}
