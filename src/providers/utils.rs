//! Shared translation between the canonical message model and the
//! OpenAI-compatible wire dialect spoken by Groq, Mistral and OpenRouter,
//! plus the HTTP status mapping all of them use.

use std::time::Duration;

use lazy_static::lazy_static;
use regex::Regex;
use reqwest::StatusCode;
use serde_json::{json, Value};

use crate::errors::ProviderError;
use crate::models::content::ImageContent;
use crate::models::message::{Message, Role};
use crate::models::tool::{ToolCall, ToolDefinition};
use crate::providers::base::{FinishReason, ProviderResponse, Usage};

lazy_static! {
    static ref INVALID_NAME_CHARS: Regex = Regex::new(r"[^a-zA-Z0-9_-]").unwrap();
}

/// Convert canonical messages to the OpenAI message specification.
///
/// Image parts are dropped when `include_images` is false (text-only
/// backends reject multimodal content arrays). Tool-role messages become
/// `role: tool` entries carrying their `tool_call_id`; assistant echoes of
/// requested calls become `tool_calls` arrays with stringified arguments.
pub fn messages_to_openai_spec(messages: &[Message], include_images: bool) -> Vec<Value> {
    let mut messages_spec = Vec::new();

    for message in messages {
        if message.role == Role::Tool {
            let mut converted = json!({
                "role": "tool",
                "content": message.text(),
            });
            if let Some(id) = &message.tool_call_id {
                converted["tool_call_id"] = json!(id);
            }
            if let Some(name) = &message.tool_name {
                converted["name"] = json!(name);
            }
            messages_spec.push(converted);
            continue;
        }

        let mut converted = json!({
            "role": message.role
        });

        let text = message.text();
        let images: Vec<&ImageContent> = message
            .content
            .iter()
            .filter_map(|content| content.as_image())
            .collect();

        if include_images && !images.is_empty() {
            let mut parts = Vec::new();
            if !text.is_empty() {
                parts.push(json!({"type": "text", "text": text}));
            }
            for image in images {
                parts.push(convert_image(image));
            }
            converted["content"] = json!(parts);
        } else if !text.is_empty() {
            converted["content"] = json!(text);
        }

        let tool_calls = message.tool_calls();
        if !tool_calls.is_empty() {
            let calls: Vec<Value> = tool_calls
                .iter()
                .map(|call| {
                    json!({
                        "id": call.id,
                        "type": "function",
                        "function": {
                            "name": sanitize_function_name(&call.name),
                            "arguments": call.arguments.to_string(),
                        }
                    })
                })
                .collect();
            converted["tool_calls"] = json!(calls);
        }

        if converted.get("content").is_some() || converted.get("tool_calls").is_some() {
            messages_spec.push(converted);
        }
    }

    messages_spec
}

/// Encode an image part as an OpenAI data-url image block.
pub fn convert_image(image: &ImageContent) -> Value {
    json!({
        "type": "image_url",
        "image_url": {
            "url": format!("data:{};base64,{}", image.mime_type, image.data)
        }
    })
}

/// Convert the tool catalog to the OpenAI function-tool specification.
pub fn tools_to_openai_spec(tools: &[ToolDefinition]) -> Result<Vec<Value>, ProviderError> {
    let mut tool_names = std::collections::HashSet::new();
    let mut result = Vec::new();

    for tool in tools {
        if !tool_names.insert(&tool.name) {
            return Err(ProviderError::Api(format!(
                "Duplicate tool name: {}",
                tool.name
            )));
        }

        result.push(json!({
            "type": "function",
            "function": {
                "name": tool.name,
                "description": tool.description,
                "parameters": tool.input_schema,
            }
        }));
    }

    Ok(result)
}

/// Convert an OpenAI-compatible completion body to the canonical response.
pub fn openai_response_to_provider_response(
    response: Value,
) -> Result<ProviderResponse, ProviderError> {
    // Some backends report failures in a 200 body.
    if let Some(error) = response.get("error") {
        return Err(ProviderError::Api(format!("API error: {}", error)));
    }

    let message = &response["choices"][0]["message"];
    if message.is_null() {
        return Err(ProviderError::Api(format!(
            "Malformed completion response: {}",
            response
        )));
    }

    let text = message
        .get("content")
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string();

    let mut tool_calls = Vec::new();
    if let Some(calls) = message.get("tool_calls").and_then(|v| v.as_array()) {
        for call in calls {
            let id = call["id"].as_str().unwrap_or_default().to_string();
            let name = call["function"]["name"]
                .as_str()
                .unwrap_or_default()
                .to_string();
            let raw_arguments = call["function"]["arguments"].as_str().unwrap_or_default();

            // Arguments that fail to decode are kept as the raw string so the
            // agent loop can report them to the model instead of failing the
            // whole call.
            let arguments = serde_json::from_str::<Value>(raw_arguments)
                .unwrap_or_else(|_| Value::String(raw_arguments.to_string()));

            tool_calls.push(ToolCall::new(id, name, arguments));
        }
    }

    let finish_reason = match response["choices"][0]["finish_reason"].as_str() {
        Some("stop") => FinishReason::Stop,
        Some("length") => FinishReason::Length,
        Some("tool_calls") => FinishReason::ToolCalls,
        Some("error") => FinishReason::Error,
        _ if !tool_calls.is_empty() => FinishReason::ToolCalls,
        _ => FinishReason::Stop,
    };

    let usage = get_usage(&response);

    Ok(ProviderResponse {
        text,
        tool_calls,
        usage,
        finish_reason,
    })
}

/// Extract token usage from an OpenAI-compatible body. Missing counts stay
/// `None`; an absent block yields empty usage rather than an error.
pub fn get_usage(data: &Value) -> Usage {
    let usage = match data.get("usage") {
        Some(usage) => usage,
        None => return Usage::empty(),
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

/// Map an HTTP reply onto the provider error taxonomy: 429 becomes
/// `RateLimit` (honoring a `retry-after` header), 502/503 become
/// `Unavailable`, anything else non-OK becomes `Api`.
pub async fn handle_response(response: reqwest::Response) -> Result<Value, ProviderError> {
    let status = response.status();
    match status {
        StatusCode::OK => response
            .json()
            .await
            .map_err(|e| ProviderError::Api(format!("Invalid response body: {}", e))),
        StatusCode::TOO_MANY_REQUESTS => Err(ProviderError::RateLimit {
            retry_after: parse_retry_after(response.headers()),
        }),
        StatusCode::BAD_GATEWAY | StatusCode::SERVICE_UNAVAILABLE => Err(
            ProviderError::Unavailable(format!("Server error: {}", status)),
        ),
        _ => {
            let body = response.text().await.unwrap_or_default();
            Err(ProviderError::Api(format!(
                "Request failed: {}: {}",
                status, body
            )))
        }
    }
}

/// Map a transport-level send failure: timeouts and connection refusals are
/// `Unavailable` (the backend may come back), everything else is `Api`.
pub fn map_send_error(error: reqwest::Error) -> ProviderError {
    if error.is_timeout() || error.is_connect() {
        ProviderError::Unavailable(error.to_string())
    } else {
        ProviderError::Api(error.to_string())
    }
}

pub fn parse_retry_after(headers: &reqwest::header::HeaderMap) -> Option<Duration> {
    headers
        .get(reqwest::header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

fn sanitize_function_name(name: &str) -> String {
    INVALID_NAME_CHARS.replace_all(name, "_").to_string()
}
