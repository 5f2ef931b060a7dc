//! Google Gemini adapter. Speaks the native `generateContent` dialect:
//! contents/parts instead of chat messages, `functionCall`/`functionResponse`
//! turns instead of tool-call ids, and a built-in `google_search` grounding
//! tool for web-search requests.
//!
//! Two quirks handled here rather than upstream: Gemini rejects consecutive
//! same-role turns, so adjacent entries are merged before sending; and its
//! wire carries no tool-call ids, so we synthesize uuids to keep the
//! canonical call/result pairing intact.

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use uuid::Uuid;

use super::base::{
    Capabilities, CompletionRequest, FinishReason, Provider, ProviderResponse, ToolChoice, Usage,
};
use super::configs::GeminiConfig;
use super::utils::{map_send_error, parse_retry_after};
use crate::errors::ProviderError;
use crate::models::message::{Message, Role};
use crate::models::tool::{ToolCall, ToolDefinition};

pub struct GeminiProvider {
    client: Client,
    config: GeminiConfig,
    capabilities: Capabilities,
}

impl GeminiProvider {
    pub fn new(config: GeminiConfig) -> Result<Self> {
        let client = Client::builder().timeout(config.timeout).build()?;

        Ok(Self {
            client,
            config,
            capabilities: Capabilities {
                chat: true,
                vision: true,
                tool_use: true,
                json_output: true,
                web_search: true,
                max_context_tokens: 1_048_576,
                max_output_tokens: 8_192,
            },
        })
    }

    fn build_payload(&self, request: &CompletionRequest, with_tools: bool) -> Value {
        let mut payload = json!({
            "contents": messages_to_gemini_spec(&request.messages),
        });
        let body = payload.as_object_mut().unwrap();

        if let Some(system) = &request.system {
            body.insert(
                "systemInstruction".to_string(),
                json!({"parts": [{"text": system}]}),
            );
        }

        let mut generation_config = serde_json::Map::new();
        if let Some(temperature) = request.temperature.or(self.config.temperature) {
            generation_config.insert("temperature".to_string(), json!(temperature));
        }
        if let Some(max_tokens) = request.max_tokens.or(self.config.max_tokens) {
            generation_config.insert("maxOutputTokens".to_string(), json!(max_tokens));
        }
        if request.json_output {
            generation_config.insert(
                "responseMimeType".to_string(),
                json!("application/json"),
            );
        }
        if !generation_config.is_empty() {
            body.insert(
                "generationConfig".to_string(),
                Value::Object(generation_config),
            );
        }

        if with_tools && !request.tools.is_empty() {
            body.insert(
                "tools".to_string(),
                json!([{"functionDeclarations": tools_to_gemini_spec(&request.tools)}]),
            );
            if let Some(tool_config) = tool_choice_to_gemini_spec(&request.tool_choice) {
                body.insert("toolConfig".to_string(), tool_config);
            }
        } else if request.web_search {
            // Grounding and function declarations are mutually exclusive on
            // this wire; declared tools take precedence.
            body.insert("tools".to_string(), json!([{"google_search": {}}]));
        }

        payload
    }

    async fn post(&self, payload: Value) -> Result<Value, ProviderError> {
        let api_key = self
            .config
            .api_key
            .as_deref()
            .ok_or_else(|| ProviderError::Api("Gemini API key is not configured".to_string()))?;

        let url = format!(
            "{}/v1beta/models/{}:generateContent?key={}",
            self.config.host.trim_end_matches('/'),
            self.config.model,
            api_key
        );

        let response = self
            .client
            .post(&url)
            .json(&payload)
            .send()
            .await
            .map_err(map_send_error)?;

        let status = response.status();
        match status {
            StatusCode::OK => response
                .json()
                .await
                .map_err(|e| ProviderError::Api(format!("Invalid response body: {}", e))),
            StatusCode::TOO_MANY_REQUESTS => {
                let header_hint = parse_retry_after(response.headers());
                let body: Value = response.json().await.unwrap_or_default();
                Err(ProviderError::RateLimit {
                    retry_after: header_hint.or_else(|| parse_retry_delay(&body)),
                })
            }
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
}

/// Convert canonical messages to Gemini contents, merging consecutive
/// same-role entries.
fn messages_to_gemini_spec(messages: &[Message]) -> Vec<Value> {
    let mut contents: Vec<(String, Vec<Value>)> = Vec::new();

    for message in messages {
        let (role, parts) = match message.role {
            Role::Tool => (
                "user".to_string(),
                vec![json!({
                    "functionResponse": {
                        "name": message.tool_name.as_deref().unwrap_or_default(),
                        "response": {"content": message.text()},
                    }
                })],
            ),
            role => {
                let gemini_role = match role {
                    Role::Assistant => "model",
                    // System instructions travel separately; a stray system
                    // turn degrades to user text.
                    _ => "user",
                };

                let mut parts = Vec::new();
                for content in &message.content {
                    if let Some(text) = content.as_text() {
                        parts.push(json!({"text": text}));
                    } else if let Some(image) = content.as_image() {
                        parts.push(json!({
                            "inlineData": {
                                "mimeType": image.mime_type,
                                "data": image.data,
                            }
                        }));
                    } else if let Some(call) = content.as_tool_call() {
                        parts.push(json!({
                            "functionCall": {
                                "name": call.name,
                                "args": call.arguments,
                            }
                        }));
                    }
                }
                (gemini_role.to_string(), parts)
            }
        };

        if parts.is_empty() {
            continue;
        }

        match contents.last_mut() {
            Some((last_role, last_parts)) if *last_role == role => last_parts.extend(parts),
            _ => contents.push((role, parts)),
        }
    }

    contents
        .into_iter()
        .map(|(role, parts)| json!({"role": role, "parts": parts}))
        .collect()
}

fn tools_to_gemini_spec(tools: &[ToolDefinition]) -> Vec<Value> {
    tools
        .iter()
        .map(|tool| {
            json!({
                "name": tool.name,
                "description": tool.description,
                "parameters": tool.input_schema,
            })
        })
        .collect()
}

fn tool_choice_to_gemini_spec(choice: &ToolChoice) -> Option<Value> {
    let config = match choice {
        ToolChoice::Auto => return None,
        ToolChoice::None => json!({"mode": "NONE"}),
        ToolChoice::Named(name) => json!({
            "mode": "ANY",
            "allowedFunctionNames": [name],
        }),
    };
    Some(json!({"functionCallingConfig": config}))
}

fn gemini_response_to_provider_response(
    response: Value,
) -> Result<ProviderResponse, ProviderError> {
    let candidate = &response["candidates"][0];
    if candidate.is_null() {
        return Err(ProviderError::Api(format!(
            "No candidates in response: {}",
            response
        )));
    }

    let mut text_parts = Vec::new();
    let mut tool_calls = Vec::new();
    if let Some(parts) = candidate["content"]["parts"].as_array() {
        for part in parts {
            if let Some(text) = part.get("text").and_then(Value::as_str) {
                text_parts.push(text.to_string());
            }
            if let Some(call) = part.get("functionCall") {
                let name = call["name"].as_str().unwrap_or_default().to_string();
                let arguments = call.get("args").cloned().unwrap_or_else(|| json!({}));
                // The wire carries no call ids; synthesize one so the
                // result message can still reference its call.
                tool_calls.push(ToolCall::new(Uuid::new_v4().to_string(), name, arguments));
            }
        }
    }

    let finish_reason = match candidate["finishReason"].as_str() {
        _ if !tool_calls.is_empty() => FinishReason::ToolCalls,
        Some("STOP") => FinishReason::Stop,
        Some("MAX_TOKENS") => FinishReason::Length,
        Some("SAFETY") | Some("RECITATION") => FinishReason::Error,
        _ => FinishReason::Stop,
    };

    let usage = get_usage(&response);
    let text = text_parts.join("");

    if text.is_empty() && tool_calls.is_empty() {
        return Err(ProviderError::Api(format!(
            "Empty candidate content: {}",
            response
        )));
    }

    Ok(ProviderResponse {
        text,
        tool_calls,
        usage,
        finish_reason,
    })
}

fn get_usage(response: &Value) -> Usage {
    let metadata = match response.get("usageMetadata") {
        Some(metadata) => metadata,
        None => return Usage::empty(),
    };

    let read = |key: &str| metadata.get(key).and_then(Value::as_i64).map(|v| v as i32);
    Usage::new(
        read("promptTokenCount"),
        read("candidatesTokenCount"),
        read("totalTokenCount"),
    )
}

/// Pull the `retryDelay` hint (e.g. `"22s"`) out of a RESOURCE_EXHAUSTED
/// error body.
fn parse_retry_delay(body: &Value) -> Option<Duration> {
    let details = body["error"]["details"].as_array()?;
    details
        .iter()
        .filter_map(|detail| detail.get("retryDelay").and_then(Value::as_str))
        .filter_map(|delay| delay.trim_end_matches('s').parse::<u64>().ok())
        .map(Duration::from_secs)
        .next()
}

#[async_trait]
impl Provider for GeminiProvider {
    fn name(&self) -> &str {
        "gemini"
    }

    fn display_name(&self) -> &str {
        "Google Gemini"
    }

    fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    fn is_available(&self) -> bool {
        self.config.api_key.is_some()
    }

    async fn chat(
        &self,
        request: &CompletionRequest,
    ) -> Result<ProviderResponse, ProviderError> {
        let payload = self.build_payload(request, false);
        let response = self.post(payload).await?;
        gemini_response_to_provider_response(response)
    }

    async fn chat_with_tools(
        &self,
        request: &CompletionRequest,
    ) -> Result<ProviderResponse, ProviderError> {
        self.ensure_tool_support()?;
        let payload = self.build_payload(request, true);
        let response = self.post(payload).await?;
        gemini_response_to_provider_response(response)
    }
}
