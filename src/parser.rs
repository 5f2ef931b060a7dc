//! Tolerant parsing of the model's structured reply.
//!
//! The system prompt asks for `{response, classification, stateChanges[]}`,
//! but models drift: fenced JSON, missing fields, or plain prose. Parsing
//! always degrades to the raw text instead of failing the request.

use serde_json::Value;
use std::str::FromStr;
use strum_macros::{Display, EnumString};

/// What the user was trying to do, as judged by the model. Distinct from the
/// routing category: this describes intent, not which backend to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, serde::Serialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    Capture,
    Task,
    Question,
    ContentConnect,
    Update,
}

/// A state mutation the model proposes for the external state collaborator.
/// The payload is opaque to this crate.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct StateChange {
    pub kind: String,
    pub payload: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedReply {
    pub response: String,
    pub intent: Intent,
    pub state_changes: Vec<StateChange>,
}

/// Parse a model reply. Total: any input yields a usable reply.
pub fn parse_structured(raw: &str) -> ParsedReply {
    let trimmed = raw.trim();
    let stripped = strip_code_fence(trimmed);

    let fallback = || ParsedReply {
        response: trimmed.to_string(),
        intent: Intent::Question,
        state_changes: Vec::new(),
    };

    let decoded: Value = match serde_json::from_str(stripped) {
        Ok(value) => value,
        Err(_) => return fallback(),
    };
    let object = match decoded.as_object() {
        Some(object) => object,
        None => return fallback(),
    };

    let response = match object.get("response").and_then(Value::as_str) {
        Some(text) if !text.trim().is_empty() => text.to_string(),
        // Valid JSON but no usable response field: keep the raw text rather
        // than synthesizing an empty reply.
        _ => trimmed.to_string(),
    };

    let intent = object
        .get("classification")
        .and_then(Value::as_str)
        .and_then(|value| Intent::from_str(value).ok())
        .unwrap_or(Intent::Question);

    let state_changes = parse_state_changes(object.get("stateChanges"));

    ParsedReply {
        response,
        intent,
        state_changes,
    }
}

/// Entries must be objects tagged with a string `type`; anything else is
/// dropped. The payload is the entry's `payload` field when present, else
/// the remaining fields.
fn parse_state_changes(value: Option<&Value>) -> Vec<StateChange> {
    let entries = match value.and_then(Value::as_array) {
        Some(entries) => entries,
        None => return Vec::new(),
    };

    entries
        .iter()
        .filter_map(|entry| {
            let object = entry.as_object()?;
            let kind = object.get("type")?.as_str()?.to_string();
            let payload = object.get("payload").cloned().unwrap_or_else(|| {
                let mut rest = object.clone();
                rest.remove("type");
                Value::Object(rest)
            });
            Some(StateChange { kind, payload })
        })
        .collect()
}

/// Remove a wrapping Markdown code fence (``` or ```json) if present.
fn strip_code_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    // Drop the language tag line.
    let body = match rest.find('\n') {
        Some(index) => &rest[index + 1..],
        None => rest,
    };
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}
