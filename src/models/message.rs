use chrono::Utc;
use serde::{Deserialize, Serialize};

use super::content::MessageContent;
use super::tool::ToolCall;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// A message to or from an LLM.
///
/// `tool_call_id` and `tool_name` are only meaningful when `role` is
/// [`Role::Tool`]; they tie a tool result back to the call that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub created: i64,
    pub content: Vec<MessageContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
}

impl Message {
    fn with_role(role: Role) -> Self {
        Message {
            role,
            created: Utc::now().timestamp(),
            content: Vec::new(),
            tool_call_id: None,
            tool_name: None,
        }
    }

    /// Create a new user message with the current timestamp
    pub fn user() -> Self {
        Self::with_role(Role::User)
    }

    /// Create a new assistant message with the current timestamp
    pub fn assistant() -> Self {
        Self::with_role(Role::Assistant)
    }

    /// Create a new system message with the current timestamp
    pub fn system() -> Self {
        Self::with_role(Role::System)
    }

    /// Create a tool-result message tied to the call that produced it
    pub fn tool<I: Into<String>, N: Into<String>>(tool_call_id: I, tool_name: N) -> Self {
        let mut message = Self::with_role(Role::Tool);
        message.tool_call_id = Some(tool_call_id.into());
        message.tool_name = Some(tool_name.into());
        message
    }

    /// Add any MessageContent to the message
    pub fn with_content(mut self, content: MessageContent) -> Self {
        self.content.push(content);
        self
    }

    /// Add text content to the message
    pub fn with_text<S: Into<String>>(self, text: S) -> Self {
        self.with_content(MessageContent::text(text))
    }

    /// Add image content (base64 data + mime type) to the message
    pub fn with_image<S: Into<String>, T: Into<String>>(self, data: S, mime_type: T) -> Self {
        self.with_content(MessageContent::image(data, mime_type))
    }

    /// Echo a tool call the model requested onto an assistant turn
    pub fn with_tool_call(self, call: ToolCall) -> Self {
        self.with_content(MessageContent::tool_call(call))
    }

    /// All text parts joined with newlines.
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(MessageContent::as_text)
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn has_image(&self) -> bool {
        self.content
            .iter()
            .any(|content| matches!(content, MessageContent::Image(_)))
    }

    pub fn tool_calls(&self) -> Vec<&ToolCall> {
        self.content
            .iter()
            .filter_map(MessageContent::as_tool_call)
            .collect()
    }
}
