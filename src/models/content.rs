use serde::{Deserialize, Serialize};

use super::tool::ToolCall;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextContent {
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageContent {
    /// Base64-encoded image bytes.
    pub data: String,
    pub mime_type: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
/// One part of a message: plain text, an inline image, or a tool call the
/// model requested (only ever present on assistant turns).
pub enum MessageContent {
    Text(TextContent),
    Image(ImageContent),
    ToolCall(ToolCall),
}

impl MessageContent {
    pub fn text<S: Into<String>>(text: S) -> Self {
        MessageContent::Text(TextContent { text: text.into() })
    }

    pub fn image<S: Into<String>, T: Into<String>>(data: S, mime_type: T) -> Self {
        MessageContent::Image(ImageContent {
            data: data.into(),
            mime_type: mime_type.into(),
        })
    }

    pub fn tool_call(call: ToolCall) -> Self {
        MessageContent::ToolCall(call)
    }

    /// Get the text if this is a Text variant
    pub fn as_text(&self) -> Option<&str> {
        match self {
            MessageContent::Text(text) => Some(&text.text),
            _ => None,
        }
    }

    /// Get the image if this is an Image variant
    pub fn as_image(&self) -> Option<&ImageContent> {
        match self {
            MessageContent::Image(image) => Some(image),
            _ => None,
        }
    }

    pub fn as_tool_call(&self) -> Option<&ToolCall> {
        match self {
            MessageContent::ToolCall(call) => Some(call),
            _ => None,
        }
    }
}
