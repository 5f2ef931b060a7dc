use serde::{Deserialize, Serialize};

use super::message::Message;
use crate::classifier::RequestCategory;

/// Page or document the user was looking at when they sent the request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestContext {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}

/// Raw image bytes attached to a request, encoded at the adapter boundary.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageAttachment {
    pub data: Vec<u8>,
    pub mime_type: String,
}

/// One inbound request. Immutable for the duration of a call.
#[derive(Debug, Clone, Default)]
pub struct IncomingRequest {
    pub text: String,
    pub context: Option<RequestContext>,
    pub image: Option<ImageAttachment>,
    /// Forces a specific provider, bypassing quota filtering.
    pub provider_override: Option<String>,
    /// Forces a category, skipping heuristic classification.
    pub category_override: Option<RequestCategory>,
    /// Prior turns, oldest first.
    pub history: Vec<Message>,
}

impl IncomingRequest {
    pub fn text<S: Into<String>>(text: S) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }

    pub fn with_context(mut self, context: RequestContext) -> Self {
        self.context = Some(context);
        self
    }

    pub fn with_image<M: Into<String>>(mut self, data: Vec<u8>, mime_type: M) -> Self {
        self.image = Some(ImageAttachment {
            data,
            mime_type: mime_type.into(),
        });
        self
    }

    pub fn with_provider<S: Into<String>>(mut self, name: S) -> Self {
        self.provider_override = Some(name.into());
        self
    }

    pub fn with_category(mut self, category: RequestCategory) -> Self {
        self.category_override = Some(category);
        self
    }

    pub fn with_history(mut self, history: Vec<Message>) -> Self {
        self.history = history;
        self
    }
}
