use serde::{Deserialize, Serialize};

use super::{ContentPayload, ContentType};
use crate::{ContentId, Token};

/// Plain text message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chat {
    message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    referencing: Option<ContentId>,
}

impl Chat {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            referencing: None,
        }
    }

    /// Mark this message as a reply to an earlier one.
    pub fn referencing(mut self, id: ContentId) -> Self {
        self.referencing = Some(id);
        self
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn referenced(&self) -> Option<&ContentId> {
        self.referencing.as_ref()
    }
}

impl ContentPayload for Chat {
    const CONTENT_TYPE: ContentType = ContentType::Chat;
}

/// Hands the recipient tokens it can use to reach the sender later.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Introduction {
    #[serde(default)]
    tokens: Vec<Token>,
}

impl Introduction {
    pub fn new(tokens: Vec<Token>) -> Self {
        Self { tokens }
    }

    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }
}

impl ContentPayload for Introduction {
    const CONTENT_TYPE: ContentType = ContentType::Introduction;
}
