use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::provider::ProviderId;

/// Who wrote a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Author {
    User,
    Assistant,
}

impl std::fmt::Display for Author {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Author::User => write!(f, "user"),
            Author::Assistant => write!(f, "assistant"),
        }
    }
}

/// One entry in the chat history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub content: String,
    pub author: Author,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<ProviderId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    pub timestamp: DateTime<Utc>,
    /// Still receiving streamed content
    #[serde(default)]
    pub pending: bool,
    /// Set on a user message whose send failed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Message {
    pub fn user(content: impl Into<String>, provider: ProviderId, model: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            content: content.into(),
            author: Author::User,
            provider: Some(provider),
            model: Some(model.into()),
            timestamp: Utc::now(),
            pending: false,
            error: None,
        }
    }

    /// Empty assistant message awaiting streamed content
    pub fn pending_assistant(provider: ProviderId, model: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            content: String::new(),
            author: Author::Assistant,
            provider: Some(provider),
            model: Some(model.into()),
            timestamp: Utc::now(),
            pending: true,
            error: None,
        }
    }
}
