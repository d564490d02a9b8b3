//! Wire messages exchanged over a proxy channel

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ChatwireError, Result};
use crate::transport::{FetchOptions, ResponseMetadata};

/// The single client-to-server message that opens a channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProxyRequest {
    pub url: String,
    #[serde(default)]
    pub options: FetchOptions,
}

/// Server-to-client messages
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProxyMessage {
    Metadata {
        metadata: ResponseMetadata,
    },
    BodyChunk {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        value: Option<String>,
        done: bool,
    },
    Error {
        message: String,
    },
}

impl ProxyMessage {
    pub fn chunk(value: impl Into<String>) -> Self {
        ProxyMessage::BodyChunk {
            value: Some(value.into()),
            done: false,
        }
    }

    /// The terminal body chunk
    pub fn done() -> Self {
        ProxyMessage::BodyChunk {
            value: None,
            done: true,
        }
    }

    pub fn from_value(value: Value) -> Result<Self> {
        serde_json::from_value(value)
            .map_err(|e| ChatwireError::Transport(format!("Malformed proxy message: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_wire_shapes() {
        assert_eq!(
            serde_json::to_value(ProxyMessage::chunk("abc")).unwrap(),
            json!({"type": "BODY_CHUNK", "value": "abc", "done": false})
        );
        assert_eq!(
            serde_json::to_value(ProxyMessage::done()).unwrap(),
            json!({"type": "BODY_CHUNK", "done": true})
        );
        assert_eq!(
            serde_json::to_value(ProxyMessage::Error {
                message: "boom".to_string()
            })
            .unwrap(),
            json!({"type": "ERROR", "message": "boom"})
        );
    }

    #[test]
    fn test_parses_metadata() {
        let message = ProxyMessage::from_value(json!({
            "type": "METADATA",
            "metadata": {"status": 200, "statusText": "OK", "headers": {}}
        }))
        .unwrap();

        match message {
            ProxyMessage::Metadata { metadata } => assert_eq!(metadata.status, 200),
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn test_unknown_type_is_transport_error() {
        let result = ProxyMessage::from_value(json!({"type": "HELLO"}));
        assert!(matches!(result, Err(ChatwireError::Transport(_))));
    }

    #[test]
    fn test_request_shape() {
        let request: ProxyRequest = serde_json::from_value(json!({
            "url": "https://api.example.com/v1/chat",
            "options": {"method": "POST", "headers": {"a": "b"}, "body": "{}"}
        }))
        .unwrap();

        assert_eq!(request.options.method, "POST");
        assert_eq!(request.options.body.as_deref(), Some("{}"));
    }
}
