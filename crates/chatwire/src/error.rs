//! Error types for Chatwire

use thiserror::Error;

/// Main error type for Chatwire operations
#[derive(Error, Debug)]
pub enum ChatwireError {
    /// Network failure, channel `ERROR` message, or a channel that closed early
    #[error("Transport error: {0}")]
    Transport(String),

    /// Provider answered with a non-success status
    #[error("Provider error ({status}): {message}")]
    Provider { status: u16, message: String },

    /// A send is already in flight for this session
    #[error("A message is already streaming for this session")]
    Busy,

    /// The operation was cancelled by its token
    #[error("Operation cancelled")]
    Cancelled,

    /// No adapter is registered for the requested provider
    #[error("Unknown provider: {0}")]
    UnknownProvider(String),

    /// The provider is switched off in configuration
    #[error("Provider {0} is disabled")]
    ProviderDisabled(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// History persistence errors
    #[error("Storage error: {0}")]
    Storage(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl ChatwireError {
    /// Short category name used in structured log fields
    pub fn category(&self) -> &'static str {
        match self {
            ChatwireError::Transport(_) => "transport",
            ChatwireError::Provider { .. } => "provider",
            ChatwireError::Busy => "busy",
            ChatwireError::Cancelled => "cancelled",
            ChatwireError::UnknownProvider(_) => "unknown_provider",
            ChatwireError::ProviderDisabled(_) => "provider_disabled",
            ChatwireError::Config(_) => "config",
            ChatwireError::Storage(_) => "storage",
            ChatwireError::Io(_) => "io",
            ChatwireError::Serialization(_) => "serialization",
        }
    }
}

impl From<reqwest::Error> for ChatwireError {
    fn from(e: reqwest::Error) -> Self {
        ChatwireError::Transport(e.to_string())
    }
}

impl From<serde_json::Error> for ChatwireError {
    fn from(e: serde_json::Error) -> Self {
        ChatwireError::Serialization(e.to_string())
    }
}

/// Result type alias for Chatwire operations
pub type Result<T> = std::result::Result<T, ChatwireError>;
