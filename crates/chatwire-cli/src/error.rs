use chatwire::ChatwireError;

#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error(transparent)]
    Chatwire(#[from] ChatwireError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Unknown author: {0}. Use user or assistant.")]
    UnknownAuthor(String),

    #[error("Message not found: {0}")]
    MessageNotFound(String),

    #[error("Ambiguous message ID prefix: {0}")]
    AmbiguousId(String),
}

pub type CliResult<T> = Result<T, CliError>;
