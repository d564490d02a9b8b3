//! Provider adapters
//!
//! Each adapter knows how to build one provider's HTTP request and how to
//! read its response, either streamed through a [`StreamDecoder`] or as one
//! JSON document. Adapters never look anything up on their own; the caller
//! passes an explicit [`ProviderConfig`] with every call.

mod anthropic;
mod google;
mod ollama;
mod openai;
mod registry;

pub use anthropic::AnthropicAdapter;
pub use google::GoogleAdapter;
pub use ollama::OllamaAdapter;
pub use openai::OpenAiCompatible;
pub use registry::ProviderRegistry;

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::decoder::StreamDecoder;
use crate::error::{ChatwireError, Result};
use crate::transport::{FetchOptions, HttpResponse, Transport, Utf8Decoder};

/// Supported LLM providers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderId {
    OpenAI,
    Anthropic,
    Google,
    Mistral,
    Ollama,
    OpenRouter,
}

impl ProviderId {
    pub const ALL: [ProviderId; 6] = [
        ProviderId::OpenAI,
        ProviderId::Anthropic,
        ProviderId::Google,
        ProviderId::Mistral,
        ProviderId::Ollama,
        ProviderId::OpenRouter,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderId::OpenAI => "openai",
            ProviderId::Anthropic => "anthropic",
            ProviderId::Google => "google",
            ProviderId::Mistral => "mistral",
            ProviderId::Ollama => "ollama",
            ProviderId::OpenRouter => "openrouter",
        }
    }

    pub fn default_base_url(&self) -> &'static str {
        match self {
            ProviderId::OpenAI => "https://api.openai.com/v1",
            ProviderId::Anthropic => "https://api.anthropic.com/v1",
            ProviderId::Google => "https://generativelanguage.googleapis.com/v1beta",
            ProviderId::Mistral => "https://api.mistral.ai/v1",
            ProviderId::Ollama => "http://localhost:11434",
            ProviderId::OpenRouter => "https://openrouter.ai/api/v1",
        }
    }

    /// Environment variable holding the API key; Ollama needs none
    pub fn default_api_key_env(&self) -> Option<&'static str> {
        match self {
            ProviderId::OpenAI => Some("OPENAI_API_KEY"),
            ProviderId::Anthropic => Some("ANTHROPIC_API_KEY"),
            ProviderId::Google => Some("GOOGLE_API_KEY"),
            ProviderId::Mistral => Some("MISTRAL_API_KEY"),
            ProviderId::Ollama => None,
            ProviderId::OpenRouter => Some("OPENROUTER_API_KEY"),
        }
    }

    /// Only OpenAI is switched on until configured otherwise
    pub fn enabled_by_default(&self) -> bool {
        matches!(self, ProviderId::OpenAI)
    }

    /// Models offered for this provider when none are configured
    pub fn default_models(&self) -> &'static [&'static str] {
        match self {
            ProviderId::OpenAI => &["gpt-4o", "gpt-4o-mini"],
            ProviderId::Anthropic => &["claude-3-opus", "claude-3-sonnet", "claude-3-haiku"],
            ProviderId::Google => &["gemini-1.5-pro", "gemini-1.5-flash"],
            ProviderId::Mistral => &["mistral-tiny", "mistral-small", "mistral-medium"],
            ProviderId::Ollama => &["llama2", "mistral", "codellama"],
            ProviderId::OpenRouter => &[
                "openai/gpt-4-turbo",
                "anthropic/claude-3-opus",
                "google/gemini-pro",
                "meta-llama/llama-2-70b-chat",
            ],
        }
    }

    pub fn default_model(&self) -> &'static str {
        match self {
            ProviderId::OpenAI => "gpt-4o-mini",
            ProviderId::Anthropic => "claude-3-haiku-20240307",
            ProviderId::Google => "gemini-1.5-flash",
            ProviderId::Mistral => "mistral-small-latest",
            ProviderId::Ollama => "llama2",
            ProviderId::OpenRouter => "openai/gpt-4-turbo",
        }
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderId {
    type Err = ChatwireError;

    fn from_str(s: &str) -> Result<Self> {
        let lower = s.trim().to_lowercase();
        ProviderId::ALL
            .into_iter()
            .find(|id| id.as_str() == lower)
            .ok_or_else(|| ChatwireError::UnknownProvider(s.to_string()))
    }
}

/// What a provider supports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Capabilities {
    pub streaming: bool,
    pub attachments: bool,
    pub function_calling: bool,
}

impl Capabilities {
    pub const STREAMING_ONLY: Capabilities = Capabilities {
        streaming: true,
        attachments: false,
        function_calling: false,
    };

    pub const FULL: Capabilities = Capabilities {
        streaming: true,
        attachments: true,
        function_calling: true,
    };
}

/// Per-send generation options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatOptions {
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    #[serde(default = "default_stream")]
    pub stream: bool,
}

fn default_stream() -> bool {
    true
}

impl ChatOptions {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            temperature: None,
            max_tokens: None,
            system_prompt: None,
            stream: default_stream(),
        }
    }
}

/// Resolved connection settings for one provider
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    /// Extra headers sent with every request
    pub headers: BTreeMap<String, String>,
    /// Sends to a disabled provider are refused
    pub enabled: bool,
}

impl ProviderConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            api_key: None,
            base_url: base_url.into(),
            headers: BTreeMap::new(),
            enabled: true,
        }
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn require_api_key(&self, provider: ProviderId) -> Result<&str> {
        self.api_key
            .as_deref()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| ChatwireError::Config(format!("No API key configured for {provider}")))
    }

    /// `base_url` joined with `path`, tolerating a trailing slash
    pub fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }
}

/// Receives each text delta of a completion in order
pub type DeltaSink<'a> = dyn FnMut(&str) + Send + 'a;

/// One provider call
#[derive(Debug, Clone)]
pub struct CompletionRequest<'a> {
    pub content: &'a str,
    pub options: &'a ChatOptions,
    pub config: &'a ProviderConfig,
    pub cancel: CancellationToken,
}

/// Request builder and response interpreter for one provider
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    fn id(&self) -> ProviderId;

    fn capabilities(&self) -> Capabilities;

    /// URL and fetch options for one user message
    fn build_request(
        &self,
        content: &str,
        options: &ChatOptions,
        config: &ProviderConfig,
        stream: bool,
    ) -> Result<(String, FetchOptions)>;

    /// Fresh decoder for one streamed response
    fn stream_decoder(&self) -> Box<dyn StreamDecoder>;

    /// Full text of a non-streamed response
    fn parse_response(&self, body: &Value) -> Option<String>;

    /// Run one completion, reporting each text delta in order
    ///
    /// Returns the full assistant text. Non-streaming calls report the whole
    /// text as a single delta.
    async fn complete(
        &self,
        transport: &dyn Transport,
        request: CompletionRequest<'_>,
        on_delta: &mut DeltaSink<'_>,
    ) -> Result<String> {
        let stream = request.options.stream && self.capabilities().streaming;
        let (url, fetch) =
            self.build_request(request.content, request.options, request.config, stream)?;

        debug!(
            provider = %self.id(),
            transport = transport.name(),
            model = %request.options.model,
            stream,
            "Calling provider"
        );

        let response = transport.fetch(&url, fetch, request.cancel.clone()).await?;
        if !response.is_success() {
            return Err(provider_error(response).await);
        }

        if stream {
            return drive_decoder(self.stream_decoder(), response, on_delta).await;
        }

        let status = response.status();
        let body = response.json().await?;
        let text = self.parse_response(&body).ok_or_else(|| ChatwireError::Provider {
            status,
            message: "Response did not contain any message content".to_string(),
        })?;
        if !text.is_empty() {
            on_delta(&text);
        }
        Ok(text)
    }
}

/// Feed a streamed body through `decoder`, returning the finalized content
pub async fn drive_decoder(
    mut decoder: Box<dyn StreamDecoder>,
    response: HttpResponse,
    on_delta: &mut DeltaSink<'_>,
) -> Result<String> {
    let mut text = Utf8Decoder::new();
    let mut body = response.body;

    while let Some(chunk) = body.next().await {
        let decoded = text.decode(&chunk?);
        decoder.feed(&decoded, &mut |delta: &str| on_delta(delta));
    }

    let tail = text.finish();
    if !tail.is_empty() {
        decoder.feed(&tail, &mut |delta: &str| on_delta(delta));
    }
    Ok(decoder.finalize(&mut |delta: &str| on_delta(delta)))
}

/// Turn a non-success response into a [`ChatwireError::Provider`]
pub async fn provider_error(response: HttpResponse) -> ChatwireError {
    let status = response.metadata.status;
    let fallback = if response.metadata.status_text.is_empty() {
        format!("HTTP {status}")
    } else {
        response.metadata.status_text.clone()
    };

    let message = match response.text().await {
        Ok(body) => error_message_from_body(&body).unwrap_or(fallback),
        Err(_) => fallback,
    };

    ChatwireError::Provider { status, message }
}

/// `error.message`, or `error` itself when it is a string
///
/// Streaming endpoints that answer with a JSON array (Google) wrap the error
/// object in a single-element array.
pub fn error_message_from_body(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    let value = match value {
        Value::Array(mut items) if !items.is_empty() => items.swap_remove(0),
        other => other,
    };
    let error = value.get("error")?;
    if let Some(message) = error.get("message").and_then(Value::as_str) {
        return Some(message.to_string());
    }
    error.as_str().map(|s| s.to_string())
}

/// Concatenate the `text` of every element of `parts`
pub(crate) fn join_text_parts(parts: &Value) -> Option<String> {
    let parts = parts.as_array()?;
    Some(
        parts
            .iter()
            .filter_map(|p| p.get("text").and_then(Value::as_str))
            .collect(),
    )
}
