//! OpenAI-compatible chat completions (OpenAI, Mistral, OpenRouter)

use serde_json::{Value, json};

use super::{Capabilities, ChatOptions, ProviderAdapter, ProviderConfig, ProviderId};
use crate::decoder::{SseDecoder, StreamDecoder};
use crate::error::Result;
use crate::transport::FetchOptions;

const DEFAULT_TEMPERATURE: f32 = 0.7;
const OPENROUTER_DEFAULT_MAX_TOKENS: u32 = 2048;
const OPENROUTER_REFERER: &str = "https://github.com/watzon/chatwire";
const OPENROUTER_TITLE: &str = "Chatwire";

/// Adapter for any provider speaking the `/chat/completions` protocol
#[derive(Debug, Clone, Copy)]
pub struct OpenAiCompatible {
    id: ProviderId,
}

impl OpenAiCompatible {
    pub fn openai() -> Self {
        Self {
            id: ProviderId::OpenAI,
        }
    }

    pub fn mistral() -> Self {
        Self {
            id: ProviderId::Mistral,
        }
    }

    pub fn openrouter() -> Self {
        Self {
            id: ProviderId::OpenRouter,
        }
    }
}

/// `choices[0].delta.content` of one streamed chunk
pub fn stream_delta(event: &Value) -> Option<String> {
    event
        .get("choices")?
        .get(0)?
        .get("delta")?
        .get("content")?
        .as_str()
        .map(|s| s.to_string())
}

impl ProviderAdapter for OpenAiCompatible {
    fn id(&self) -> ProviderId {
        self.id
    }

    fn capabilities(&self) -> Capabilities {
        match self.id {
            ProviderId::OpenAI => Capabilities::FULL,
            _ => Capabilities::STREAMING_ONLY,
        }
    }

    fn build_request(
        &self,
        content: &str,
        options: &ChatOptions,
        config: &ProviderConfig,
        stream: bool,
    ) -> Result<(String, FetchOptions)> {
        let api_key = config.require_api_key(self.id)?;

        let mut messages = Vec::new();
        if let Some(system) = &options.system_prompt {
            messages.push(json!({"role": "system", "content": system}));
        }
        messages.push(json!({"role": "user", "content": content}));

        let mut body = json!({
            "model": options.model,
            "messages": messages,
            "temperature": options.temperature.unwrap_or(DEFAULT_TEMPERATURE),
            "stream": stream,
        });

        let max_tokens = match self.id {
            ProviderId::OpenRouter => Some(options.max_tokens.unwrap_or(OPENROUTER_DEFAULT_MAX_TOKENS)),
            _ => options.max_tokens,
        };
        if let Some(max_tokens) = max_tokens {
            body["max_tokens"] = json!(max_tokens);
        }

        let mut fetch =
            FetchOptions::post_json(&body)?.header("Authorization", format!("Bearer {api_key}"));
        if self.id == ProviderId::OpenRouter {
            fetch = fetch
                .header("HTTP-Referer", OPENROUTER_REFERER)
                .header("X-Title", OPENROUTER_TITLE);
        }
        for (name, value) in &config.headers {
            fetch = fetch.header(name.clone(), value.clone());
        }

        Ok((config.endpoint("/chat/completions"), fetch))
    }

    fn stream_decoder(&self) -> Box<dyn StreamDecoder> {
        Box::new(SseDecoder::new(stream_delta))
    }

    fn parse_response(&self, body: &Value) -> Option<String> {
        body.get("choices")?
            .get(0)?
            .get("message")?
            .get("content")?
            .as_str()
            .map(|s| s.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> ProviderConfig {
        ProviderConfig::new("https://api.openai.com/v1").with_api_key("sk-test")
    }

    #[test]
    fn test_build_streaming_request() {
        let mut options = ChatOptions::new("gpt-4o-mini");
        options.system_prompt = Some("Be brief".to_string());

        let (url, fetch) = OpenAiCompatible::openai()
            .build_request("Hello", &options, &config(), true)
            .unwrap();
        let body: Value = serde_json::from_str(fetch.body.as_deref().unwrap()).unwrap();

        assert_eq!(url, "https://api.openai.com/v1/chat/completions");
        assert_eq!(fetch.method, "POST");
        assert_eq!(fetch.headers["Authorization"], "Bearer sk-test");
        assert_eq!(body["stream"], true);
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "Hello");
        assert!((body["temperature"].as_f64().unwrap() - 0.7).abs() < 1e-6);
        assert!(body.get("max_tokens").is_none());
    }

    #[test]
    fn test_openrouter_defaults_and_headers() {
        let options = ChatOptions::new("openai/gpt-4-turbo");
        let (_, fetch) = OpenAiCompatible::openrouter()
            .build_request("Hi", &options, &config(), false)
            .unwrap();
        let body: Value = serde_json::from_str(fetch.body.as_deref().unwrap()).unwrap();

        assert_eq!(body["max_tokens"], 2048);
        assert_eq!(fetch.headers["X-Title"], "Chatwire");
        assert!(fetch.headers.contains_key("HTTP-Referer"));
    }

    #[test]
    fn test_missing_api_key_is_config_error() {
        let result = OpenAiCompatible::mistral().build_request(
            "Hi",
            &ChatOptions::new("mistral-small-latest"),
            &ProviderConfig::new("https://api.mistral.ai/v1"),
            true,
        );
        assert!(matches!(result, Err(crate::ChatwireError::Config(_))));
    }

    #[test]
    fn test_parse_response() {
        let body = serde_json::json!({
            "choices": [{"message": {"role": "assistant", "content": "Hi there"}}]
        });
        assert_eq!(
            OpenAiCompatible::openai().parse_response(&body).as_deref(),
            Some("Hi there")
        );
    }

    #[test]
    fn test_capabilities() {
        assert!(OpenAiCompatible::openai().capabilities().function_calling);
        assert_eq!(
            OpenAiCompatible::mistral().capabilities(),
            Capabilities::STREAMING_ONLY
        );
    }
}
