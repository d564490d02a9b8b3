//! Anthropic Messages API

use serde_json::{Value, json};

use super::{Capabilities, ChatOptions, ProviderAdapter, ProviderConfig, ProviderId};
use crate::decoder::{SseDecoder, StreamDecoder};
use crate::error::Result;
use crate::transport::FetchOptions;

pub const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_MAX_TOKENS: u32 = 1024;

#[derive(Debug, Clone, Copy, Default)]
pub struct AnthropicAdapter;

/// `delta.text` of a `content_block_delta` event carrying text
pub fn stream_delta(event: &Value) -> Option<String> {
    let delta = event.get("delta")?;
    match delta.get("type").and_then(Value::as_str) {
        None | Some("text_delta") => delta.get("text")?.as_str().map(|s| s.to_string()),
        Some(_) => None,
    }
}

impl ProviderAdapter for AnthropicAdapter {
    fn id(&self) -> ProviderId {
        ProviderId::Anthropic
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::STREAMING_ONLY
    }

    fn build_request(
        &self,
        content: &str,
        options: &ChatOptions,
        config: &ProviderConfig,
        stream: bool,
    ) -> Result<(String, FetchOptions)> {
        let api_key = config.require_api_key(ProviderId::Anthropic)?;

        let mut body = json!({
            "model": options.model,
            "messages": [{"role": "user", "content": content}],
            "max_tokens": options.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            "stream": stream,
        });
        if let Some(temperature) = options.temperature {
            body["temperature"] = json!(temperature);
        }
        if let Some(system) = &options.system_prompt {
            body["system"] = json!(system);
        }

        let mut fetch = FetchOptions::post_json(&body)?
            .header("x-api-key", api_key)
            .header("anthropic-version", ANTHROPIC_VERSION);
        for (name, value) in &config.headers {
            fetch = fetch.header(name.clone(), value.clone());
        }

        Ok((config.endpoint("/messages"), fetch))
    }

    fn stream_decoder(&self) -> Box<dyn StreamDecoder> {
        Box::new(SseDecoder::new(stream_delta))
    }

    fn parse_response(&self, body: &Value) -> Option<String> {
        let blocks = body.get("content")?.as_array()?;
        Some(
            blocks
                .iter()
                .filter(|b| b.get("type").and_then(Value::as_str) == Some("text"))
                .filter_map(|b| b.get("text").and_then(Value::as_str))
                .collect(),
        )
    }
}
