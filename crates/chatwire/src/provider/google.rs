//! Google Generative Language API (Gemini)

use serde_json::{Map, Value, json};

use super::{
    Capabilities, ChatOptions, ProviderAdapter, ProviderConfig, ProviderId, join_text_parts,
};
use crate::decoder::{JsonArrayDecoder, StreamDecoder};
use crate::error::Result;
use crate::transport::FetchOptions;

#[derive(Debug, Clone, Copy, Default)]
pub struct GoogleAdapter;

/// Text of `candidates[0].content.parts`
pub fn candidate_text(element: &Value) -> Option<String> {
    join_text_parts(
        element
            .get("candidates")?
            .get(0)?
            .get("content")?
            .get("parts")?,
    )
}

impl ProviderAdapter for GoogleAdapter {
    fn id(&self) -> ProviderId {
        ProviderId::Google
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::FULL
    }

    fn build_request(
        &self,
        content: &str,
        options: &ChatOptions,
        config: &ProviderConfig,
        stream: bool,
    ) -> Result<(String, FetchOptions)> {
        let api_key = config.require_api_key(ProviderId::Google)?;

        let mut generation = Map::new();
        if let Some(temperature) = options.temperature {
            generation.insert("temperature".to_string(), json!(temperature));
        }
        if let Some(max_tokens) = options.max_tokens {
            generation.insert("maxOutputTokens".to_string(), json!(max_tokens));
        }

        let mut body = json!({
            "contents": [{"role": "user", "parts": [{"text": content}]}],
        });
        if !generation.is_empty() {
            body["generationConfig"] = Value::Object(generation);
        }
        if let Some(system) = &options.system_prompt {
            body["systemInstruction"] = json!({"parts": [{"text": system}]});
        }

        let mut fetch = FetchOptions::post_json(&body)?.header("x-goog-api-key", api_key);
        for (name, value) in &config.headers {
            fetch = fetch.header(name.clone(), value.clone());
        }

        let method = if stream {
            "streamGenerateContent"
        } else {
            "generateContent"
        };
        let url = config.endpoint(&format!("/models/{}:{method}", options.model));

        Ok((url, fetch))
    }

    fn stream_decoder(&self) -> Box<dyn StreamDecoder> {
        Box::new(JsonArrayDecoder::new(candidate_text))
    }

    fn parse_response(&self, body: &Value) -> Option<String> {
        candidate_text(body)
    }
}
