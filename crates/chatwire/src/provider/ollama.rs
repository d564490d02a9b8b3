//! Ollama generate API

use serde_json::{Map, Value, json};

use super::{Capabilities, ChatOptions, ProviderAdapter, ProviderConfig, ProviderId};
use crate::decoder::{JsonArrayDecoder, StreamDecoder};
use crate::error::Result;
use crate::transport::FetchOptions;

#[derive(Debug, Clone, Copy, Default)]
pub struct OllamaAdapter;

fn response_field(element: &Value) -> Option<String> {
    element.get("response")?.as_str().map(|s| s.to_string())
}

impl ProviderAdapter for OllamaAdapter {
    fn id(&self) -> ProviderId {
        ProviderId::Ollama
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
        let mut model_options = Map::new();
        if let Some(temperature) = options.temperature {
            model_options.insert("temperature".to_string(), json!(temperature));
        }
        if let Some(max_tokens) = options.max_tokens {
            model_options.insert("num_predict".to_string(), json!(max_tokens));
        }

        let mut body = json!({
            "model": options.model,
            "prompt": content,
            "stream": stream,
            "options": model_options,
        });
        if let Some(system) = &options.system_prompt {
            body["system"] = json!(system);
        }

        let mut fetch = FetchOptions::post_json(&body)?;
        if let Some(key) = config.api_key.as_deref().filter(|k| !k.is_empty()) {
            fetch = fetch.header("Authorization", format!("Bearer {key}"));
        }
        for (name, value) in &config.headers {
            fetch = fetch.header(name.clone(), value.clone());
        }

        Ok((config.endpoint("/api/generate"), fetch))
    }

    fn stream_decoder(&self) -> Box<dyn StreamDecoder> {
        Box::new(JsonArrayDecoder::new(response_field))
    }

    fn parse_response(&self, body: &Value) -> Option<String> {
        response_field(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::decode_all;

    #[test]
    fn test_build_request_without_key() {
        let mut options = ChatOptions::new("llama2");
        options.max_tokens = Some(64);

        let (url, fetch) = OllamaAdapter
            .build_request("Why is the sky blue?", &options, &ProviderConfig::new("http://localhost:11434"), true)
            .unwrap();
        let body: Value = serde_json::from_str(fetch.body.as_deref().unwrap()).unwrap();

        assert_eq!(url, "http://localhost:11434/api/generate");
        assert!(!fetch.headers.contains_key("Authorization"));
        assert_eq!(body["prompt"], "Why is the sky blue?");
        assert_eq!(body["options"]["num_predict"], 64);
    }

    #[test]
    fn test_stream_decoder_reads_ndjson() {
        let raw = "{\"model\":\"llama2\",\"response\":\"The\",\"done\":false}\n\
{\"model\":\"llama2\",\"response\":\" sky\",\"done\":false}\n\
{\"model\":\"llama2\",\"response\":\"\",\"done\":true,\"context\":[1,2,3]}\n";

        let mut decoder = OllamaAdapter.stream_decoder();
        let (deltas, content) = decode_all(decoder.as_mut(), raw);

        assert_eq!(deltas, vec!["The", " sky"]);
        assert_eq!(content, "The sky");
    }
}
