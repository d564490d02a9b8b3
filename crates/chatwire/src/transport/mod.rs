//! HTTP transport abstraction
//!
//! Adapters never talk to the network directly. They hand a URL and
//! [`FetchOptions`] to a [`Transport`], which is either a direct reqwest call
//! or a relay through a proxy channel into another execution context.

mod direct;
mod text;

pub use direct::DirectTransport;
pub use text::Utf8Decoder;

use std::collections::BTreeMap;

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use futures::stream::{self, BoxStream};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::error::{ChatwireError, Result};

/// Request parameters for one fetch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchOptions {
    #[serde(default = "default_method")]
    pub method: String,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
}

fn default_method() -> String {
    "GET".to_string()
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            method: default_method(),
            headers: BTreeMap::new(),
            body: None,
        }
    }
}

impl FetchOptions {
    /// POST with a JSON body and `Content-Type: application/json`
    pub fn post_json(body: &Value) -> Result<Self> {
        let mut headers = BTreeMap::new();
        headers.insert("Content-Type".to_string(), "application/json".to_string());
        Ok(Self {
            method: "POST".to_string(),
            headers,
            body: Some(serde_json::to_string(body)?),
        })
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }
}

/// Status line and headers of a response, available before the body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseMetadata {
    pub status: u16,
    #[serde(rename = "statusText", default)]
    pub status_text: String,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

impl ResponseMetadata {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Streamed response body; each item is one network chunk
pub type BodyStream = BoxStream<'static, Result<Bytes>>;

/// A response whose metadata has arrived and whose body is still streaming
pub struct HttpResponse {
    pub metadata: ResponseMetadata,
    pub body: BodyStream,
}

impl std::fmt::Debug for HttpResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpResponse")
            .field("metadata", &self.metadata)
            .finish_non_exhaustive()
    }
}

impl HttpResponse {
    pub fn new(metadata: ResponseMetadata, body: BodyStream) -> Self {
        Self { metadata, body }
    }

    pub fn is_success(&self) -> bool {
        self.metadata.is_success()
    }

    pub fn status(&self) -> u16 {
        self.metadata.status
    }

    /// Read the whole body as text
    pub async fn text(mut self) -> Result<String> {
        let mut decoder = Utf8Decoder::new();
        let mut text = String::new();
        while let Some(chunk) = self.body.next().await {
            text.push_str(&decoder.decode(&chunk?));
        }
        text.push_str(&decoder.finish());
        Ok(text)
    }

    /// Read the whole body and parse it as JSON
    pub async fn json(self) -> Result<Value> {
        let text = self.text().await?;
        Ok(serde_json::from_str(&text)?)
    }
}

/// Something that can perform an HTTP request and stream back the response
#[async_trait]
pub trait Transport: Send + Sync {
    /// Start a request; resolves once the response status and headers are known
    ///
    /// Firing `cancel` aborts the request before or during the body.
    async fn fetch(
        &self,
        url: &str,
        options: FetchOptions,
        cancel: CancellationToken,
    ) -> Result<HttpResponse>;

    /// Short name for logging
    fn name(&self) -> &'static str;
}

/// End a body stream with `Cancelled` as soon as `cancel` fires
pub fn with_cancellation(body: BodyStream, cancel: CancellationToken) -> BodyStream {
    stream::unfold(Some((body, cancel)), |state| async move {
        let (mut body, cancel) = state?;
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Some((Err(ChatwireError::Cancelled), None)),
            item = body.next() => {
                let item = item?;
                Some((item, Some((body, cancel))))
            }
        }
    })
    .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body_of(chunks: &[&'static str]) -> BodyStream {
        let items: Vec<Result<Bytes>> = chunks
            .iter()
            .map(|c| Ok(Bytes::from_static(c.as_bytes())))
            .collect();
        stream::iter(items).boxed()
    }

    #[test]
    fn test_fetch_options_serialize_camel_case() {
        let options = FetchOptions::post_json(&serde_json::json!({"a": 1}))
            .unwrap()
            .header("Authorization", "Bearer k");
        let value = serde_json::to_value(&options).unwrap();

        assert_eq!(value["method"], "POST");
        assert_eq!(value["headers"]["Content-Type"], "application/json");
        assert_eq!(value["headers"]["Authorization"], "Bearer k");
        assert_eq!(value["body"], "{\"a\":1}");
    }

    #[test]
    fn test_fetch_options_body_omitted_when_absent() {
        let value = serde_json::to_value(FetchOptions::default()).unwrap();
        assert!(value.get("body").is_none());
        assert_eq!(value["method"], "GET");
    }

    #[test]
    fn test_metadata_status_text_field_name() {
        let metadata: ResponseMetadata = serde_json::from_value(serde_json::json!({
            "status": 404,
            "statusText": "Not Found",
            "headers": {"content-type": "text/plain"}
        }))
        .unwrap();

        assert_eq!(metadata.status_text, "Not Found");
        assert!(!metadata.is_success());
    }

    #[tokio::test]
    async fn test_response_text_joins_chunks() {
        let response = HttpResponse::new(
            ResponseMetadata {
                status: 200,
                status_text: "OK".to_string(),
                headers: BTreeMap::new(),
            },
            body_of(&["{\"ok\":", "true}"]),
        );

        let value = response.json().await.unwrap();
        assert_eq!(value["ok"], true);
    }

    #[tokio::test]
    async fn test_cancellation_ends_body() {
        let cancel = CancellationToken::new();
        let mut body = with_cancellation(body_of(&["a", "b"]), cancel.clone());

        assert_eq!(body.next().await.unwrap().unwrap(), Bytes::from_static(b"a"));
        cancel.cancel();
        assert!(matches!(
            body.next().await,
            Some(Err(ChatwireError::Cancelled))
        ));
        assert!(body.next().await.is_none());
    }
}
