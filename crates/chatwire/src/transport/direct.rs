//! Direct network transport backed by reqwest

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt};
use reqwest::Client;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::{FetchOptions, HttpResponse, ResponseMetadata, Transport, with_cancellation};
use crate::config::ProxyConfig;
use crate::error::{ChatwireError, Result};

/// Performs requests from the current process
#[derive(Debug, Clone)]
pub struct DirectTransport {
    client: Client,
}

impl DirectTransport {
    pub fn new(config: &ProxyConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(config.user_agent.clone())
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .build()
            .map_err(|e| ChatwireError::Config(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self { client })
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

fn build_headers(headers: &BTreeMap<String, String>) -> Result<HeaderMap> {
    let mut map = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| ChatwireError::Transport(format!("Invalid header name '{name}': {e}")))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| ChatwireError::Transport(format!("Invalid header value for '{name}': {e}")))?;
        map.insert(name, value);
    }
    Ok(map)
}

fn collect_headers(headers: &HeaderMap) -> BTreeMap<String, String> {
    headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_string(), v.to_string()))
        })
        .collect()
}

#[async_trait]
impl Transport for DirectTransport {
    async fn fetch(
        &self,
        url: &str,
        options: FetchOptions,
        cancel: CancellationToken,
    ) -> Result<HttpResponse> {
        let method = reqwest::Method::from_bytes(options.method.as_bytes())
            .map_err(|e| ChatwireError::Transport(format!("Invalid method '{}': {e}", options.method)))?;

        let mut request = self
            .client
            .request(method, url)
            .headers(build_headers(&options.headers)?);
        if let Some(body) = options.body {
            request = request.body(body);
        }

        debug!(url = %url, method = %options.method, "Sending request");

        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ChatwireError::Cancelled),
            response = request.send() => response?,
        };

        let status = response.status();
        let metadata = ResponseMetadata {
            status: status.as_u16(),
            status_text: status.canonical_reason().unwrap_or_default().to_string(),
            headers: collect_headers(response.headers()),
        };

        debug!(url = %url, status = metadata.status, "Response headers received");

        let body = response.bytes_stream().map_err(ChatwireError::from).boxed();
        Ok(HttpResponse::new(metadata, with_cancellation(body, cancel)))
    }

    fn name(&self) -> &'static str {
        "direct"
    }
}
