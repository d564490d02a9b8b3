//! Client side of the proxy channel
//!
//! The bridge lives in the context that cannot reach the network. Each fetch
//! opens a fresh channel, posts the request, and rebuilds a streaming
//! response from the executor's METADATA and BODY_CHUNK messages.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use futures::stream;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use uuid::Uuid;

use super::message::{ProxyMessage, ProxyRequest};
use super::port::{Connector, Port};
use crate::error::{ChatwireError, Result};
use crate::transport::{BodyStream, FetchOptions, HttpResponse, Transport};

/// Transport that forwards every request over a proxy channel
#[derive(Clone)]
pub struct ProxyBridge {
    connector: Arc<dyn Connector>,
}

impl ProxyBridge {
    pub fn new(connector: Arc<dyn Connector>) -> Self {
        Self { connector }
    }

    /// Relay one request and resolve as soon as its metadata arrives
    pub async fn proxy_fetch(
        &self,
        url: &str,
        options: FetchOptions,
        cancel: CancellationToken,
    ) -> Result<HttpResponse> {
        let channel = Uuid::new_v4().to_string();
        let mut port = self.connector.connect(&channel)?;

        debug!(channel = %channel, url = %url, "Opened proxy channel");

        port.post(&ProxyRequest {
            url: url.to_string(),
            options,
        })?;

        let first = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                port.disconnect();
                return Err(ChatwireError::Cancelled);
            }
            first = port.recv() => first,
        };

        let value = first.ok_or_else(|| {
            ChatwireError::Transport("Proxy channel closed before response metadata".to_string())
        })?;

        match ProxyMessage::from_value(value)? {
            ProxyMessage::Metadata { metadata } => {
                debug!(channel = %channel, status = metadata.status, "Proxy response metadata");
                Ok(HttpResponse::new(metadata, body_stream(port, cancel)))
            }
            ProxyMessage::Error { message } => {
                port.disconnect();
                Err(ChatwireError::Transport(message))
            }
            ProxyMessage::BodyChunk { .. } => {
                port.disconnect();
                Err(ChatwireError::Transport(
                    "Proxy channel sent a body chunk before metadata".to_string(),
                ))
            }
        }
    }
}

struct BodyState {
    port: Port,
    cancel: CancellationToken,
}

/// Body chunks until the terminal chunk; the port is torn down on every exit
fn body_stream(port: Port, cancel: CancellationToken) -> BodyStream {
    stream::unfold(Some(BodyState { port, cancel }), |state| async move {
        let mut state = state?;
        loop {
            let next = tokio::select! {
                biased;
                _ = state.cancel.cancelled() => {
                    state.port.disconnect();
                    return Some((Err(ChatwireError::Cancelled), None));
                }
                next = state.port.recv() => next,
            };

            let Some(value) = next else {
                return Some((
                    Err(ChatwireError::Transport(
                        "Proxy channel closed before the body finished".to_string(),
                    )),
                    None,
                ));
            };

            let item = match ProxyMessage::from_value(value) {
                Ok(ProxyMessage::BodyChunk { done: true, .. }) => {
                    state.port.disconnect();
                    return None;
                }
                Ok(ProxyMessage::BodyChunk { value: None, .. }) => continue,
                Ok(ProxyMessage::BodyChunk {
                    value: Some(value), ..
                }) => Ok(Bytes::from(value)),
                Ok(ProxyMessage::Error { message }) => Err(ChatwireError::Transport(message)),
                Ok(ProxyMessage::Metadata { .. }) => Err(ChatwireError::Transport(
                    "Proxy channel sent metadata twice".to_string(),
                )),
                Err(e) => Err(e),
            };

            if item.is_err() {
                state.port.disconnect();
                return Some((item, None));
            }
            return Some((item, Some(state)));
        }
    })
    .boxed()
}

#[async_trait]
impl Transport for ProxyBridge {
    async fn fetch(
        &self,
        url: &str,
        options: FetchOptions,
        cancel: CancellationToken,
    ) -> Result<HttpResponse> {
        self.proxy_fetch(url, options, cancel).await
    }

    fn name(&self) -> &'static str {
        "proxy"
    }
}
