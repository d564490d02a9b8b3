//! Test utilities for chatwire - scripted transports
//!
//! [`ScriptedTransport`] answers every fetch from a fixed script without
//! touching the network, and records each request with its cancellation
//! token so tests can assert on what was sent and what was cancelled.

use std::collections::BTreeMap;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use futures::stream::{self, BoxStream};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_util::sync::CancellationToken;

use crate::error::{ChatwireError, Result};
use crate::transport::{
    FetchOptions, HttpResponse, ResponseMetadata, Transport, with_cancellation,
};

/// One request seen by a [`ScriptedTransport`]
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub url: String,
    pub options: FetchOptions,
    pub cancel: CancellationToken,
}

impl RecordedRequest {
    /// The request body parsed as JSON
    pub fn json_body(&self) -> Option<serde_json::Value> {
        serde_json::from_str(self.options.body.as_deref()?).ok()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BodyEnd {
    Finish,
    Fail,
    Pending,
}

/// Transport that replays a canned response
pub struct ScriptedTransport {
    status: u16,
    headers: BTreeMap<String, String>,
    chunks: Vec<Bytes>,
    end: BodyEnd,
    body_error: String,
    failure: Option<String>,
    hang_before_response: bool,
    live_body: Mutex<Option<UnboundedReceiver<Result<Bytes>>>>,
    requests: Mutex<Vec<RecordedRequest>>,
}

impl Default for ScriptedTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedTransport {
    /// 200 OK with an empty body
    pub fn new() -> Self {
        Self {
            status: 200,
            headers: BTreeMap::new(),
            chunks: Vec::new(),
            end: BodyEnd::Finish,
            body_error: String::new(),
            failure: None,
            hang_before_response: false,
            live_body: Mutex::new(None),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = status;
        self
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.insert(name.to_string(), value.to_string());
        self
    }

    /// Body delivered as the given chunks, in order
    pub fn with_chunks<I, S>(mut self, chunks: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<Vec<u8>>,
    {
        self.chunks = chunks.into_iter().map(|c| Bytes::from(c.into())).collect();
        self
    }

    pub fn with_body(self, body: &str) -> Self {
        self.with_chunks([body])
    }

    /// After the scripted chunks, fail the body read
    pub fn with_body_error(mut self, message: &str) -> Self {
        self.end = BodyEnd::Fail;
        self.body_error = message.to_string();
        self
    }

    /// After the scripted chunks, never end the body
    pub fn with_pending_body(mut self) -> Self {
        self.end = BodyEnd::Pending;
        self
    }

    /// Every fetch fails with a transport error
    pub fn with_failure(mut self, message: &str) -> Self {
        self.failure = Some(message.to_string());
        self
    }

    /// Fetches never produce a response; they only end by cancellation
    pub fn with_hanging_response(mut self) -> Self {
        self.hang_before_response = true;
        self
    }

    /// The first fetch streams whatever is pushed into the returned sender
    pub fn with_live_body(self) -> (Self, UnboundedSender<Result<Bytes>>) {
        let (tx, rx) = mpsc::unbounded_channel();
        *self
            .live_body
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(rx);
        (self, tx)
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn last_request(&self) -> Option<RecordedRequest> {
        self.requests().pop()
    }

    fn scripted_body(&self) -> BoxStream<'static, Result<Bytes>> {
        if let Some(rx) = self
            .live_body
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            return UnboundedReceiverStream::new(rx).boxed();
        }

        let chunks = stream::iter(self.chunks.clone().into_iter().map(Ok));
        match self.end {
            BodyEnd::Finish => chunks.boxed(),
            BodyEnd::Fail => {
                let error = ChatwireError::Transport(self.body_error.clone());
                chunks.chain(stream::once(async move { Err(error) })).boxed()
            }
            BodyEnd::Pending => chunks.chain(stream::pending()).boxed(),
        }
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn fetch(
        &self,
        url: &str,
        options: FetchOptions,
        cancel: CancellationToken,
    ) -> Result<HttpResponse> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(RecordedRequest {
                url: url.to_string(),
                options,
                cancel: cancel.clone(),
            });

        if let Some(message) = &self.failure {
            return Err(ChatwireError::Transport(message.clone()));
        }

        if self.hang_before_response {
            cancel.cancelled().await;
            return Err(ChatwireError::Cancelled);
        }

        let metadata = ResponseMetadata {
            status: self.status,
            status_text: status_text(self.status).to_string(),
            headers: self.headers.clone(),
        };
        Ok(HttpResponse::new(
            metadata,
            with_cancellation(self.scripted_body(), cancel),
        ))
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

fn status_text(status: u16) -> &'static str {
    match status {
        200 => "OK",
        400 => "Bad Request",
        401 => "Unauthorized",
        404 => "Not Found",
        429 => "Too Many Requests",
        500 => "Internal Server Error",
        _ => "",
    }
}

/// SSE body with one `data:` event per payload followed by `[DONE]`
pub fn sse_body(payloads: &[serde_json::Value]) -> String {
    let mut body = String::new();
    for payload in payloads {
        body.push_str("data: ");
        body.push_str(&payload.to_string());
        body.push_str("\n\n");
    }
    body.push_str("data: [DONE]\n\n");
    body
}

/// OpenAI-style streaming events carrying the given content deltas
pub fn openai_sse(deltas: &[&str]) -> String {
    let events: Vec<serde_json::Value> = deltas
        .iter()
        .map(|d| serde_json::json!({"choices": [{"index": 0, "delta": {"content": d}}]}))
        .collect();
    sse_body(&events)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scripted_body_in_order() {
        let transport = ScriptedTransport::new().with_chunks(["a", "b"]);
        let response = transport
            .fetch("u", FetchOptions::default(), CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(response.text().await.unwrap(), "ab");
        assert_eq!(transport.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_body_error_after_chunks() {
        let transport = ScriptedTransport::new()
            .with_chunks(["a"])
            .with_body_error("reset");
        let response = transport
            .fetch("u", FetchOptions::default(), CancellationToken::new())
            .await
            .unwrap();

        assert!(matches!(
            response.text().await,
            Err(ChatwireError::Transport(m)) if m == "reset"
        ));
    }

    #[tokio::test]
    async fn test_hanging_response_ends_on_cancel() {
        let transport = ScriptedTransport::new().with_hanging_response();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = transport.fetch("u", FetchOptions::default(), cancel).await;
        assert!(matches!(result, Err(ChatwireError::Cancelled)));
    }

    #[test]
    fn test_openai_sse_shape() {
        let body = openai_sse(&["Hi"]);
        assert!(body.starts_with("data: {"));
        assert!(body.ends_with("data: [DONE]\n\n"));
    }
}
