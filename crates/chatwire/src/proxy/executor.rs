//! Server side of the proxy channel
//!
//! The executor lives in the context that holds the network session. It
//! accepts channels, performs the real request for each one and streams the
//! response back. A channel disconnect cancels its request.

use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use futures::StreamExt;
use tokio::task::AbortHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::message::{ProxyMessage, ProxyRequest};
use super::port::{Port, PortListener, PortSender};
use crate::error::ChatwireError;
use crate::transport::{HttpResponse, Transport, Utf8Decoder};

struct ChannelEntry {
    cancel: CancellationToken,
    task: Option<AbortHandle>,
}

/// Performs proxied requests and owns the per-channel cancellation state
pub struct ProxyExecutor {
    transport: Arc<dyn Transport>,
    channels: DashMap<String, ChannelEntry>,
}

impl ProxyExecutor {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            channels: DashMap::new(),
        }
    }

    /// Number of channels with a request still in flight
    pub fn active_channels(&self) -> usize {
        self.channels.len()
    }

    /// Accept channels until every connector has gone away
    pub async fn serve(self: Arc<Self>, mut listener: PortListener) {
        info!(transport = self.transport.name(), "Proxy executor listening");
        while let Some(port) = listener.accept().await {
            Arc::clone(&self).accept(port);
        }
        info!("Proxy executor stopped: no more connectors");
    }

    /// Start serving one channel in the background
    pub fn accept(self: Arc<Self>, port: Port) {
        let name = port.name().to_string();
        let cancel = CancellationToken::new();

        match self.channels.entry(name.clone()) {
            Entry::Occupied(_) => {
                warn!(channel = %name, "Rejecting duplicate proxy channel name");
                let _ = port.post(&ProxyMessage::Error {
                    message: format!("Duplicate proxy channel '{name}'"),
                });
                return;
            }
            Entry::Vacant(slot) => {
                slot.insert(ChannelEntry {
                    cancel: cancel.clone(),
                    task: None,
                });
            }
        }

        let executor = Arc::clone(&self);
        let task_name = name.clone();
        let handle = tokio::spawn(async move {
            executor.run_channel(port, cancel).await;
            executor.teardown(&task_name);
        });

        if let Some(mut entry) = self.channels.get_mut(&name) {
            entry.task = Some(handle.abort_handle());
        }
    }

    /// Remove one channel and cancel its request
    fn teardown(&self, name: &str) {
        if let Some((_, entry)) = self.channels.remove(name) {
            entry.cancel.cancel();
            debug!(channel = %name, "Proxy channel torn down");
        }
    }

    /// Cancel every in-flight channel
    pub fn shutdown(&self) {
        let names: Vec<String> = self.channels.iter().map(|e| e.key().clone()).collect();
        for name in names {
            if let Some((_, entry)) = self.channels.remove(&name) {
                entry.cancel.cancel();
                if let Some(task) = entry.task {
                    task.abort();
                }
            }
        }
    }

    async fn run_channel(&self, port: Port, cancel: CancellationToken) {
        let (sender, mut receiver) = port.into_split();
        let channel = receiver.name().to_string();

        let Some(first) = receiver.recv().await else {
            debug!(channel = %channel, "Proxy channel closed before sending a request");
            return;
        };

        let request: ProxyRequest = match serde_json::from_value(first) {
            Ok(request) => request,
            Err(e) => {
                warn!(channel = %channel, error = %e, "Malformed proxy request");
                let _ = sender.post(&ProxyMessage::Error {
                    message: format!("Malformed proxy request: {e}"),
                });
                return;
            }
        };

        debug!(channel = %channel, url = %request.url, "Relaying proxied request");

        // Anything the client sends after the request is ignored; the queue
        // ending means the client went away.
        let disconnected = async { while receiver.recv().await.is_some() {} };

        tokio::select! {
            _ = self.relay(&request, &sender, cancel.clone()) => {}
            _ = disconnected => {
                debug!(channel = %channel, "Proxy client disconnected, cancelling request");
                cancel.cancel();
            }
        }
    }

    async fn relay(&self, request: &ProxyRequest, sender: &PortSender, cancel: CancellationToken) {
        let response = match self
            .transport
            .fetch(&request.url, request.options.clone(), cancel)
            .await
        {
            Ok(response) => response,
            Err(e) => {
                warn!(url = %request.url, error = %e, "Proxied request failed");
                let _ = sender.post(&ProxyMessage::Error {
                    message: error_message(&e),
                });
                return;
            }
        };

        let HttpResponse { metadata, mut body } = response;
        if sender.post(&ProxyMessage::Metadata { metadata }).is_err() {
            return;
        }

        let mut text = Utf8Decoder::new();
        while let Some(chunk) = body.next().await {
            match chunk {
                Ok(bytes) => {
                    let decoded = text.decode(&bytes);
                    if !decoded.is_empty() && sender.post(&ProxyMessage::chunk(decoded)).is_err() {
                        return;
                    }
                }
                Err(e) => {
                    warn!(url = %request.url, error = %e, "Proxied body read failed");
                    let _ = sender.post(&ProxyMessage::Error {
                        message: error_message(&e),
                    });
                    return;
                }
            }
        }

        let tail = text.finish();
        if !tail.is_empty() {
            let _ = sender.post(&ProxyMessage::chunk(tail));
        }
        let _ = sender.post(&ProxyMessage::done());
    }
}

fn error_message(error: &ChatwireError) -> String {
    match error {
        ChatwireError::Transport(message) => message.clone(),
        other => other.to_string(),
    }
}
