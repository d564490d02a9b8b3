//! Chat session controller
//!
//! Owns the ordered message list and at most one in-flight send. Every
//! state change is published to subscribers as a [`SessionSnapshot`] and
//! written to the history store.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::history::{HistoryStore, JsonFileStore};
use super::message::Message;
use super::writer::HistoryWriter;
use crate::config::Config;
use crate::error::{ChatwireError, Result};
use crate::provider::{ChatOptions, CompletionRequest, ProviderConfig, ProviderId, ProviderRegistry};
use crate::transport::Transport;

/// Published view of the session
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionSnapshot {
    pub messages: Vec<Message>,
    pub streaming: bool,
    /// Increments on every published change
    pub version: u64,
}

/// How a send ended when it did not fail
#[derive(Debug, Clone, PartialEq)]
pub enum SendOutcome {
    /// The finalized assistant message
    Completed(Message),
    /// Stopped by `stop_streaming`; the pending message was removed
    Cancelled,
}

#[derive(Debug, Default)]
struct SessionState {
    messages: Vec<Message>,
    streaming: bool,
    active_cancel: Option<CancellationToken>,
    version: u64,
}

pub struct ChatSessionController {
    registry: ProviderRegistry,
    transport: Arc<dyn Transport>,
    providers: BTreeMap<ProviderId, ProviderConfig>,
    history: Option<HistoryWriter>,
    state: Mutex<SessionState>,
    publisher: watch::Sender<SessionSnapshot>,
}

impl ChatSessionController {
    pub fn new(
        registry: ProviderRegistry,
        transport: Arc<dyn Transport>,
        providers: BTreeMap<ProviderId, ProviderConfig>,
    ) -> Self {
        let (publisher, _) = watch::channel(SessionSnapshot::default());
        Self {
            registry,
            transport,
            providers,
            history: None,
            state: Mutex::new(SessionState::default()),
            publisher,
        }
    }

    /// Controller with the default adapters, provider settings resolved once
    /// from `config`, and file-backed history when enabled
    pub fn from_config(config: &Config, transport: Arc<dyn Transport>) -> Result<Self> {
        let controller = Self::new(
            ProviderRegistry::with_defaults(),
            transport,
            config.resolve_all()?,
        );

        if config.session.history_enabled {
            let store = JsonFileStore::new(config.session.history_path());
            Ok(controller.with_history_store(Arc::new(store)))
        } else {
            Ok(controller)
        }
    }

    /// Attach a store and restore the messages it holds
    ///
    /// Messages still marked pending belong to a send that never finished and
    /// are dropped.
    pub fn with_history_store(mut self, store: Arc<dyn HistoryStore>) -> Self {
        let restored = match store.load() {
            Ok(messages) => messages,
            Err(e) => {
                warn!(error = %e, "Failed to load chat history, starting empty");
                Vec::new()
            }
        };

        let total = restored.len();
        let messages: Vec<Message> = restored.into_iter().filter(|m| !m.pending).collect();
        if messages.len() != total {
            debug!(dropped = total - messages.len(), "Dropped unfinished messages from history");
        }
        info!(count = messages.len(), "Restored chat history");

        self.history = Some(HistoryWriter::start(store));
        {
            let mut state = self.lock();
            state.messages = messages;
            self.publish(&mut state);
        }
        self
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    pub fn provider_config(&self, id: ProviderId) -> Option<&ProviderConfig> {
        self.providers.get(&id)
    }

    pub fn messages(&self) -> Vec<Message> {
        self.lock().messages.clone()
    }

    pub fn is_streaming(&self) -> bool {
        self.lock().streaming
    }

    /// Receive a snapshot after every change
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.publisher.subscribe()
    }

    /// Send one user message and stream the assistant reply
    ///
    /// Fails with [`ChatwireError::Busy`] without touching the message list if
    /// a send is already in flight. A stop request resolves to
    /// [`SendOutcome::Cancelled`].
    pub async fn send_message(
        &self,
        content: &str,
        provider: ProviderId,
        options: ChatOptions,
    ) -> Result<SendOutcome> {
        if self.is_streaming() {
            return Err(ChatwireError::Busy);
        }

        let adapter = self.registry.get(provider)?;
        let config = self
            .providers
            .get(&provider)
            .cloned()
            .unwrap_or_else(|| ProviderConfig::new(provider.default_base_url()));
        if !config.enabled {
            return Err(ChatwireError::ProviderDisabled(provider.to_string()));
        }

        let cancel = CancellationToken::new();
        let user = Message::user(content, provider, options.model.clone());
        let pending = Message::pending_assistant(provider, options.model.clone());
        let (user_id, pending_id) = (user.id, pending.id);

        {
            let mut state = self.lock();
            if state.streaming {
                return Err(ChatwireError::Busy);
            }
            state.messages.push(user);
            self.publish(&mut state);

            state.messages.push(pending);
            state.streaming = true;
            state.active_cancel = Some(cancel.clone());
            self.publish(&mut state);
        }

        info!(provider = %provider, model = %options.model, "Sending message");

        let guard = SendGuard {
            controller: self,
            user_id,
            pending_id,
            cancel: cancel.clone(),
            armed: true,
        };

        let request = CompletionRequest {
            content,
            options: &options,
            config: &config,
            cancel: cancel.clone(),
        };
        let delta_cancel = cancel.clone();
        let mut on_delta = |delta: &str| {
            if !delta_cancel.is_cancelled() {
                self.append_delta(pending_id, delta);
            }
        };

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(ChatwireError::Cancelled),
            result = adapter.complete(self.transport.as_ref(), request, &mut on_delta) => result,
        };

        let outcome = match result {
            Ok(content) if !cancel.is_cancelled() => match guard.complete(content) {
                Some(message) => {
                    info!(provider = %provider, chars = message.content.len(), "Message completed");
                    Ok(SendOutcome::Completed(message))
                }
                None => Ok(SendOutcome::Cancelled),
            },
            Ok(_) | Err(ChatwireError::Cancelled) => {
                guard.abandon(None);
                info!(provider = %provider, "Message cancelled");
                Ok(SendOutcome::Cancelled)
            }
            Err(e) => {
                warn!(provider = %provider, error = %e, category = e.category(), "Message failed");
                guard.abandon(Some(e.to_string()));
                Err(e)
            }
        };

        self.flush_history().await;
        outcome
    }

    /// Wait until the history store holds the current message list
    pub async fn flush_history(&self) {
        if let Some(history) = &self.history {
            let version = self.lock().version;
            history.flush(version).await;
        }
    }

    /// Cancel the in-flight send, if any
    pub fn stop_streaming(&self) {
        let token = self.lock().active_cancel.clone();
        if let Some(token) = token {
            debug!("Stopping active stream");
            token.cancel();
        }
    }

    /// Remove every message; rejected while a send is in flight
    pub fn clear_history(&self) -> Result<()> {
        {
            let mut state = self.lock();
            if state.streaming {
                return Err(ChatwireError::Busy);
            }
            state.messages.clear();
            self.publish(&mut state);
        }
        info!("Cleared chat history");
        Ok(())
    }

    fn append_delta(&self, pending_id: Uuid, delta: &str) {
        self.update(|state| {
            if let Some(message) = state.messages.iter_mut().find(|m| m.id == pending_id) {
                message.content.push_str(delta);
            }
        });
    }

    fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Publish the current state and queue it for the history store
    ///
    /// Called with the state lock held so snapshots reach both in version order.
    fn publish(&self, state: &mut SessionState) {
        state.version += 1;
        let messages = state.messages.clone();
        if let Some(history) = &self.history {
            history.submit(state.version, messages.clone());
        }
        self.publisher.send_replace(SessionSnapshot {
            messages,
            streaming: state.streaming,
            version: state.version,
        });
    }

    fn update<R>(&self, mutate: impl FnOnce(&mut SessionState) -> R) -> R {
        let mut state = self.lock();
        let result = mutate(&mut state);
        self.publish(&mut state);
        result
    }
}

/// Ends the in-flight send; if dropped without an explicit end, the send
/// future was dropped and the pending message is removed
struct SendGuard<'a> {
    controller: &'a ChatSessionController,
    user_id: Uuid,
    pending_id: Uuid,
    cancel: CancellationToken,
    armed: bool,
}

impl SendGuard<'_> {
    /// Finalize the pending message with the full content
    fn complete(mut self, content: String) -> Option<Message> {
        self.armed = false;
        let pending_id = self.pending_id;
        self.controller.update(|state| {
            state.streaming = false;
            state.active_cancel = None;
            let message = state.messages.iter_mut().find(|m| m.id == pending_id)?;
            message.content = content;
            message.pending = false;
            Some(message.clone())
        })
    }

    /// Remove the pending message, recording `error` on the user message
    fn abandon(mut self, error: Option<String>) {
        self.armed = false;
        self.discard(error);
    }

    fn discard(&self, error: Option<String>) {
        let (user_id, pending_id) = (self.user_id, self.pending_id);
        self.controller.update(|state| {
            state.messages.retain(|m| m.id != pending_id);
            if let Some(error) = error {
                if let Some(user) = state.messages.iter_mut().find(|m| m.id == user_id) {
                    user.error = Some(error);
                }
            }
            state.streaming = false;
            state.active_cancel = None;
        });
    }
}

impl Drop for SendGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            debug!("Send dropped before finishing, cleaning up");
            self.cancel.cancel();
            self.discard(None);
        }
    }
}
