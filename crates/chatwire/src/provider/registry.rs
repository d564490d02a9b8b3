use std::collections::HashMap;
use std::sync::Arc;

use super::{
    AnthropicAdapter, GoogleAdapter, OllamaAdapter, OpenAiCompatible, ProviderAdapter, ProviderId,
};
use crate::error::{ChatwireError, Result};

/// Adapters keyed by provider
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    adapters: HashMap<ProviderId, Arc<dyn ProviderAdapter>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in adapter for every provider
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(OpenAiCompatible::openai()));
        registry.register(Arc::new(AnthropicAdapter));
        registry.register(Arc::new(GoogleAdapter));
        registry.register(Arc::new(OpenAiCompatible::mistral()));
        registry.register(Arc::new(OllamaAdapter));
        registry.register(Arc::new(OpenAiCompatible::openrouter()));
        registry
    }

    /// Add or replace the adapter for its provider
    pub fn register(&mut self, adapter: Arc<dyn ProviderAdapter>) {
        self.adapters.insert(adapter.id(), adapter);
    }

    pub fn get(&self, id: ProviderId) -> Result<Arc<dyn ProviderAdapter>> {
        self.adapters
            .get(&id)
            .cloned()
            .ok_or_else(|| ChatwireError::UnknownProvider(id.to_string()))
    }

    /// Registered providers in a stable order
    pub fn ids(&self) -> Vec<ProviderId> {
        let mut ids: Vec<ProviderId> = self.adapters.keys().copied().collect();
        ids.sort();
        ids
    }
}
