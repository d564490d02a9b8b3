use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{ChatwireError, Result};
use crate::provider::{ChatOptions, ProviderConfig, ProviderId};

/// Main configuration structure for Chatwire
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Chat history and session behaviour
    #[serde(default)]
    pub session: SessionConfig,
    /// Per-provider settings, keyed by provider name
    #[serde(default)]
    pub providers: BTreeMap<ProviderId, ProviderSettings>,
    /// HTTP client used for direct and relayed requests
    #[serde(default)]
    pub proxy: ProxyConfig,
}

/// Session configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Directory holding the chat history file
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// Persist messages between runs
    #[serde(default = "default_history_enabled")]
    pub history_enabled: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            history_enabled: default_history_enabled(),
        }
    }
}

impl SessionConfig {
    pub fn history_path(&self) -> PathBuf {
        self.data_dir.join("chat_history.json")
    }
}

fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .map(|h| h.join(".chatwire"))
        .unwrap_or_else(|| PathBuf::from(".chatwire"))
}

fn default_history_enabled() -> bool {
    true
}

/// Settings for one provider; anything unset falls back to the provider default
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct ProviderSettings {
    /// Whether sends to this provider are allowed; unset means only OpenAI is on
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    /// Models offered for this provider
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub models: Vec<String>,
    /// API key; takes precedence over `api_key_env`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Environment variable holding the API key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    /// Extra headers sent with every request to this provider
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
}

/// HTTP client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyConfig {
    /// User-Agent header for outgoing requests
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    /// TCP connect timeout in seconds
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            user_agent: default_user_agent(),
            connect_timeout_secs: default_connect_timeout_secs(),
        }
    }
}

fn default_user_agent() -> String {
    format!("chatwire/{}", env!("CARGO_PKG_VERSION"))
}

fn default_connect_timeout_secs() -> u64 {
    10
}

impl Config {
    /// Config file candidates in search order when no path is given
    pub fn default_paths() -> Vec<PathBuf> {
        [
            dirs::home_dir().map(|h| h.join(".chatwire").join("config.toml")),
            dirs::config_dir().map(|c| c.join("chatwire").join("config.toml")),
            Some(PathBuf::from("config.toml")),
        ]
        .into_iter()
        .flatten()
        .collect()
    }

    /// The file `load` would read, if any
    pub fn find_path(explicit: Option<&Path>) -> Option<PathBuf> {
        match explicit {
            Some(path) => Some(path.to_path_buf()),
            None => Self::default_paths().into_iter().find(|p| p.exists()),
        }
    }

    /// Load from `explicit`, else the first default path that exists, else defaults
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        match Self::find_path(explicit) {
            Some(path) => {
                tracing::info!("Loading config from: {}", path.display());
                Self::from_file(&path)
            }
            None => {
                tracing::info!("No config file found, using defaults");
                Ok(Self::default())
            }
        }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ChatwireError::Config(format!(
                "Failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;
        toml::from_str(&content)
            .map_err(|e| ChatwireError::Config(format!("Failed to parse config: {e}")))
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| ChatwireError::Serialization(format!("Failed to render config: {e}")))
    }

    fn settings(&self, id: ProviderId) -> ProviderSettings {
        self.providers.get(&id).cloned().unwrap_or_default()
    }

    pub fn is_enabled(&self, id: ProviderId) -> bool {
        self.providers
            .get(&id)
            .and_then(|s| s.enabled)
            .unwrap_or_else(|| id.enabled_by_default())
    }

    /// Configured model list for `id`, or the built-in catalog when none is set
    pub fn models(&self, id: ProviderId) -> Vec<String> {
        match self.providers.get(&id) {
            Some(settings) if !settings.models.is_empty() => settings.models.clone(),
            _ => id.default_models().iter().map(|m| m.to_string()).collect(),
        }
    }

    /// Name of the environment variable that supplies the key for `id`
    pub fn api_key_env(&self, id: ProviderId) -> Option<String> {
        self.settings(id)
            .api_key_env
            .or_else(|| id.default_api_key_env().map(|s| s.to_string()))
    }

    /// Explicit connection settings for `id`, reading the key from the environment if needed
    pub fn resolve_provider(&self, id: ProviderId) -> Result<ProviderConfig> {
        let settings = self.settings(id);

        let base_url = settings
            .base_url
            .clone()
            .unwrap_or_else(|| id.default_base_url().to_string());
        validate_base_url(id, &base_url)?;

        let api_key = settings.api_key.clone().or_else(|| {
            self.api_key_env(id)
                .and_then(|var| std::env::var(var).ok())
                .filter(|k| !k.is_empty())
        });

        Ok(ProviderConfig {
            api_key,
            base_url,
            headers: settings.headers,
            enabled: self.is_enabled(id),
        })
    }

    /// Resolve every provider, failing on the first invalid one
    pub fn resolve_all(&self) -> Result<BTreeMap<ProviderId, ProviderConfig>> {
        ProviderId::ALL
            .into_iter()
            .map(|id| Ok((id, self.resolve_provider(id)?)))
            .collect()
    }

    /// Chat options seeded from this provider's settings
    pub fn chat_options(&self, id: ProviderId) -> ChatOptions {
        let settings = self.settings(id);
        let mut options =
            ChatOptions::new(settings.model.unwrap_or_else(|| id.default_model().to_string()));
        options.temperature = settings.temperature;
        options.max_tokens = settings.max_tokens;
        options
    }

    /// Check every provider's settings without touching the network
    pub fn validate(&self) -> Result<()> {
        for (id, settings) in &self.providers {
            if let Some(base_url) = &settings.base_url {
                validate_base_url(*id, base_url)?;
            }
            if let Some(temperature) = settings.temperature {
                if !(0.0..=2.0).contains(&temperature) {
                    return Err(ChatwireError::Config(format!(
                        "Temperature for {id} must be between 0 and 2, got {temperature}"
                    )));
                }
            }
            if settings.models.iter().any(|m| m.trim().is_empty()) {
                return Err(ChatwireError::Config(format!(
                    "Model names for {id} must not be empty"
                )));
            }
            if settings.max_tokens == Some(0) {
                return Err(ChatwireError::Config(format!(
                    "max_tokens for {id} must be greater than 0"
                )));
            }
        }
        Ok(())
    }
}

fn validate_base_url(id: ProviderId, base_url: &str) -> Result<()> {
    let url = Url::parse(base_url).map_err(|e| {
        ChatwireError::Config(format!("Invalid base URL for {id} '{base_url}': {e}"))
    })?;
    let scheme = url.scheme();
    if scheme != "http" && scheme != "https" {
        return Err(ChatwireError::Config(format!(
            "Unsupported URL scheme '{scheme}' for {id}: only http and https are allowed"
        )));
    }
    Ok(())
}
