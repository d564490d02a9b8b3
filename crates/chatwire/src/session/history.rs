//! Chat history persistence
//!
//! The whole message list is stored as one JSON array under a fixed key and
//! overwritten on every change.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use tracing::debug;

use super::message::Message;
use crate::error::{ChatwireError, Result};

/// Storage key for the persisted message list
pub const HISTORY_KEY: &str = "chat_history";

/// Somewhere to keep the message list between runs
pub trait HistoryStore: Send + Sync {
    /// Stored messages, or an empty list if nothing has been saved
    fn load(&self) -> Result<Vec<Message>>;

    /// Replace the stored list
    fn save(&self, messages: &[Message]) -> Result<()>;
}

/// JSON file at `<dir>/chat_history.json`
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store inside `dir` using the standard file name
    pub fn in_dir(dir: &Path) -> Self {
        Self::new(dir.join(format!("{HISTORY_KEY}.json")))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Remove the file if it exists
    pub fn clear(&self) -> Result<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

impl HistoryStore for JsonFileStore {
    fn load(&self) -> Result<Vec<Message>> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        if content.trim().is_empty() {
            return Ok(Vec::new());
        }
        serde_json::from_str(&content).map_err(|e| {
            ChatwireError::Storage(format!(
                "Failed to parse history file {}: {e}",
                self.path.display()
            ))
        })
    }

    fn save(&self, messages: &[Message]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let json = serde_json::to_string(messages)?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, &self.path)?;

        debug!(path = %self.path.display(), count = messages.len(), "Saved chat history");
        Ok(())
    }
}

/// In-memory key/value store
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raw stored value for `key`
    pub fn get(&self, key: &str) -> Option<String> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    pub fn set(&self, key: &str, value: String) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), value);
    }
}

impl HistoryStore for MemoryStore {
    fn load(&self) -> Result<Vec<Message>> {
        match self.get(HISTORY_KEY) {
            Some(raw) => serde_json::from_str(&raw)
                .map_err(|e| ChatwireError::Storage(format!("Failed to parse history: {e}"))),
            None => Ok(Vec::new()),
        }
    }

    fn save(&self, messages: &[Message]) -> Result<()> {
        self.set(HISTORY_KEY, serde_json::to_string(messages)?);
        Ok(())
    }
}
