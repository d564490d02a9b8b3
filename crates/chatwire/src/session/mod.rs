//! Chat sessions: messages, history persistence and the send controller

mod controller;
mod history;
mod message;
mod writer;

pub use controller::{ChatSessionController, SendOutcome, SessionSnapshot};
pub use history::{HISTORY_KEY, HistoryStore, JsonFileStore, MemoryStore};
pub use message::{Author, Message};
