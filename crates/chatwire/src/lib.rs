//! Chatwire - streaming transport layer for multi-provider LLM chat
//!
//! This crate turns provider wire formats (SSE framing, streamed JSON arrays)
//! into ordered text deltas, relays HTTP calls across isolated execution
//! contexts over message ports, and drives one chat send at a time with
//! cancellation.

pub mod config;
pub mod decoder;
pub mod error;
pub mod provider;
pub mod proxy;
pub mod session;
pub mod testing;
pub mod transport;

pub use error::{ChatwireError, Result};
