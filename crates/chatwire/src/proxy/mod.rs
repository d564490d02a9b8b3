//! Cross-context fetch relay
//!
//! A [`ProxyBridge`] in one context and a [`ProxyExecutor`] in another turn a
//! sequence of port messages into one streaming HTTP response:
//!
//! ```text
//! bridge                              executor
//!   | -- {url, options} ------------->  |  fetch(url, options, token)
//!   | <-------------------- METADATA -- |
//!   | <------------------- BODY_CHUNK -- |  (zero or more)
//!   | <-------- BODY_CHUNK done=true -- |
//! ```
//!
//! An `ERROR` message may replace the remainder at any point. A disconnect
//! from either side tears the channel down; on the executor side that
//! cancels the network call.

mod bridge;
mod executor;
mod message;
mod port;

pub use bridge::ProxyBridge;
pub use executor::ProxyExecutor;
pub use message::{ProxyMessage, ProxyRequest};
pub use port::{Connector, LinkConnector, Port, PortListener, PortReceiver, PortSender, link};
