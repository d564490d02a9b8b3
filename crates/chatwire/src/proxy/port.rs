//! Named bidirectional message ports between two execution contexts
//!
//! A port pair is two FIFO queues of JSON values. Dropping or disconnecting
//! one side is observed by the other as the end of its receive queue.

use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use crate::error::{ChatwireError, Result};

/// One end of a named channel
#[derive(Debug)]
pub struct Port {
    name: String,
    tx: Option<UnboundedSender<Value>>,
    rx: UnboundedReceiver<Value>,
}

impl Port {
    /// Create two connected ends sharing `name`
    pub fn pair(name: impl Into<String>) -> (Port, Port) {
        let name = name.into();
        let (a_tx, b_rx) = mpsc::unbounded_channel();
        let (b_tx, a_rx) = mpsc::unbounded_channel();
        (
            Port {
                name: name.clone(),
                tx: Some(a_tx),
                rx: a_rx,
            },
            Port {
                name,
                tx: Some(b_tx),
                rx: b_rx,
            },
        )
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Send one message; fails once either side has disconnected
    pub fn post<T: Serialize>(&self, message: &T) -> Result<()> {
        let tx = self
            .tx
            .as_ref()
            .ok_or_else(|| ChatwireError::Transport(format!("Port '{}' is disconnected", self.name)))?;
        post_value(tx, &self.name, message)
    }

    /// Next message, or `None` once the peer has disconnected and the queue is drained
    pub async fn recv(&mut self) -> Option<Value> {
        self.rx.recv().await
    }

    pub fn disconnect(&mut self) {
        self.tx = None;
        self.rx.close();
    }

    pub fn is_connected(&self) -> bool {
        self.tx.as_ref().is_some_and(|tx| !tx.is_closed())
    }

    /// Split into independently owned send and receive halves
    pub fn into_split(self) -> (PortSender, PortReceiver) {
        (
            PortSender {
                name: self.name.clone(),
                tx: self.tx,
            },
            PortReceiver {
                name: self.name,
                rx: self.rx,
            },
        )
    }
}

fn post_value<T: Serialize>(tx: &UnboundedSender<Value>, name: &str, message: &T) -> Result<()> {
    let value = serde_json::to_value(message)?;
    tx.send(value)
        .map_err(|_| ChatwireError::Transport(format!("Port '{name}' peer has disconnected")))
}

/// Sending half of a split [`Port`]
#[derive(Debug, Clone)]
pub struct PortSender {
    name: String,
    tx: Option<UnboundedSender<Value>>,
}

impl PortSender {
    pub fn post<T: Serialize>(&self, message: &T) -> Result<()> {
        let tx = self
            .tx
            .as_ref()
            .ok_or_else(|| ChatwireError::Transport(format!("Port '{}' is disconnected", self.name)))?;
        post_value(tx, &self.name, message)
    }

    /// Resolves once the peer has stopped receiving
    pub async fn closed(&self) {
        if let Some(tx) = &self.tx {
            tx.closed().await;
        }
    }
}

/// Receiving half of a split [`Port`]
#[derive(Debug)]
pub struct PortReceiver {
    name: String,
    rx: UnboundedReceiver<Value>,
}

impl PortReceiver {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub async fn recv(&mut self) -> Option<Value> {
        self.rx.recv().await
    }
}

/// Opens new channels towards the executing context
pub trait Connector: Send + Sync {
    fn connect(&self, name: &str) -> Result<Port>;
}

/// In-process connector handing the remote end of each channel to a [`PortListener`]
#[derive(Debug, Clone)]
pub struct LinkConnector {
    tx: UnboundedSender<Port>,
}

impl Connector for LinkConnector {
    fn connect(&self, name: &str) -> Result<Port> {
        let (local, remote) = Port::pair(name);
        self.tx
            .send(remote)
            .map_err(|_| ChatwireError::Transport("Proxy executor is not listening".to_string()))?;
        Ok(local)
    }
}

/// Receives channels opened by a [`LinkConnector`]
#[derive(Debug)]
pub struct PortListener {
    rx: UnboundedReceiver<Port>,
}

impl PortListener {
    /// Next inbound channel, or `None` once every connector is gone
    pub async fn accept(&mut self) -> Option<Port> {
        self.rx.recv().await
    }
}

/// Create a connected connector/listener pair
pub fn link() -> (LinkConnector, PortListener) {
    let (tx, rx) = mpsc::unbounded_channel();
    (LinkConnector { tx }, PortListener { rx })
}
