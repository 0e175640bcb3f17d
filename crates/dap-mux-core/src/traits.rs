//! Identifiers and transport-facing traits.

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::protocol::{ProtocolMessage, Request};

/// Session identifier.
pub type SessionId = Uuid;

/// Identifies where a session's outgoing messages are delivered.
pub type ConsumerId = Uuid;

/// Transport error.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Connection closed")]
    Closed,
    #[error("Invalid frame: {0}")]
    InvalidFrame(String),
    #[error("Consumer not connected: {0}")]
    UnknownConsumer(ConsumerId),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// The single connection to the real debug adapter.
///
/// Requests handed to `send` already carry shared sequence numbers.
#[async_trait]
pub trait AdapterSink: Send + Sync {
    /// Send a request upstream.
    async fn send(&self, request: Request) -> Result<(), TransportError>;
}

/// Delivery endpoint of one consumer.
#[async_trait]
pub trait ConsumerSink: Send + Sync {
    /// Deliver a message addressed with this consumer's own numbers.
    async fn deliver(&self, message: ProtocolMessage) -> Result<(), TransportError>;
}
