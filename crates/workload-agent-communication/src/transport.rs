//! Transport abstraction for channel connections.

use async_trait::async_trait;
use thiserror::Error;

use crate::message::Message;

/// Transport error.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Framing error: {0}")]
    Codec(#[from] tokio_util::codec::LinesCodecError),
    #[error("Invalid frame: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Connection closed by peer")]
    Closed,
    #[error("Remote error: {0}")]
    Remote(String),
    #[error("Connection failed: {0}")]
    Connect(String),
}

/// Options for opening a connection.
#[derive(Debug, Clone, Default)]
pub struct ConnectOptions {
    /// Endpoint override. `None` uses the transport default.
    pub endpoint: Option<String>,
}

impl ConnectOptions {
    /// Options for `endpoint`, where an empty string means the default endpoint.
    #[must_use]
    pub fn for_endpoint(endpoint: &str) -> Self {
        Self {
            endpoint: Some(endpoint.to_string()).filter(|e| !e.is_empty()),
        }
    }
}

/// Opens connections to a named channel.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Live connection type.
    type Connection: Connection;

    /// Open a connection on `channel`.
    async fn connect(
        &self,
        channel: &str,
        regional: bool,
        options: &ConnectOptions,
    ) -> Result<Self::Connection, TransportError>;
}

/// A live channel connection.
///
/// `receive` must be cancel safe: dropping a pending `receive` future must
/// not lose a message that was already read.
#[async_trait]
pub trait Connection: Send {
    /// Wait for the next message.
    async fn receive(&mut self) -> Result<Message, TransportError>;

    /// Send a message.
    async fn send(&mut self, message: Message) -> Result<(), TransportError>;
}
