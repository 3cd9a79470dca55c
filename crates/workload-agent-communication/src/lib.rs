//! Communication with the Agent Communication Service (ACS).
//!
//! Provides:
//! - Message model (labels + typed body)
//! - `ExponentialBackoff` - Deterministic retry delays
//! - `Transport` / `Connection` traits and a TCP JSON-lines transport (feature: tcp)
//! - `ChannelSession` - Reconnecting receive/dispatch/acknowledge loop

pub mod backoff;
pub mod handler;
pub mod message;
pub mod session;
pub mod transport;

#[cfg(feature = "tcp")]
pub mod tcp;

pub use backoff::{Backoff, ExponentialBackoff};
pub use handler::{EchoHandler, HandlerError, MessageHandler};
pub use message::{Body, Message, OperationState};
pub use session::{ChannelSession, CommunicationError, communicate};
pub use transport::{ConnectOptions, Connection, Transport, TransportError};

#[cfg(feature = "tcp")]
pub use tcp::{FramedConnection, TcpTransport};
