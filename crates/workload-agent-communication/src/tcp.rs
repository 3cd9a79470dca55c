//! TCP transport speaking newline-delimited JSON frames.
//!
//! A connection starts with an `open` frame naming the channel. After that
//! both sides exchange `message` frames; the broker may send an `error` frame
//! before closing.

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::{
    io::{AsyncRead, AsyncWrite},
    net::TcpStream,
};
use tokio_util::codec::{Framed, LinesCodec};
use uuid::Uuid;

use crate::{
    message::Message,
    transport::{ConnectOptions, Connection, Transport, TransportError},
};

/// Largest accepted frame (4 MiB).
const MAX_FRAME_BYTES: usize = 4 * 1024 * 1024;

/// Wire frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Frame {
    /// Bind the connection to a channel.
    Open { channel: String, regional: bool },
    /// Channel message.
    Message(Message),
    /// Error reported by the broker.
    Error { message: String },
}

/// Connection exchanging JSON frames over any byte stream.
pub struct FramedConnection<IO> {
    id: Uuid,
    framed: Framed<IO, LinesCodec>,
}

impl<IO> FramedConnection<IO>
where
    IO: AsyncRead + AsyncWrite + Unpin + Send,
{
    /// Send the `open` frame for `channel` over `io`.
    ///
    /// # Errors
    /// Returns error if the frame cannot be written.
    pub async fn open(io: IO, channel: &str, regional: bool) -> Result<Self, TransportError> {
        let mut conn = Self {
            id: Uuid::new_v4(),
            framed: Framed::new(io, LinesCodec::new_with_max_length(MAX_FRAME_BYTES)),
        };
        conn.write(&Frame::Open {
            channel: channel.to_string(),
            regional,
        })
        .await?;
        Ok(conn)
    }

    /// Identifier of this connection, for logs.
    #[must_use]
    pub const fn id(&self) -> Uuid {
        self.id
    }

    async fn write(&mut self, frame: &Frame) -> Result<(), TransportError> {
        let line = serde_json::to_string(frame)?;
        self.framed.send(line).await?;
        Ok(())
    }
}

#[async_trait]
impl<IO> Connection for FramedConnection<IO>
where
    IO: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn receive(&mut self) -> Result<Message, TransportError> {
        loop {
            let line = match self.framed.next().await {
                Some(line) => line?,
                None => return Err(TransportError::Closed),
            };
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<Frame>(&line)? {
                Frame::Message(message) => return Ok(message),
                Frame::Error { message } => return Err(TransportError::Remote(message)),
                Frame::Open { channel, .. } => {
                    tracing::warn!(connection = %self.id, %channel, "Ignoring unexpected open frame");
                }
            }
        }
    }

    async fn send(&mut self, message: Message) -> Result<(), TransportError> {
        self.write(&Frame::Message(message)).await
    }
}

/// Transport connecting to a broker over TCP.
#[derive(Debug, Clone)]
pub struct TcpTransport {
    default_endpoint: String,
}

impl TcpTransport {
    /// Create a transport using `default_endpoint` (`host:port`) when no
    /// override is given.
    #[must_use]
    pub fn new(default_endpoint: impl Into<String>) -> Self {
        Self {
            default_endpoint: default_endpoint.into(),
        }
    }
}

#[async_trait]
impl Transport for TcpTransport {
    type Connection = FramedConnection<TcpStream>;

    async fn connect(
        &self,
        channel: &str,
        regional: bool,
        options: &ConnectOptions,
    ) -> Result<Self::Connection, TransportError> {
        let endpoint = options
            .endpoint
            .as_deref()
            .unwrap_or(&self.default_endpoint);
        let stream = TcpStream::connect(endpoint)
            .await
            .map_err(|e| TransportError::Connect(format!("{endpoint}: {e}")))?;
        stream.set_nodelay(true)?;
        let conn = FramedConnection::open(stream, channel, regional).await?;
        tracing::debug!(connection = %conn.id(), endpoint, channel, "Opened channel connection");
        Ok(conn)
    }
}

#[cfg(test)]
mod tests {
    use tokio::{
        io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
        net::TcpListener,
    };
    use tokio_test::io::Builder;

    use super::*;
    use crate::message::{Body, OperationState};

    fn line(frame: &Frame) -> Vec<u8> {
        let mut bytes = serde_json::to_vec(frame).unwrap();
        bytes.push(b'\n');
        bytes
    }

    fn open_frame() -> Frame {
        Frame::Open {
            channel: "test-channel".to_string(),
            regional: true,
        }
    }

    #[tokio::test]
    async fn test_receive_and_send() {
        let request = Message::new(
            [("operation_id".to_string(), "op1".to_string())].into(),
            Some(Body::new("type.googleapis.com/example.Echo", &b"hi"[..])),
        );
        let ack = Message::status("op1", OperationState::Succeeded, None);
        let mock = Builder::new()
            .write(&line(&open_frame()))
            .read(&line(&Frame::Message(request.clone())))
            .write(&line(&Frame::Message(ack.clone())))
            .build();

        let mut conn = FramedConnection::open(mock, "test-channel", true).await.unwrap();
        assert_eq!(conn.receive().await.unwrap(), request);
        conn.send(ack).await.unwrap();
        assert!(matches!(conn.receive().await, Err(TransportError::Closed)));
    }

    #[tokio::test]
    async fn test_remote_error_frame() {
        let mock = Builder::new()
            .write(&line(&open_frame()))
            .read(b"\n")
            .read(&line(&Frame::Error {
                message: "channel not registered".to_string(),
            }))
            .build();

        let mut conn = FramedConnection::open(mock, "test-channel", true).await.unwrap();
        match conn.receive().await {
            Err(TransportError::Remote(message)) => assert_eq!(message, "channel not registered"),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_invalid_frame() {
        let mock = Builder::new()
            .write(&line(&open_frame()))
            .read(b"{\"type\":\"bogus\"}\n")
            .build();

        let mut conn = FramedConnection::open(mock, "test-channel", true).await.unwrap();
        assert!(matches!(conn.receive().await, Err(TransportError::Json(_))));
    }

    #[tokio::test]
    async fn test_tcp_transport_connects_to_override() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            let (read, mut write) = socket.into_split();
            let mut lines = BufReader::new(read).lines();

            let open: Frame = serde_json::from_str(&lines.next_line().await.unwrap().unwrap()).unwrap();
            assert!(matches!(open, Frame::Open { ref channel, regional: true } if channel == "test-channel"));

            let request = Message::new([("operation_id".to_string(), "op1".to_string())].into(), None);
            write.write_all(&line(&Frame::Message(request))).await.unwrap();

            let ack: Frame = serde_json::from_str(&lines.next_line().await.unwrap().unwrap()).unwrap();
            ack
        });

        let transport = TcpTransport::new("127.0.0.1:1");
        let options = ConnectOptions::for_endpoint(&addr.to_string());
        let mut conn = transport.connect("test-channel", true, &options).await.unwrap();

        let request = conn.receive().await.unwrap();
        assert_eq!(request.operation_id(), Some("op1"));
        conn.send(Message::status("op1", OperationState::Succeeded, None))
            .await
            .unwrap();

        match server.await.unwrap() {
            Frame::Message(ack) => assert_eq!(ack.state(), Some("SUCCEEDED")),
            other => panic!("unexpected frame: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_tcp_transport_connect_failure() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let transport = TcpTransport::new(addr.to_string());
        let result = transport
            .connect("test-channel", true, &ConnectOptions::default())
            .await;
        assert!(matches!(result, Err(TransportError::Connect(_))));
    }
}
