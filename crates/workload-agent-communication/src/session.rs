//! Reconnecting channel session.
//!
//! A [`ChannelSession`] keeps one connection open to the broker, hands every
//! inbound message to a [`MessageHandler`] and answers with a status message
//! carrying the same `operation_id`. Messages are processed one at a time in
//! receive order: the status for a message is sent before the next receive.
//!
//! | Failure                    | Action                                  |
//! |----------------------------|-----------------------------------------|
//! | connect fails              | back off, retry the connect             |
//! | receive fails / no labels  | back off, open a new connection         |
//! | no `operation_id` label    | back off, keep the connection           |
//! | handler fails              | acknowledge with `FAILED`               |
//! | status send fails          | record the error, keep going            |
//!
//! Cancellation is observed at the top of every iteration, while waiting for
//! a message and during every backoff sleep. A running handler or status send
//! is not interrupted.

use thiserror::Error;
use tokio_util::sync::CancellationToken;
use workload_agent_core::CloudProperties;

use crate::{
    backoff::{Backoff, ExponentialBackoff},
    handler::MessageHandler,
    message::{Body, Message, OperationState},
    transport::{ConnectOptions, Connection, Transport, TransportError},
};

/// Failure recorded by the session loop.
///
/// None of these stop the loop; the most recent one is returned once the
/// session is cancelled.
#[derive(Debug, Error)]
pub enum CommunicationError {
    #[error("failed to establish connection to ACS: {0}")]
    Connect(#[source] TransportError),
    #[error("error receiving message from ACS: {0}")]
    Receive(#[source] TransportError),
    #[error("no labels in message received from ACS")]
    MissingLabels,
    #[error("no operation_id label in message")]
    MissingOperationId,
    #[error("error sending status message via ACS: {0}")]
    SendStatus(#[source] TransportError),
}

/// Reconnecting receive/dispatch/acknowledge loop on one channel.
pub struct ChannelSession<T, B = ExponentialBackoff> {
    transport: T,
    endpoint: String,
    channel: String,
    backoff: B,
}

impl<T: Transport> ChannelSession<T> {
    /// Create a session with the default backoff (2s doubling up to 1h).
    ///
    /// An empty `endpoint` uses the transport's default endpoint.
    #[must_use]
    pub fn new(transport: T, endpoint: impl Into<String>, channel: impl Into<String>) -> Self {
        Self::with_backoff(transport, endpoint, channel, ExponentialBackoff::default())
    }
}

impl<T: Transport, B: Backoff> ChannelSession<T, B> {
    /// Create a session with a custom backoff policy.
    #[must_use]
    pub fn with_backoff(
        transport: T,
        endpoint: impl Into<String>,
        channel: impl Into<String>,
        backoff: B,
    ) -> Self {
        Self {
            transport,
            endpoint: endpoint.into(),
            channel: channel.into(),
            backoff,
        }
    }

    /// Run until `cancel` fires.
    ///
    /// # Errors
    /// Returns the most recent failure observed by the loop, if any.
    pub async fn run<H>(
        &mut self,
        cancel: &CancellationToken,
        handler: &H,
        cloud_properties: &CloudProperties,
    ) -> Result<(), CommunicationError>
    where
        H: MessageHandler + ?Sized,
    {
        let mut last_error = None;
        let Some(mut conn) = self.establish_connection(cancel, &mut last_error).await else {
            return finish(last_error);
        };

        loop {
            if cancel.is_cancelled() {
                return finish(last_error);
            }

            tracing::debug!(endpoint = %self.endpoint, channel = %self.channel, "Listening for messages on ACS");
            let received = tokio::select! {
                biased;
                () = cancel.cancelled() => return finish(last_error),
                received = conn.receive() => received,
            };

            let message = match received {
                Ok(message) if message.has_labels() => message,
                Ok(_) => {
                    tracing::warn!("No labels in message from ACS. Will backoff and retry with a new connection");
                    last_error = Some(CommunicationError::MissingLabels);
                    drop(conn);
                    conn = match self.reconnect(cancel, &mut last_error).await {
                        Some(conn) => conn,
                        None => return finish(last_error),
                    };
                    continue;
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Receiving from ACS failed. Will backoff and retry with a new connection");
                    last_error = Some(CommunicationError::Receive(e));
                    drop(conn);
                    conn = match self.reconnect(cancel, &mut last_error).await {
                        Some(conn) => conn,
                        None => return finish(last_error),
                    };
                    continue;
                }
            };
            tracing::debug!(labels = ?message.labels, "ACS message received");

            let Some(operation_id) = message.operation_id().map(str::to_string) else {
                tracing::warn!(labels = ?message.labels, "No operation_id label in message. Will backoff and retry");
                last_error = Some(CommunicationError::MissingOperationId);
                if !self.sleep_backoff(cancel).await {
                    return finish(last_error);
                }
                continue;
            };
            tracing::debug!(%operation_id, "Parsed operation_id from label");
            self.backoff.reset();

            let (state, response) = match handler.handle(cancel, message.body, cloud_properties).await {
                Ok(response) => (OperationState::Succeeded, response),
                Err(e) => {
                    tracing::warn!(%operation_id, error = %e, "Encountered error during ACS message handling");
                    (OperationState::Failed, None)
                }
            };
            tracing::debug!(%operation_id, %state, has_response = response.is_some(), "Message handling complete");

            if let Err(e) = send_status(&mut conn, &operation_id, state, response).await {
                tracing::warn!(%operation_id, error = %e, "Encountered error sending status message");
                last_error = Some(e);
            }
        }
    }

    /// Open a connection, retrying with backoff until it succeeds.
    ///
    /// Returns `None` if cancelled first.
    async fn establish_connection(
        &mut self,
        cancel: &CancellationToken,
        last_error: &mut Option<CommunicationError>,
    ) -> Option<T::Connection> {
        let options = ConnectOptions::for_endpoint(&self.endpoint);
        loop {
            if cancel.is_cancelled() {
                return None;
            }
            tracing::info!(endpoint = %self.endpoint, channel = %self.channel, "Establishing connection with ACS");
            if let Some(endpoint) = &options.endpoint {
                tracing::info!(%endpoint, "Using non-default endpoint");
            }
            match self.transport.connect(&self.channel, true, &options).await {
                Ok(conn) => {
                    tracing::info!(channel = %self.channel, "Connected to ACS");
                    self.backoff.reset();
                    return Some(conn);
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to establish connection to ACS. Will backoff and retry");
                    *last_error = Some(CommunicationError::Connect(e));
                    if !self.sleep_backoff(cancel).await {
                        return None;
                    }
                }
            }
        }
    }

    /// Back off, then open a new connection. The failed one must already be
    /// dropped.
    async fn reconnect(
        &mut self,
        cancel: &CancellationToken,
        last_error: &mut Option<CommunicationError>,
    ) -> Option<T::Connection> {
        if !self.sleep_backoff(cancel).await {
            return None;
        }
        self.establish_connection(cancel, last_error).await
    }

    /// Sleep for the next backoff delay. Returns `false` if cancelled.
    async fn sleep_backoff(&mut self, cancel: &CancellationToken) -> bool {
        let delay = self.backoff.next_backoff();
        tracing::info!(duration = ?delay, "Backing off");
        tokio::select! {
            () = tokio::time::sleep(delay) => true,
            () = cancel.cancelled() => false,
        }
    }
}

async fn send_status<C: Connection>(
    conn: &mut C,
    operation_id: &str,
    state: OperationState,
    body: Option<Body>,
) -> Result<(), CommunicationError> {
    let message = Message::status(operation_id, state, body);
    tracing::debug!(labels = ?message.labels, "Sending status message via ACS");
    conn.send(message)
        .await
        .map_err(CommunicationError::SendStatus)
}

fn finish(last_error: Option<CommunicationError>) -> Result<(), CommunicationError> {
    tracing::info!("Context is done. Returning");
    last_error.map_or(Ok(()), Err)
}

/// Run a [`ChannelSession`] with the default backoff on `channel` until
/// `cancel` fires.
///
/// # Errors
/// Returns the most recent failure observed by the loop, if any.
pub async fn communicate<T, H>(
    transport: T,
    cancel: &CancellationToken,
    endpoint: &str,
    channel: &str,
    handler: &H,
    cloud_properties: &CloudProperties,
) -> Result<(), CommunicationError>
where
    T: Transport,
    H: MessageHandler + ?Sized,
{
    ChannelSession::new(transport, endpoint, channel)
        .run(cancel, handler, cloud_properties)
        .await
}
