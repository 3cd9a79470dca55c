//! Message handling for inbound channel requests.

use async_trait::async_trait;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use workload_agent_core::CloudProperties;

use crate::message::Body;

/// Handler error. Reported upstream as a `FAILED` operation.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("Handling failed: {0}")]
    Failed(String),
}

/// Business logic invoked for each inbound message.
///
/// Implementations should return promptly once `cancel` fires; the session
/// does not interrupt a running handler.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    /// Handle a request body and produce the response body.
    async fn handle(
        &self,
        cancel: &CancellationToken,
        request: Option<Body>,
        cloud_properties: &CloudProperties,
    ) -> Result<Option<Body>, HandlerError>;
}

/// Handler that answers every request with the request body.
#[derive(Debug, Default, Clone)]
pub struct EchoHandler;

#[async_trait]
impl MessageHandler for EchoHandler {
    async fn handle(
        &self,
        _cancel: &CancellationToken,
        request: Option<Body>,
        _cloud_properties: &CloudProperties,
    ) -> Result<Option<Body>, HandlerError> {
        Ok(request)
    }
}
