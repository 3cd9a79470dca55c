//! Messages exchanged over a channel.

use std::{collections::BTreeMap, fmt};

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Label correlating a request with its status message.
pub const OPERATION_ID: &str = "operation_id";
/// Label carrying the operation outcome.
pub const STATE: &str = "state";
/// Label marking the long-running operation state.
pub const LRO_STATE: &str = "lro_state";
/// The only `lro_state` the agent reports.
pub const LRO_DONE: &str = "done";

/// Opaque typed payload, passed through without interpretation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Body {
    /// Type identifier of `value`.
    pub type_url: String,
    /// Encoded payload (base64 on the wire).
    #[serde(with = "base64_bytes")]
    pub value: Bytes,
}

impl Body {
    #[must_use]
    pub fn new(type_url: impl Into<String>, value: impl Into<Bytes>) -> Self {
        Self {
            type_url: type_url.into(),
            value: value.into(),
        }
    }
}

/// Message envelope: string labels plus an optional body.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Body>,
}

impl Message {
    #[must_use]
    pub const fn new(labels: BTreeMap<String, String>, body: Option<Body>) -> Self {
        Self { labels, body }
    }

    /// Status message acknowledging `operation_id`.
    #[must_use]
    pub fn status(operation_id: &str, state: OperationState, body: Option<Body>) -> Self {
        let labels = BTreeMap::from([
            (OPERATION_ID.to_string(), operation_id.to_string()),
            (STATE.to_string(), state.as_str().to_string()),
            (LRO_STATE.to_string(), LRO_DONE.to_string()),
        ]);
        Self { labels, body }
    }

    /// Whether the message carries any labels. Label-less messages are treated
    /// as a broken connection.
    #[must_use]
    pub fn has_labels(&self) -> bool {
        !self.labels.is_empty()
    }

    #[must_use]
    pub fn operation_id(&self) -> Option<&str> {
        self.labels.get(OPERATION_ID).map(String::as_str)
    }

    #[must_use]
    pub fn state(&self) -> Option<&str> {
        self.labels.get(STATE).map(String::as_str)
    }
}

/// Outcome of handling a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationState {
    Succeeded,
    Failed,
}

impl OperationState {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Succeeded => "SUCCEEDED",
            Self::Failed => "FAILED",
        }
    }
}

impl fmt::Display for OperationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

mod base64_bytes {
    use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
    use bytes::Bytes;
    use serde::{Deserialize, Deserializer, Serializer, de::Error as _};

    pub fn serialize<S: Serializer>(value: &Bytes, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&BASE64.encode(value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Bytes, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        BASE64.decode(encoded).map(Bytes::from).map_err(D::Error::custom)
    }
}
