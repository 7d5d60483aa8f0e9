//! Real-time message envelopes.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use tether_core::Result;

/// Bare text frame sent by the client as a liveness probe.
pub const LIVENESS_PROBE: &str = "ping";

/// Envelope type the server uses to acknowledge a probe.
pub const LIVENESS_ACK: &str = "pong";

/// Envelope type carrying a chat message.
pub const NEW_MESSAGE: &str = "new_message";

/// A JSON frame discriminated by its `type` field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl Envelope {
    pub fn new(kind: impl Into<String>, data: Option<serde_json::Value>) -> Self {
        Self {
            kind: kind.into(),
            data,
        }
    }

    pub fn is_liveness_ack(&self) -> bool {
        self.kind == LIVENESS_ACK
    }

    /// Decode `data` into a typed payload; `Ok(None)` when there is none.
    pub fn data_as<T: DeserializeOwned>(&self) -> Result<Option<T>> {
        match &self.data {
            Some(value) => Ok(Some(serde_json::from_value(value.clone())?)),
            None => Ok(None),
        }
    }
}

/// Identifier of a chat message; the backend sends either form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageId {
    Number(i64),
    Text(String),
}

/// Who sent a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    User,
    Official,
}

/// Payload of a `new_message` envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: MessageId,
    #[serde(rename = "type")]
    pub sender: Sender,
    pub text: String,
    pub time: String,
    pub is_read: bool,
}
