//! Message receiver seam
//!
//! The receiver owns the broker connection and the payload deserializer. A
//! session opens it with its interest and routing keys and consumes the
//! returned channel until the receiver closes it.

use crate::error::Result;
use async_trait::async_trait;
use bytes::Bytes;
use feed_types::{FeedMessage, MessageInterest};
use tokio::sync::mpsc;

/// What the receiver hands a session for every inbound payload
#[derive(Debug, Clone, PartialEq)]
pub enum ReceiverEvent {
    /// Payload deserialized into a structured message
    Message { message: FeedMessage, raw: Bytes },
    /// Payload could not be deserialized
    DeserializationFailed { raw: Bytes, reason: String },
}

impl ReceiverEvent {
    pub fn raw(&self) -> &Bytes {
        match self {
            ReceiverEvent::Message { raw, .. } | ReceiverEvent::DeserializationFailed { raw, .. } => {
                raw
            }
        }
    }
}

#[async_trait]
pub trait MessageReceiver: Send + Sync {
    /// Bind `routing_keys` and start delivering events
    ///
    /// The channel closing while the session is open is treated as a lost
    /// connection.
    async fn open(
        &self,
        interest: &MessageInterest,
        routing_keys: Vec<String>,
    ) -> Result<mpsc::Receiver<ReceiverEvent>>;

    async fn close(&self) -> Result<()>;
}
