//! Received queue messages and message attribute values.

use crate::error::QueueError;
use crate::transport::{QueueTransport, RawAttribute, RawEntry};
use bytes::Bytes;
use chrono::{DateTime, TimeZone, Utc};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Reserved attribute carrying the producer-side send time in epoch milliseconds
pub const TIMESTAMP_ATTRIBUTE: &str = "_Timestamp";

// ============================================================================
// Attribute Values
// ============================================================================

/// Value of an application-defined message attribute
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttributeValue {
    String(String),
    /// A number kept in its string form, as the queue service transmits it
    Number(String),
    Binary(Bytes),
}

impl AttributeValue {
    /// Convert a JSON value into an attribute value.
    ///
    /// Only strings and numbers are representable; any other JSON type yields
    /// `None` so callers can drop it silently.
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) => Some(Self::String(s.clone())),
            Value::Number(n) => Some(Self::Number(n.to_string())),
            _ => None,
        }
    }

    /// Service data type name
    pub fn data_type(&self) -> &'static str {
        match self {
            Self::String(_) => "String",
            Self::Number(_) => "Number",
            Self::Binary(_) => "Binary",
        }
    }

    /// String form of a `String` or `Number` attribute
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) | Self::Number(s) => Some(s),
            Self::Binary(_) => None,
        }
    }

    /// Bytes of a `Binary` attribute
    pub fn as_bytes(&self) -> Option<&Bytes> {
        match self {
            Self::Binary(b) => Some(b),
            _ => None,
        }
    }

    fn from_raw(raw: &RawAttribute) -> Option<Self> {
        let base_type = raw.data_type.split('.').next().unwrap_or_default();
        let value = match base_type {
            "String" => Self::String(raw.string_value.clone()?),
            "Number" => Self::Number(raw.string_value.clone()?),
            "Binary" => Self::Binary(raw.binary_value.clone()?),
            _ => return None,
        };
        let empty = match &value {
            Self::String(s) | Self::Number(s) => s.is_empty(),
            Self::Binary(b) => b.is_empty(),
        };
        (!empty).then_some(value)
    }
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<i64> for AttributeValue {
    fn from(value: i64) -> Self {
        Self::Number(value.to_string())
    }
}

impl From<u64> for AttributeValue {
    fn from(value: u64) -> Self {
        Self::Number(value.to_string())
    }
}

impl From<f64> for AttributeValue {
    fn from(value: f64) -> Self {
        Self::Number(value.to_string())
    }
}

impl From<Bytes> for AttributeValue {
    fn from(value: Bytes) -> Self {
        Self::Binary(value)
    }
}

impl From<Vec<u8>> for AttributeValue {
    fn from(value: Vec<u8>) -> Self {
        Self::Binary(Bytes::from(value))
    }
}

// ============================================================================
// Message
// ============================================================================

/// A message received from the queue.
///
/// Messages are created by `pull` from a raw receive result, one per physical
/// delivery. The only state change is [`Message::destroy`], which deletes the
/// message from the queue and clears its receipt and payload.
pub struct Message {
    id: Option<String>,
    receipt: Option<String>,
    payload: Value,
    timestamp: Option<i64>,
    attributes: HashMap<String, AttributeValue>,
    destroyed: bool,
    queue_url: String,
    transport: Arc<dyn QueueTransport>,
}

impl Message {
    /// Build a message from a raw transport entry received from `queue_url`
    pub(crate) fn from_raw(
        entry: RawEntry,
        queue_url: String,
        transport: Arc<dyn QueueTransport>,
    ) -> Self {
        let mut timestamp = None;
        let mut attributes = HashMap::new();
        for (name, raw) in &entry.attributes {
            if name == TIMESTAMP_ATTRIBUTE {
                timestamp = raw
                    .string_value
                    .as_deref()
                    .and_then(|v| v.trim().parse::<i64>().ok());
                continue;
            }
            if let Some(value) = AttributeValue::from_raw(raw) {
                attributes.insert(name.clone(), value);
            }
        }

        let payload = match entry.body {
            Some(body) if !body.is_empty() => {
                serde_json::from_str(&body).unwrap_or(Value::String(body))
            }
            _ => Value::Null,
        };

        Self {
            id: entry.message_id.filter(|id| !id.is_empty()),
            receipt: entry.receipt_handle.filter(|r| !r.is_empty()),
            payload,
            timestamp,
            attributes,
            destroyed: false,
            queue_url,
            transport,
        }
    }

    /// Message id assigned by the queue service
    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    /// Receipt handle; `None` once the message is destroyed
    pub fn receipt(&self) -> Option<&str> {
        self.receipt.as_deref()
    }

    /// Decoded payload; `Value::Null` once the message is destroyed
    pub fn payload(&self) -> &Value {
        &self.payload
    }

    /// Deserialize the payload into an application type
    pub fn payload_as<T: DeserializeOwned>(&self) -> Result<T, QueueError> {
        serde_json::from_value(self.payload.clone())
            .map_err(|e| QueueError::invalid_payload(format!("Payload does not match type: {}", e)))
    }

    /// Producer send time in epoch milliseconds
    pub fn timestamp(&self) -> Option<i64> {
        self.timestamp
    }

    /// Producer send time
    pub fn sent_at(&self) -> Option<DateTime<Utc>> {
        self.timestamp
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
    }

    /// Application attributes, excluding the reserved timestamp
    pub fn attributes(&self) -> &HashMap<String, AttributeValue> {
        &self.attributes
    }

    /// Look up a single attribute
    pub fn attribute(&self, name: &str) -> Option<&AttributeValue> {
        self.attributes.get(name)
    }

    /// Queue the message was received from
    pub fn queue_url(&self) -> &str {
        &self.queue_url
    }

    /// Whether the message has been deleted from the queue
    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }

    /// A message is valid when it has an id, a receipt and a non-null payload
    pub fn is_valid(&self) -> bool {
        self.id.is_some() && self.receipt.is_some() && !self.payload.is_null()
    }

    /// Delete the message from the queue it was received from.
    ///
    /// Idempotent: once the delete succeeded, further calls return immediately
    /// without contacting the queue. A failed delete leaves the message intact
    /// so the call can be retried.
    pub async fn destroy(&mut self) -> Result<(), QueueError> {
        if self.destroyed {
            return Ok(());
        }
        let receipt = self
            .receipt
            .as_deref()
            .ok_or_else(|| QueueError::MissingReceipt {
                message_id: self.id.clone().unwrap_or_else(|| "unknown".to_string()),
            })?;

        self.transport.delete(&self.queue_url, receipt).await?;

        self.destroyed = true;
        self.receipt = None;
        self.payload = Value::Null;
        Ok(())
    }

    /// Callback form of [`Message::destroy`].
    ///
    /// The message is handed back to the callback together with the outcome.
    pub fn destroy_callback<F>(mut self, callback: F) -> JoinHandle<()>
    where
        F: FnOnce(Message, Result<(), QueueError>) + Send + 'static,
    {
        tokio::spawn(async move {
            let result = self.destroy().await;
            callback(self, result);
        })
    }
}

impl fmt::Debug for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Message")
            .field("id", &self.id)
            .field("receipt", &self.receipt.as_ref().map(|_| "<redacted>"))
            .field("payload", &self.payload)
            .field("timestamp", &self.timestamp)
            .field("attributes", &self.attributes)
            .field("destroyed", &self.destroyed)
            .field("queue_url", &self.queue_url)
            .field("transport", &self.transport.name())
            .finish()
    }
}

#[cfg(test)]
#[path = "message_tests.rs"]
mod tests;
