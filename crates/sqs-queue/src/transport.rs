//! Boundary between the queue client and the remote queue service.
//!
//! A [`QueueTransport`] is a stateless request/response view of the queue
//! service. It performs exactly one remote call per method invocation and never
//! retries; polling, batching and message lifecycle all live above it.

use crate::message::AttributeValue;
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

/// Parameters of a single long-poll receive call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceiveRequest {
    pub queue_url: String,
    pub max_messages: u32,
    pub visibility_timeout: u32,
    pub wait_seconds: u32,
    /// Message attribute names to return; `All` selects every attribute
    pub attribute_names: Vec<String>,
    /// Additional raw transport parameters
    pub extra: BTreeMap<String, String>,
}

/// Parameters of a single-message send call
#[derive(Debug, Clone, PartialEq)]
pub struct SendRequest {
    pub queue_url: String,
    pub body: String,
    pub delay_seconds: u32,
    pub attributes: BTreeMap<String, AttributeValue>,
    pub extra: BTreeMap<String, String>,
}

/// One entry of a batch send call
#[derive(Debug, Clone, PartialEq)]
pub struct BatchEntry {
    /// Entry id, unique within the batch; used to correlate failures
    pub id: String,
    pub body: String,
    pub delay_seconds: u32,
    pub attributes: BTreeMap<String, AttributeValue>,
}

/// Parameters of a batch send call
#[derive(Debug, Clone, PartialEq)]
pub struct SendBatchRequest {
    pub queue_url: String,
    pub entries: Vec<BatchEntry>,
    pub extra: BTreeMap<String, String>,
}

/// A batch entry rejected by the transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedEntry {
    pub id: String,
    pub code: String,
    pub message: Option<String>,
    pub sender_fault: bool,
}

/// Result of a batch send call that reached the service
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    /// Ids of the entries that were accepted
    pub successful: Vec<String>,
    pub failed: Vec<FailedEntry>,
}

/// A message attribute exactly as the transport returned it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawAttribute {
    /// `String`, `Number` or `Binary`, optionally with a custom `.suffix`
    pub data_type: String,
    pub string_value: Option<String>,
    pub binary_value: Option<Bytes>,
}

/// A message envelope exactly as the transport returned it.
///
/// Every field is optional: malformed envelopes are surfaced as-is and
/// rejected later by message validation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawEntry {
    pub message_id: Option<String>,
    pub receipt_handle: Option<String>,
    pub body: Option<String>,
    pub attributes: HashMap<String, RawAttribute>,
}

/// A failure reported by the transport, before normalization.
///
/// Converted into [`crate::error::TransportError`] at the call site.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransportFailure {
    pub code: Option<String>,
    pub message: Option<String>,
    pub status_code: Option<u16>,
    pub request_id: Option<String>,
    pub retryable: Option<bool>,
    pub retry_delay: Option<Duration>,
}

impl TransportFailure {
    /// Create a failure with an error code and message
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: Some(code.into()),
            message: Some(message.into()),
            ..Self::default()
        }
    }

    /// Attach the HTTP status code
    pub fn with_status(mut self, status_code: u16) -> Self {
        self.status_code = Some(status_code);
        self
    }

    /// Attach the service request id
    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    /// Mark the failure as retryable or not
    pub fn with_retryable(mut self, retryable: bool) -> Self {
        self.retryable = Some(retryable);
        self
    }

    /// Attach a suggested retry delay
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = Some(delay);
        self
    }
}

/// Interface implemented by queue service transports (SQS over HTTP, in-memory)
#[async_trait]
pub trait QueueTransport: Send + Sync {
    /// Long-poll for up to `max_messages` messages
    async fn receive(&self, request: &ReceiveRequest) -> Result<Vec<RawEntry>, TransportFailure>;

    /// Send one message, returning the service-assigned message id
    async fn send(&self, request: &SendRequest) -> Result<String, TransportFailure>;

    /// Send a batch of messages; per-entry rejections are reported in the outcome
    async fn send_batch(&self, request: &SendBatchRequest)
        -> Result<BatchOutcome, TransportFailure>;

    /// Delete a received message by its receipt handle
    async fn delete(&self, queue_url: &str, receipt: &str) -> Result<(), TransportFailure>;

    /// Remove every message from the queue
    async fn purge(&self, queue_url: &str) -> Result<(), TransportFailure>;

    /// Short transport name for logging
    fn name(&self) -> &'static str;
}
