//! In-memory queue transport for testing and development.
//!
//! This module provides a queue service simulation that:
//! - Keeps one queue per queue URL, created on first use
//! - Honors send delays and visibility timeouts, re-delivering messages whose
//!   visibility expired without a delete
//! - Issues a fresh receipt handle on every delivery
//! - Reports per-entry batch failures the way the real service does
//!
//! Receives return immediately instead of long-polling. Time is measured with
//! tokio's clock so tests can drive it with `tokio::time::pause`.

use crate::message::AttributeValue;
use crate::transport::{
    BatchOutcome, FailedEntry, QueueTransport, RawAttribute, RawEntry, ReceiveRequest,
    SendBatchRequest, SendRequest, TransportFailure,
};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::time::Instant;

#[cfg(test)]
#[path = "memory_tests.rs"]
mod tests;

/// Largest message body accepted, in bytes
pub const MAX_BODY_BYTES: usize = 256 * 1024;

// ============================================================================
// Internal Storage Structures
// ============================================================================

/// Thread-safe storage for all queues
#[derive(Default)]
struct QueueStorage {
    queues: HashMap<String, InMemoryQueue>,
}

impl QueueStorage {
    /// Get or create a queue
    fn get_or_create_queue(&mut self, queue_url: &str) -> &mut InMemoryQueue {
        self.queues.entry(queue_url.to_string()).or_default()
    }
}

/// Internal state for a single queue
#[derive(Default)]
struct InMemoryQueue {
    /// Messages in arrival order, visible or not
    messages: VecDeque<StoredMessage>,
}

/// A message stored in the queue with delivery metadata
#[derive(Clone)]
struct StoredMessage {
    message_id: String,
    body: String,
    attributes: BTreeMap<String, AttributeValue>,
    available_at: Instant,
    receipt_handle: Option<String>,
}

impl StoredMessage {
    fn new(body: String, attributes: BTreeMap<String, AttributeValue>, delay_seconds: u32) -> Self {
        Self {
            message_id: uuid::Uuid::new_v4().to_string(),
            body,
            attributes,
            available_at: Instant::now() + Duration::from_secs(u64::from(delay_seconds)),
            receipt_handle: None,
        }
    }

    /// Check if message is available for receiving
    fn is_available(&self, now: Instant) -> bool {
        now >= self.available_at
    }

    fn to_raw_entry(&self) -> RawEntry {
        let attributes = self
            .attributes
            .iter()
            .map(|(name, value)| {
                let raw = match value {
                    AttributeValue::String(s) | AttributeValue::Number(s) => RawAttribute {
                        data_type: value.data_type().to_string(),
                        string_value: Some(s.clone()),
                        binary_value: None,
                    },
                    AttributeValue::Binary(b) => RawAttribute {
                        data_type: value.data_type().to_string(),
                        string_value: None,
                        binary_value: Some(b.clone()),
                    },
                };
                (name.clone(), raw)
            })
            .collect();

        RawEntry {
            message_id: Some(self.message_id.clone()),
            receipt_handle: self.receipt_handle.clone(),
            body: Some(self.body.clone()),
            attributes,
        }
    }
}

fn check_body(body: &str) -> Result<(), TransportFailure> {
    if body.len() > MAX_BODY_BYTES {
        return Err(TransportFailure::new(
            "MessageTooLong",
            format!(
                "Message body must be shorter than {} bytes",
                MAX_BODY_BYTES
            ),
        )
        .with_status(400)
        .with_retryable(false));
    }
    Ok(())
}

// ============================================================================
// InMemoryTransport
// ============================================================================

/// In-memory queue transport.
///
/// Clones share the same storage.
#[derive(Clone, Default)]
pub struct InMemoryTransport {
    storage: Arc<RwLock<QueueStorage>>,
}

impl InMemoryTransport {
    /// Create a transport with no queues
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of messages held by a queue, visible or not
    pub fn message_count(&self, queue_url: &str) -> usize {
        self.storage
            .read()
            .map(|storage| {
                storage
                    .queues
                    .get(queue_url)
                    .map_or(0, |queue| queue.messages.len())
            })
            .unwrap_or(0)
    }

    fn with_queue<T>(
        &self,
        queue_url: &str,
        f: impl FnOnce(&mut InMemoryQueue) -> Result<T, TransportFailure>,
    ) -> Result<T, TransportFailure> {
        let mut storage = self.storage.write().map_err(|_| {
            TransportFailure::new("InternalError", "Queue storage lock poisoned")
                .with_retryable(false)
        })?;
        f(storage.get_or_create_queue(queue_url))
    }
}

#[async_trait]
impl QueueTransport for InMemoryTransport {
    async fn receive(&self, request: &ReceiveRequest) -> Result<Vec<RawEntry>, TransportFailure> {
        let visibility = Duration::from_secs(u64::from(request.visibility_timeout));
        let limit = request.max_messages.max(1) as usize;

        self.with_queue(&request.queue_url, |queue| {
            let now = Instant::now();
            let mut delivered = Vec::new();

            for message in queue.messages.iter_mut() {
                if delivered.len() >= limit {
                    break;
                }
                if !message.is_available(now) {
                    continue;
                }

                message.receipt_handle = Some(uuid::Uuid::new_v4().to_string());
                message.available_at = now + visibility;
                delivered.push(message.to_raw_entry());
            }

            Ok(delivered)
        })
    }

    async fn send(&self, request: &SendRequest) -> Result<String, TransportFailure> {
        check_body(&request.body)?;
        let message = StoredMessage::new(
            request.body.clone(),
            request.attributes.clone(),
            request.delay_seconds,
        );
        let message_id = message.message_id.clone();

        self.with_queue(&request.queue_url, |queue| {
            queue.messages.push_back(message);
            Ok(message_id)
        })
    }

    async fn send_batch(
        &self,
        request: &SendBatchRequest,
    ) -> Result<BatchOutcome, TransportFailure> {
        let mut seen = HashSet::new();
        if !request.entries.iter().all(|entry| seen.insert(entry.id.as_str())) {
            return Err(TransportFailure::new(
                "AWS.SimpleQueueService.BatchEntryIdsNotDistinct",
                "Two or more batch entries in the request have the same Id",
            )
            .with_status(400)
            .with_retryable(false));
        }

        self.with_queue(&request.queue_url, |queue| {
            let mut outcome = BatchOutcome::default();
            for entry in &request.entries {
                match check_body(&entry.body) {
                    Ok(()) => {
                        queue.messages.push_back(StoredMessage::new(
                            entry.body.clone(),
                            entry.attributes.clone(),
                            entry.delay_seconds,
                        ));
                        outcome.successful.push(entry.id.clone());
                    }
                    Err(failure) => outcome.failed.push(FailedEntry {
                        id: entry.id.clone(),
                        code: failure.code.unwrap_or_default(),
                        message: failure.message,
                        sender_fault: true,
                    }),
                }
            }
            Ok(outcome)
        })
    }

    async fn delete(&self, queue_url: &str, receipt: &str) -> Result<(), TransportFailure> {
        self.with_queue(queue_url, |queue| {
            let position = queue
                .messages
                .iter()
                .position(|message| message.receipt_handle.as_deref() == Some(receipt))
                .ok_or_else(|| {
                    TransportFailure::new(
                        "ReceiptHandleIsInvalid",
                        format!("The input receipt handle \"{}\" is not valid", receipt),
                    )
                    .with_status(404)
                    .with_retryable(false)
                })?;
            queue.messages.remove(position);
            Ok(())
        })
    }

    async fn purge(&self, queue_url: &str) -> Result<(), TransportFailure> {
        self.with_queue(queue_url, |queue| {
            queue.messages.clear();
            Ok(())
        })
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}
