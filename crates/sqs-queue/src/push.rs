//! Single and batched message sends.

use crate::error::QueueError;
use crate::message::{AttributeValue, TIMESTAMP_ATTRIBUTE};
use crate::options::EffectiveParams;
use crate::transport::{BatchEntry, FailedEntry, QueueTransport, SendBatchRequest, SendRequest};
use chrono::Utc;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

/// Most entries sent in one batch call; kept one below the service limit of 10
pub const MAX_BATCH_ENTRIES: usize = 9;

/// Where a batch call originates; controls how empty input is reported
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BatchOrigin {
    TopLevel,
    Split,
}

/// Serialize a payload into a message body
pub(crate) fn serialize_payload<T: Serialize + ?Sized>(payload: &T) -> Result<String, QueueError> {
    let value = serde_json::to_value(payload)
        .map_err(|_| QueueError::invalid_payload("Payload cannot be converted to string"))?;
    if value.is_null() {
        return Err(QueueError::invalid_payload("Payload is not valid"));
    }
    serde_json::to_string(&value)
        .map_err(|_| QueueError::invalid_payload("Payload cannot be converted to string"))
}

fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Attributes of an outgoing message: the send timestamp, then caller attributes
fn message_attributes(
    sent_at: i64,
    caller: &BTreeMap<String, AttributeValue>,
) -> BTreeMap<String, AttributeValue> {
    let mut attributes = BTreeMap::new();
    attributes.insert(
        TIMESTAMP_ATTRIBUTE.to_string(),
        AttributeValue::String(sent_at.to_string()),
    );
    attributes.extend(caller.iter().map(|(k, v)| (k.clone(), v.clone())));
    attributes
}

/// Sends messages for one client
pub(crate) struct Pusher {
    client_id: String,
    transport: Arc<dyn QueueTransport>,
    params: EffectiveParams,
}

impl Pusher {
    pub(crate) fn new(
        client_id: String,
        transport: Arc<dyn QueueTransport>,
        params: EffectiveParams,
    ) -> Self {
        Self {
            client_id,
            transport,
            params,
        }
    }

    /// Send one payload, returning the service-assigned message id
    pub(crate) async fn push<T: Serialize + ?Sized>(&self, payload: &T) -> Result<String, QueueError> {
        let body = serialize_payload(payload)?;
        let request = SendRequest {
            queue_url: self.params.queue_url.clone(),
            body,
            delay_seconds: self.params.delay_seconds,
            attributes: message_attributes(now_millis(), &self.params.attributes),
            extra: self.params.extra.clone(),
        };

        let message_id = self.transport.send(&request).await?;
        debug!(
            client_id = %self.client_id,
            message_id = %message_id,
            "Pushed message"
        );
        Ok(message_id)
    }

    /// Send many payloads, splitting them into serial batches of at most
    /// [`MAX_BATCH_ENTRIES`]. Returns the entries the service rejected.
    pub(crate) async fn bulk_push<T: Serialize>(
        &self,
        items: &[T],
    ) -> Result<Vec<FailedEntry>, QueueError> {
        if items.is_empty() {
            return Err(QueueError::invalid_payload("Push items are not present"));
        }
        if items.len() <= MAX_BATCH_ENTRIES {
            return self.push_batch(items, BatchOrigin::TopLevel).await;
        }

        let chunks = items.chunks(MAX_BATCH_ENTRIES);
        debug!(
            client_id = %self.client_id,
            items = items.len(),
            batches = chunks.len(),
            "Splitting bulk push into batches"
        );

        let mut failed = Vec::new();
        for chunk in chunks {
            failed.extend(self.push_batch(chunk, BatchOrigin::Split).await?);
        }
        Ok(failed)
    }

    /// Send one batch call of at most [`MAX_BATCH_ENTRIES`] items
    pub(crate) async fn push_batch<T: Serialize>(
        &self,
        items: &[T],
        origin: BatchOrigin,
    ) -> Result<Vec<FailedEntry>, QueueError> {
        if items.is_empty() {
            return match origin {
                BatchOrigin::TopLevel => {
                    Err(QueueError::invalid_payload("Push items are not present"))
                }
                BatchOrigin::Split => Ok(Vec::new()),
            };
        }

        let bodies: Vec<String> = items
            .iter()
            .filter_map(|item| serialize_payload(item).ok())
            .collect();
        if bodies.is_empty() {
            return match origin {
                BatchOrigin::TopLevel => Err(QueueError::invalid_payload("Push items are empty")),
                BatchOrigin::Split => Ok(Vec::new()),
            };
        }

        let sent_at = now_millis();
        let entries = bodies
            .into_iter()
            .enumerate()
            .map(|(index, body)| BatchEntry {
                id: format!("{}{}", sent_at, index),
                body,
                delay_seconds: self.params.delay_seconds,
                attributes: message_attributes(sent_at, &self.params.attributes),
            })
            .collect();

        let request = SendBatchRequest {
            queue_url: self.params.queue_url.clone(),
            entries,
            extra: self.params.extra.clone(),
        };
        let outcome = self.transport.send_batch(&request).await?;
        if !outcome.failed.is_empty() {
            debug!(
                client_id = %self.client_id,
                failed = outcome.failed.len(),
                "Batch push had rejected entries"
            );
        }
        Ok(outcome.failed)
    }
}

#[cfg(test)]
#[path = "push_tests.rs"]
mod tests;
