//! Long-polling receive loop.
//!
//! A pull blocks until at least one valid message is available. Each cycle
//! moves through three states:
//!
//! - `Polling`: one receive call against the queue
//! - `Waiting`: backoff after an empty or all-invalid receive
//! - `Delivering`: valid messages are handed to the caller
//!
//! Transport failures end the pull immediately; only empty results are retried.
//! The receive and the backoff are both raced against a [`CancelToken`].

use crate::error::QueueError;
use crate::message::Message;
use crate::options::EffectiveParams;
use crate::transport::{QueueTransport, ReceiveRequest};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, trace, warn};

/// Attribute selector requesting every message attribute
const ALL_ATTRIBUTES: &str = "All";

// ============================================================================
// Cancellation
// ============================================================================

/// Cooperative cancellation for in-flight pulls.
///
/// Clones share the same state; cancelling any clone cancels all of them.
#[derive(Debug, Clone)]
pub struct CancelToken {
    state: Arc<watch::Sender<bool>>,
}

impl CancelToken {
    /// Create a token that is not cancelled
    pub fn new() -> Self {
        let (state, _) = watch::channel(false);
        Self {
            state: Arc::new(state),
        }
    }

    /// Cancel every operation observing this token
    pub fn cancel(&self) {
        self.state.send_replace(true);
    }

    /// Whether [`CancelToken::cancel`] has been called
    pub fn is_cancelled(&self) -> bool {
        *self.state.borrow()
    }

    /// Resolve once the token is cancelled
    pub async fn cancelled(&self) {
        let mut receiver = self.state.subscribe();
        // The sender lives as long as `self`, so the wait cannot fail.
        let _ = receiver.wait_for(|cancelled| *cancelled).await;
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Pull Result
// ============================================================================

/// Messages delivered by a pull
#[derive(Debug)]
pub enum Pulled {
    /// Returned when the effective max-messages is 1
    Single(Message),
    /// Returned when the effective max-messages is above 1; never empty
    Batch(Vec<Message>),
}

impl Pulled {
    /// Number of delivered messages
    pub fn len(&self) -> usize {
        match self {
            Self::Single(_) => 1,
            Self::Batch(messages) => messages.len(),
        }
    }

    /// Always false for a completed pull
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Flatten into a list of messages
    pub fn into_vec(self) -> Vec<Message> {
        match self {
            Self::Single(message) => vec![message],
            Self::Batch(messages) => messages,
        }
    }

    /// The single message, or the first of a batch
    pub fn into_first(self) -> Option<Message> {
        self.into_vec().into_iter().next()
    }
}

// ============================================================================
// Puller
// ============================================================================

enum PollState {
    Polling,
    Waiting,
    Delivering(Vec<Message>),
}

/// Drives one pull operation from the first receive to delivery
pub(crate) struct Puller {
    client_id: String,
    transport: Arc<dyn QueueTransport>,
    request: ReceiveRequest,
    remove_invalid: bool,
}

impl Puller {
    pub(crate) fn new(
        client_id: String,
        transport: Arc<dyn QueueTransport>,
        params: EffectiveParams,
        remove_invalid: bool,
    ) -> Self {
        let request = ReceiveRequest {
            queue_url: params.queue_url,
            max_messages: params.max_messages,
            visibility_timeout: params.visibility_seconds,
            wait_seconds: params.wait_seconds,
            attribute_names: vec![ALL_ATTRIBUTES.to_string()],
            extra: params.extra,
        };
        Self {
            client_id,
            transport,
            request,
            remove_invalid,
        }
    }

    /// Delay between an empty receive and the next one
    pub(crate) fn backoff(&self) -> Duration {
        Duration::from_millis(u64::from(self.request.wait_seconds.max(1)) * 1000)
    }

    pub(crate) async fn run(self, cancel: &CancelToken) -> Result<Pulled, QueueError> {
        let mut state = PollState::Polling;
        let mut attempt: u64 = 0;

        loop {
            if cancel.is_cancelled() {
                return Err(QueueError::Cancelled);
            }

            state = match state {
                PollState::Polling => {
                    attempt += 1;
                    let received = tokio::select! {
                        biased;
                        _ = cancel.cancelled() => return Err(QueueError::Cancelled),
                        received = self.transport.receive(&self.request) => received?,
                    };

                    if received.is_empty() {
                        debug!(
                            client_id = %self.client_id,
                            queue_url = %self.request.queue_url,
                            attempt,
                            "No messages available; polling again after backoff"
                        );
                        PollState::Waiting
                    } else {
                        let valid = self.partition(received);
                        if valid.is_empty() {
                            PollState::Waiting
                        } else {
                            PollState::Delivering(valid)
                        }
                    }
                }
                PollState::Waiting => {
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => return Err(QueueError::Cancelled),
                        _ = tokio::time::sleep(self.backoff()) => PollState::Polling,
                    }
                }
                PollState::Delivering(mut messages) => {
                    trace!(
                        client_id = %self.client_id,
                        count = messages.len(),
                        "Delivering pulled messages"
                    );
                    if self.request.max_messages == 1 {
                        let first = messages.remove(0);
                        return Ok(Pulled::Single(first));
                    }
                    return Ok(Pulled::Batch(messages));
                }
            };
        }
    }

    /// Build messages and keep the valid ones, disposing of the rest
    fn partition(&self, entries: Vec<crate::transport::RawEntry>) -> Vec<Message> {
        let mut valid = Vec::with_capacity(entries.len());
        for entry in entries {
            let message = Message::from_raw(
                entry,
                self.request.queue_url.clone(),
                Arc::clone(&self.transport),
            );
            if message.is_valid() {
                valid.push(message);
            } else {
                self.discard_invalid(message);
            }
        }
        valid
    }

    fn discard_invalid(&self, mut message: Message) {
        let message_id = message.id().unwrap_or("unknown").to_string();
        if !self.remove_invalid || message.receipt().is_none() {
            debug!(
                client_id = %self.client_id,
                message_id = %message_id,
                "Dropping invalid message"
            );
            return;
        }

        let client_id = self.client_id.clone();
        tokio::spawn(async move {
            match message.destroy().await {
                Ok(()) => trace!(
                    client_id = %client_id,
                    message_id = %message_id,
                    "Destroyed invalid message"
                ),
                Err(e) => warn!(
                    client_id = %client_id,
                    message_id = %message_id,
                    error = %e,
                    "Failed to destroy invalid message"
                ),
            }
        });
    }
}

#[cfg(test)]
#[path = "pull_tests.rs"]
mod tests;
