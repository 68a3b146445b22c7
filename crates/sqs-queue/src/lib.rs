//! # SQS Queue
//!
//! Client for at-least-once message queues such as AWS SQS.
//!
//! This library provides:
//! - Long-polling pulls that wait until a valid message arrives, with
//!   cooperative cancellation
//! - Single and bulk pushes, with bulk input split into serial batches
//! - Idempotent message deletion and queue purging
//! - A uniform error shape for every transport failure
//! - Layered configuration from files and the environment
//!
//! ## Module Organization
//!
//! - [`client`] - Client factory and the per-queue client
//! - [`message`] - Received messages and attribute values
//! - [`options`] - Client options, per-call overrides and loading
//! - [`pull`] - Poll loop and cancellation
//! - [`push`] - Payload serialization and batching
//! - [`transport`] - The transport boundary
//! - [`providers`] - SQS over HTTP and in-memory transports
//! - [`error`] - Error types
//!
//! ## Example
//!
//! ```no_run
//! use sqs_queue::{ClientOptions, QueueClientFactory};
//! use serde_json::json;
//!
//! # async fn run() -> Result<(), sqs_queue::QueueError> {
//! let options = ClientOptions::new("https://sqs.eu-west-1.amazonaws.com/123456789012/jobs");
//! let client = QueueClientFactory::create_client(options)?;
//!
//! client.push(&json!({"job": "resize"}), None).await?;
//!
//! let mut message = client.pull(None).await?.into_first().expect("pull returns a message");
//! println!("{}", message.payload());
//! message.destroy().await?;
//! # Ok(())
//! # }
//! ```

pub mod callback;
pub mod client;
pub mod error;
pub mod message;
pub mod options;
pub mod providers;
pub mod pull;
pub mod push;
pub mod transport;

#[cfg(test)]
mod test_support;

pub use client::{QueueClient, QueueClientFactory};
pub use error::{ConfigurationError, QueueError, TransportError, ValidationError};
pub use message::{AttributeValue, Message, TIMESTAMP_ATTRIBUTE};
pub use options::{AwsOptions, ClientOptions, ClientOptionsOverride, RequestOptions};
pub use providers::{InMemoryTransport, SqsTransport};
pub use pull::{CancelToken, Pulled};
pub use push::MAX_BATCH_ENTRIES;
pub use transport::{FailedEntry, QueueTransport};
