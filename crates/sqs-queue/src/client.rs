//! Queue client and client factory.

use crate::error::QueueError;
use crate::options::{ClientOptions, ClientOptionsOverride, RequestOptions};
use crate::providers::{InMemoryTransport, SqsTransport};
use crate::pull::{CancelToken, Puller, Pulled};
use crate::push::Pusher;
use crate::transport::{FailedEntry, QueueTransport};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

#[cfg(test)]
#[path = "client_tests.rs"]
mod tests;

/// Factory for creating queue clients with appropriate transports
pub struct QueueClientFactory;

impl QueueClientFactory {
    /// Create a client talking to SQS over HTTP
    pub fn create_client(options: ClientOptions) -> Result<QueueClient, QueueError> {
        if options.aws.access_key_id.is_none() {
            warn!(client = %options.name, "No AWS Access key found");
        }
        if options.aws.secret_access_key.is_none() {
            warn!(client = %options.name, "No AWS Secret Key found");
        }
        let transport = SqsTransport::new(&options.aws)?;
        Self::create_with_transport(options, Arc::new(transport))
    }

    /// Create a client over an existing transport
    pub fn create_with_transport(
        options: ClientOptions,
        transport: Arc<dyn QueueTransport>,
    ) -> Result<QueueClient, QueueError> {
        options.validate()?;
        let client = QueueClient {
            id: new_client_id(),
            options: Arc::new(options),
            transport,
        };
        debug!(
            client_id = %client.id,
            client = %client.options.name,
            transport = client.transport.name(),
            "Created queue client"
        );
        Ok(client)
    }

    /// Create a client backed by a fresh in-memory queue
    pub fn create_test_client(queue_url: &str) -> Result<QueueClient, QueueError> {
        Self::create_with_transport(
            ClientOptions::new(queue_url),
            Arc::new(InMemoryTransport::new()),
        )
    }
}

fn new_client_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()[..8].to_string()
}

/// Client for one queue configuration.
///
/// Cloning is cheap and clones share the transport and options.
#[derive(Clone)]
pub struct QueueClient {
    id: String,
    options: Arc<ClientOptions>,
    transport: Arc<dyn QueueTransport>,
}

impl QueueClient {
    /// Short random identifier used in log events
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Options this client was built with
    pub fn options(&self) -> &ClientOptions {
        &self.options
    }

    /// Create a new client with some options replaced.
    ///
    /// The new client shares this client's transport, and therefore its
    /// credentials. This client is not modified.
    pub fn derive(&self, overrides: &ClientOptionsOverride) -> Result<QueueClient, QueueError> {
        let options = self.options.with_overrides(overrides);
        QueueClientFactory::create_with_transport(options, Arc::clone(&self.transport))
    }

    /// Wait until at least one valid message is available and return it.
    ///
    /// Empty receives are retried forever; use [`QueueClient::pull_with_cancel`]
    /// to bound the wait.
    pub async fn pull(&self, options: Option<&RequestOptions>) -> Result<Pulled, QueueError> {
        self.pull_with_cancel(options, &CancelToken::new()).await
    }

    /// Like [`QueueClient::pull`], but gives up with [`QueueError::Cancelled`]
    /// once `cancel` fires.
    pub async fn pull_with_cancel(
        &self,
        options: Option<&RequestOptions>,
        cancel: &CancelToken,
    ) -> Result<Pulled, QueueError> {
        let params = self.options.resolve(options)?;
        Puller::new(
            self.id.clone(),
            Arc::clone(&self.transport),
            params,
            self.options.remove_invalid,
        )
        .run(cancel)
        .await
    }

    /// Send one JSON-serializable payload; returns the message id
    pub async fn push<T: Serialize + ?Sized>(
        &self,
        payload: &T,
        options: Option<&RequestOptions>,
    ) -> Result<String, QueueError> {
        let params = self.options.resolve(options)?;
        Pusher::new(self.id.clone(), Arc::clone(&self.transport), params)
            .push(payload)
            .await
    }

    /// Send many payloads in batches; returns the entries the queue rejected
    pub async fn bulk_push<T: Serialize>(
        &self,
        items: &[T],
        options: Option<&RequestOptions>,
    ) -> Result<Vec<FailedEntry>, QueueError> {
        let params = self.options.resolve(options)?;
        Pusher::new(self.id.clone(), Arc::clone(&self.transport), params)
            .bulk_push(items)
            .await
    }

    /// Remove every message from the queue. Never retried.
    pub async fn purge(&self, options: Option<&RequestOptions>) -> Result<(), QueueError> {
        let params = self.options.resolve(options)?;
        info!(
            client_id = %self.id,
            queue_url = %params.queue_url,
            "Purging queue"
        );
        self.transport.purge(&params.queue_url).await?;
        Ok(())
    }
}

impl fmt::Debug for QueueClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueueClient")
            .field("id", &self.id)
            .field("options", &self.options)
            .field("transport", &self.transport.name())
            .finish()
    }
}
