//! Callback-style wrappers around the async client API.
//!
//! Each wrapper spawns the corresponding async operation on the current tokio
//! runtime and invokes the callback with its result. The returned handle may
//! be awaited or dropped.

use crate::client::QueueClient;
use crate::error::QueueError;
use crate::options::RequestOptions;
use crate::pull::Pulled;
use crate::transport::FailedEntry;
use serde::Serialize;
use std::future::Future;
use tokio::task::JoinHandle;

fn spawn_with_callback<T, Fut, F>(operation: Fut, callback: F) -> JoinHandle<()>
where
    T: Send + 'static,
    Fut: Future<Output = Result<T, QueueError>> + Send + 'static,
    F: FnOnce(Result<T, QueueError>) + Send + 'static,
{
    tokio::spawn(async move {
        callback(operation.await);
    })
}

impl QueueClient {
    /// Callback form of [`QueueClient::pull`]
    pub fn pull_callback<F>(&self, options: Option<RequestOptions>, callback: F) -> JoinHandle<()>
    where
        F: FnOnce(Result<Pulled, QueueError>) + Send + 'static,
    {
        let client = self.clone();
        spawn_with_callback(
            async move { client.pull(options.as_ref()).await },
            callback,
        )
    }

    /// Callback form of [`QueueClient::push`]
    pub fn push_callback<T, F>(
        &self,
        payload: T,
        options: Option<RequestOptions>,
        callback: F,
    ) -> JoinHandle<()>
    where
        T: Serialize + Send + Sync + 'static,
        F: FnOnce(Result<String, QueueError>) + Send + 'static,
    {
        let client = self.clone();
        spawn_with_callback(
            async move { client.push(&payload, options.as_ref()).await },
            callback,
        )
    }

    /// Callback form of [`QueueClient::bulk_push`]
    pub fn bulk_push_callback<T, F>(
        &self,
        items: Vec<T>,
        options: Option<RequestOptions>,
        callback: F,
    ) -> JoinHandle<()>
    where
        T: Serialize + Send + Sync + 'static,
        F: FnOnce(Result<Vec<FailedEntry>, QueueError>) + Send + 'static,
    {
        let client = self.clone();
        spawn_with_callback(
            async move { client.bulk_push(&items, options.as_ref()).await },
            callback,
        )
    }

    /// Callback form of [`QueueClient::purge`]
    pub fn purge_callback<F>(&self, options: Option<RequestOptions>, callback: F) -> JoinHandle<()>
    where
        F: FnOnce(Result<(), QueueError>) + Send + 'static,
    {
        let client = self.clone();
        spawn_with_callback(
            async move { client.purge(options.as_ref()).await },
            callback,
        )
    }
}

#[cfg(test)]
#[path = "callback_tests.rs"]
mod tests;
