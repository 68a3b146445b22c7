//! Scripted transport for unit tests.

use crate::transport::{
    BatchOutcome, FailedEntry, QueueTransport, RawAttribute, RawEntry, ReceiveRequest,
    SendBatchRequest, SendRequest, TransportFailure,
};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;

/// Calls observed by a [`ScriptedTransport`]
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Call {
    Receive(ReceiveRequest),
    Send(SendRequest),
    SendBatch(SendBatchRequest),
    Delete { queue_url: String, receipt: String },
    Purge { queue_url: String },
}

/// Transport returning pre-recorded results and recording every call.
///
/// Receives pop scripted results in order; once the script is exhausted they
/// return an empty result. Batch sends fail the entries whose index is listed
/// in `failing_batch_indexes`.
#[derive(Default)]
pub(crate) struct ScriptedTransport {
    receives: Mutex<VecDeque<Result<Vec<RawEntry>, TransportFailure>>>,
    send_result: Mutex<Option<TransportFailure>>,
    batch_failure: Mutex<Option<TransportFailure>>,
    failing_batch_indexes: Mutex<Vec<usize>>,
    delete_failure: Mutex<Option<TransportFailure>>,
    purge_failure: Mutex<Option<TransportFailure>>,
    calls: Mutex<Vec<Call>>,
}

impl ScriptedTransport {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push_receive(&self, result: Result<Vec<RawEntry>, TransportFailure>) {
        self.receives.lock().unwrap().push_back(result);
    }

    pub(crate) fn fail_sends(&self, failure: TransportFailure) {
        *self.send_result.lock().unwrap() = Some(failure);
    }

    pub(crate) fn fail_batches(&self, failure: TransportFailure) {
        *self.batch_failure.lock().unwrap() = Some(failure);
    }

    pub(crate) fn reject_batch_entries(&self, indexes: Vec<usize>) {
        *self.failing_batch_indexes.lock().unwrap() = indexes;
    }

    pub(crate) fn fail_deletes(&self, failure: TransportFailure) {
        *self.delete_failure.lock().unwrap() = Some(failure);
    }

    pub(crate) fn fail_purges(&self, failure: TransportFailure) {
        *self.purge_failure.lock().unwrap() = Some(failure);
    }

    pub(crate) fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub(crate) fn receive_count(&self) -> usize {
        self.count(|call| matches!(call, Call::Receive(_)))
    }

    pub(crate) fn delete_count(&self) -> usize {
        self.count(|call| matches!(call, Call::Delete { .. }))
    }

    pub(crate) fn batches(&self) -> Vec<SendBatchRequest> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::SendBatch(request) => Some(request),
                _ => None,
            })
            .collect()
    }

    pub(crate) fn sends(&self) -> Vec<SendRequest> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Send(request) => Some(request),
                _ => None,
            })
            .collect()
    }

    fn count(&self, predicate: impl Fn(&Call) -> bool) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| predicate(c)).count()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl QueueTransport for ScriptedTransport {
    async fn receive(&self, request: &ReceiveRequest) -> Result<Vec<RawEntry>, TransportFailure> {
        self.record(Call::Receive(request.clone()));
        self.receives
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(Vec::new()))
    }

    async fn send(&self, request: &SendRequest) -> Result<String, TransportFailure> {
        self.record(Call::Send(request.clone()));
        match self.send_result.lock().unwrap().clone() {
            Some(failure) => Err(failure),
            None => Ok(format!("msg-{}", self.sends().len())),
        }
    }

    async fn send_batch(
        &self,
        request: &SendBatchRequest,
    ) -> Result<BatchOutcome, TransportFailure> {
        self.record(Call::SendBatch(request.clone()));
        if let Some(failure) = self.batch_failure.lock().unwrap().clone() {
            return Err(failure);
        }

        let failing = self.failing_batch_indexes.lock().unwrap().clone();
        let mut outcome = BatchOutcome::default();
        for (index, entry) in request.entries.iter().enumerate() {
            if failing.contains(&index) {
                outcome.failed.push(FailedEntry {
                    id: entry.id.clone(),
                    code: "InvalidParameterValue".to_string(),
                    message: Some(format!("entry {} rejected", index)),
                    sender_fault: true,
                });
            } else {
                outcome.successful.push(entry.id.clone());
            }
        }
        Ok(outcome)
    }

    async fn delete(&self, queue_url: &str, receipt: &str) -> Result<(), TransportFailure> {
        self.record(Call::Delete {
            queue_url: queue_url.to_string(),
            receipt: receipt.to_string(),
        });
        match self.delete_failure.lock().unwrap().clone() {
            Some(failure) => Err(failure),
            None => Ok(()),
        }
    }

    async fn purge(&self, queue_url: &str) -> Result<(), TransportFailure> {
        self.record(Call::Purge {
            queue_url: queue_url.to_string(),
        });
        match self.purge_failure.lock().unwrap().clone() {
            Some(failure) => Err(failure),
            None => Ok(()),
        }
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

/// A raw entry as the service would return it
pub(crate) fn raw_entry(id: &str, receipt: &str, body: &str) -> RawEntry {
    RawEntry {
        message_id: Some(id.to_string()),
        receipt_handle: Some(receipt.to_string()),
        body: Some(body.to_string()),
        ..RawEntry::default()
    }
}

/// Add a string attribute to a raw entry
pub(crate) fn with_string_attribute(mut entry: RawEntry, name: &str, value: &str) -> RawEntry {
    entry.attributes.insert(
        name.to_string(),
        RawAttribute {
            data_type: "String".to_string(),
            string_value: Some(value.to_string()),
            binary_value: None,
        },
    );
    entry
}
