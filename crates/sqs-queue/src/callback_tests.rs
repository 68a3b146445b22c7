//! Tests for the callback adapters.

use super::*;
use crate::client::QueueClientFactory;
use serde_json::json;
use tokio::sync::oneshot;

const QUEUE: &str = "https://sqs.eu-west-1.amazonaws.com/123456789012/jobs";

#[tokio::test]
async fn test_push_and_pull_callbacks_deliver_results() {
    let client = QueueClientFactory::create_test_client(QUEUE).unwrap();

    let (pushed_tx, pushed_rx) = oneshot::channel();
    client
        .push_callback(json!({"job": 7}), None, move |result| {
            let _ = pushed_tx.send(result);
        })
        .await
        .unwrap();
    let message_id = pushed_rx.await.unwrap().unwrap();

    let (pulled_tx, pulled_rx) = oneshot::channel();
    client
        .pull_callback(
            Some(RequestOptions::new().with_wait_seconds(0)),
            move |result| {
                let _ = pulled_tx.send(result);
            },
        )
        .await
        .unwrap();
    let message = pulled_rx.await.unwrap().unwrap().into_first().unwrap();

    assert_eq!(message.id(), Some(message_id.as_str()));
    assert_eq!(message.payload(), &json!({"job": 7}));
}

#[tokio::test]
async fn test_bulk_push_callback_reports_validation_error() {
    let client = QueueClientFactory::create_test_client(QUEUE).unwrap();
    let (tx, rx) = oneshot::channel();

    client
        .bulk_push_callback(Vec::<u32>::new(), None, move |result| {
            let _ = tx.send(result);
        })
        .await
        .unwrap();

    let error = rx.await.unwrap().unwrap_err();
    assert!(matches!(error, QueueError::InvalidPayload { .. }));
}

#[tokio::test]
async fn test_purge_callback_runs_once() {
    let client = QueueClientFactory::create_test_client(QUEUE).unwrap();
    client.bulk_push(&[1, 2], None).await.unwrap();
    let (tx, rx) = oneshot::channel();

    client
        .purge_callback(None, move |result| {
            let _ = tx.send(result.is_ok());
        })
        .await
        .unwrap();

    assert!(rx.await.unwrap());
}
