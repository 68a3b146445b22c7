//! Tests for error types.

use super::*;

fn failure() -> TransportFailure {
    TransportFailure {
        code: Some("AWS.SimpleQueueService.NonExistentQueue".to_string()),
        message: Some("The specified queue does not exist".to_string()),
        status_code: Some(400),
        request_id: Some("req-42".to_string()),
        retryable: Some(false),
        retry_delay: None,
    }
}

#[test]
fn test_transport_failure_fields_are_preserved() {
    let error = TransportError::from(failure());

    assert_eq!(error.kind, "AWS.SimpleQueueService.NonExistentQueue");
    assert_eq!(error.message, "The specified queue does not exist");
    assert_eq!(error.namespace, ERROR_NAMESPACE);
    assert_eq!(error.status_code, Some(400));
    assert_eq!(error.request_id.as_deref(), Some("req-42"));
    assert_eq!(error.retryable, Some(false));
}

#[test]
fn test_missing_code_and_message_fall_back() {
    let error = TransportError::from(TransportFailure::default());

    assert_eq!(error.kind, FALLBACK_ERROR_KIND);
    assert_eq!(error.message, "An unexpected error occurred");
    assert_eq!(error.namespace, "QUEUE");
    assert!(error.status_code.is_none());
    assert!(error.request_id.is_none());
}

#[test]
fn test_empty_code_falls_back() {
    let error = TransportError::from(TransportFailure {
        code: Some(String::new()),
        ..TransportFailure::default()
    });
    assert_eq!(error.kind, FALLBACK_ERROR_KIND);
}

#[test]
fn test_queue_error_kind_and_namespace() {
    let transport: QueueError = failure().into();
    assert_eq!(transport.kind(), "AWS.SimpleQueueService.NonExistentQueue");
    assert_eq!(transport.namespace(), "QUEUE");

    let invalid = QueueError::invalid_payload("Payload is not valid");
    assert_eq!(invalid.kind(), INVALID_PAYLOAD_KIND);
    assert_eq!(invalid.namespace(), "QUEUE");
}

#[test]
fn test_error_transience() {
    let retryable: QueueError = TransportFailure {
        retryable: Some(true),
        retry_delay: Some(Duration::from_millis(250)),
        ..failure()
    }
    .into();
    assert!(retryable.is_transient());
    assert_eq!(retryable.retry_after(), Some(Duration::from_millis(250)));

    let permanent: QueueError = failure().into();
    assert!(!permanent.is_transient());
    assert_eq!(permanent.retry_after(), None);

    assert!(!QueueError::invalid_payload("nope").is_transient());
    assert!(!QueueError::Cancelled.is_transient());
}
