//! Tests for single and batched sends.

use super::*;
use crate::options::{ClientOptions, RequestOptions};
use crate::test_support::ScriptedTransport;
use crate::transport::TransportFailure;
use serde::ser::Error as _;
use serde_json::{json, Value};

const QUEUE: &str = "https://sqs.eu-west-1.amazonaws.com/123456789012/jobs";

fn pusher(transport: &Arc<ScriptedTransport>, call: RequestOptions) -> Pusher {
    let params = ClientOptions::new(QUEUE)
        .resolve(Some(&call))
        .expect("test parameters should resolve");
    Pusher::new("test".to_string(), transport.clone(), params)
}

/// A payload whose serialization always fails
struct Unserializable;

impl Serialize for Unserializable {
    fn serialize<S: serde::Serializer>(&self, _serializer: S) -> Result<S::Ok, S::Error> {
        Err(S::Error::custom("cannot serialize"))
    }
}

fn assert_invalid_payload(error: QueueError, expected: &str) {
    match error {
        QueueError::InvalidPayload { message } => assert_eq!(message, expected),
        other => panic!("expected InvalidPayload, got {:?}", other),
    }
}

// ============================================================================
// Payload Serialization
// ============================================================================

mod serialization {
    use super::*;

    #[test]
    fn test_object_payload_is_json_encoded() {
        let body = serialize_payload(&json!({"job": "resize", "size": 3})).unwrap();
        let decoded: Value = serde_json::from_str(&body).unwrap();
        assert_eq!(decoded, json!({"job": "resize", "size": 3}));
    }

    #[test]
    fn test_string_payload_is_json_encoded() {
        assert_eq!(serialize_payload("hello").unwrap(), "\"hello\"");
    }

    #[test]
    fn test_null_payload_is_rejected() {
        let error = serialize_payload(&Value::Null).unwrap_err();
        assert_invalid_payload(error, "Payload is not valid");

        let error = serialize_payload(&Option::<u32>::None).unwrap_err();
        assert_invalid_payload(error, "Payload is not valid");
    }

    #[test]
    fn test_unserializable_payload_is_rejected() {
        let error = serialize_payload(&Unserializable).unwrap_err();
        assert_invalid_payload(error, "Payload cannot be converted to string");
        assert_eq!(
            serialize_payload(&Unserializable).unwrap_err().kind(),
            "SQS.INVALID"
        );
    }
}

// ============================================================================
// Single Push
// ============================================================================

mod single_push {
    use super::*;

    #[tokio::test]
    async fn test_push_sends_body_delay_and_attributes() {
        let transport = Arc::new(ScriptedTransport::new());
        let call = RequestOptions::new()
            .with_delay_seconds(7)
            .with_attribute("tenant", "acme")
            .with_param("MessageGroupId", "g1");

        let message_id = pusher(&transport, call)
            .push(&json!({"job": 1}))
            .await
            .unwrap();

        assert_eq!(message_id, "msg-1");
        let sends = transport.sends();
        assert_eq!(sends.len(), 1);
        let request = &sends[0];
        assert_eq!(request.queue_url, QUEUE);
        assert_eq!(request.body, r#"{"job":1}"#);
        assert_eq!(request.delay_seconds, 7);
        assert_eq!(request.extra.get("MessageGroupId").unwrap(), "g1");
        assert_eq!(request.attributes["tenant"], AttributeValue::from("acme"));

        let timestamp: i64 = request.attributes[TIMESTAMP_ATTRIBUTE]
            .as_str()
            .unwrap()
            .parse()
            .unwrap();
        assert!(timestamp > 0);
    }

    #[tokio::test]
    async fn test_invalid_payload_makes_no_transport_call() {
        let transport = Arc::new(ScriptedTransport::new());
        let pusher = pusher(&transport, RequestOptions::new());

        let null_error = pusher.push(&Value::Null).await.unwrap_err();
        let unserializable_error = pusher.push(&Unserializable).await.unwrap_err();

        assert_invalid_payload(null_error, "Payload is not valid");
        assert_invalid_payload(
            unserializable_error,
            "Payload cannot be converted to string",
        );
        assert!(transport.calls().is_empty());
    }

    #[tokio::test]
    async fn test_send_failure_is_mapped() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.fail_sends(
            TransportFailure::new("AWS.SimpleQueueService.NonExistentQueue", "gone")
                .with_status(400)
                .with_request_id("req-1"),
        );

        let error = pusher(&transport, RequestOptions::new())
            .push(&json!("x"))
            .await
            .unwrap_err();

        let QueueError::Transport(transport_error) = error else {
            panic!("expected a transport error");
        };
        assert_eq!(transport_error.kind, "AWS.SimpleQueueService.NonExistentQueue");
        assert_eq!(transport_error.message, "gone");
        assert_eq!(transport_error.status_code, Some(400));
        assert_eq!(transport_error.request_id.as_deref(), Some("req-1"));
    }
}

// ============================================================================
// Bulk Push
// ============================================================================

mod bulk_push {
    use super::*;

    #[tokio::test]
    async fn test_small_input_is_sent_as_one_batch() {
        let transport = Arc::new(ScriptedTransport::new());
        let items: Vec<Value> = (0..5).map(|n| json!({ "n": n })).collect();

        let failed = pusher(&transport, RequestOptions::new())
            .bulk_push(&items)
            .await
            .unwrap();

        assert!(failed.is_empty());
        let batches = transport.batches();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].entries.len(), 5);
    }

    #[tokio::test]
    async fn test_large_input_is_split_into_serial_batches_of_nine() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.reject_batch_entries(vec![0]);
        let items: Vec<u32> = (0..21).collect();

        let failed = pusher(&transport, RequestOptions::new())
            .bulk_push(&items)
            .await
            .unwrap();

        let batches = transport.batches();
        let sizes: Vec<_> = batches.iter().map(|b| b.entries.len()).collect();
        assert_eq!(sizes, vec![9, 9, 3]);

        let bodies: Vec<String> = batches
            .iter()
            .flat_map(|b| b.entries.iter().map(|e| e.body.clone()))
            .collect();
        let expected: Vec<String> = items.iter().map(|n| n.to_string()).collect();
        assert_eq!(bodies, expected);

        let expected_failures: Vec<String> =
            batches.iter().map(|b| b.entries[0].id.clone()).collect();
        let failed_ids: Vec<String> = failed.into_iter().map(|f| f.id).collect();
        assert_eq!(failed_ids, expected_failures);
    }

    #[tokio::test]
    async fn test_entry_ids_combine_send_time_and_index() {
        let transport = Arc::new(ScriptedTransport::new());

        pusher(&transport, RequestOptions::new())
            .bulk_push(&["a", "b", "c"])
            .await
            .unwrap();

        let batch = &transport.batches()[0];
        for (index, entry) in batch.entries.iter().enumerate() {
            let sent_at = entry.attributes[TIMESTAMP_ATTRIBUTE].as_str().unwrap();
            assert_eq!(entry.id, format!("{}{}", sent_at, index));
        }
    }

    #[tokio::test]
    async fn test_caller_attributes_are_attached_to_every_entry() {
        let transport = Arc::new(ScriptedTransport::new());

        pusher(&transport, RequestOptions::new().with_attribute("priority", 5i64))
            .bulk_push(&["a", "b"])
            .await
            .unwrap();

        for entry in &transport.batches()[0].entries {
            assert_eq!(
                entry.attributes["priority"],
                AttributeValue::Number("5".to_string())
            );
        }
    }

    #[tokio::test]
    async fn test_unserializable_items_are_skipped() {
        let transport = Arc::new(ScriptedTransport::new());
        let items = vec![json!(1), Value::Null, json!(3)];

        pusher(&transport, RequestOptions::new())
            .bulk_push(&items)
            .await
            .unwrap();

        let bodies: Vec<_> = transport.batches()[0]
            .entries
            .iter()
            .map(|e| e.body.clone())
            .collect();
        assert_eq!(bodies, vec!["1".to_string(), "3".to_string()]);
    }

    #[tokio::test]
    async fn test_empty_input_is_rejected_at_top_level() {
        let transport = Arc::new(ScriptedTransport::new());
        let items: Vec<Value> = Vec::new();

        let error = pusher(&transport, RequestOptions::new())
            .bulk_push(&items)
            .await
            .unwrap_err();

        assert_invalid_payload(error, "Push items are not present");
        assert!(transport.calls().is_empty());
    }

    #[tokio::test]
    async fn test_empty_split_batch_resolves_without_failures() {
        let transport = Arc::new(ScriptedTransport::new());
        let items: Vec<Value> = Vec::new();

        let failed = pusher(&transport, RequestOptions::new())
            .push_batch(&items, BatchOrigin::Split)
            .await
            .unwrap();

        assert!(failed.is_empty());
        assert!(transport.calls().is_empty());
    }

    #[tokio::test]
    async fn test_all_invalid_items_depend_on_origin() {
        let transport = Arc::new(ScriptedTransport::new());
        let pusher = pusher(&transport, RequestOptions::new());
        let items = vec![Value::Null, Value::Null];

        let error = pusher
            .push_batch(&items, BatchOrigin::TopLevel)
            .await
            .unwrap_err();
        assert_invalid_payload(error, "Push items are empty");

        let failed = pusher.push_batch(&items, BatchOrigin::Split).await.unwrap();
        assert!(failed.is_empty());
        assert!(transport.calls().is_empty());
    }

    #[tokio::test]
    async fn test_batch_call_failure_stops_remaining_batches() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.fail_batches(TransportFailure::new("ServiceUnavailable", "down").with_status(503));
        let items: Vec<u32> = (0..20).collect();

        let error = pusher(&transport, RequestOptions::new())
            .bulk_push(&items)
            .await
            .unwrap_err();

        assert_eq!(error.kind(), "ServiceUnavailable");
        assert_eq!(transport.batches().len(), 1);
    }
}
