//! AWS SQS transport using the HTTP query API.
//!
//! This module talks to SQS directly over HTTPS instead of going through the
//! AWS SDK, which keeps the transport small and lets the tests drive it with a
//! mock HTTP server.
//!
//! ## Requests
//!
//! Every operation is a `POST` to the queue URL with a form-encoded body
//! carrying `Action`, `Version` and the action parameters. Extra parameters
//! configured on the client are appended unchanged and override generated ones.
//!
//! ## Authentication
//!
//! Requests are signed with AWS Signature Version 4 using the configured
//! access key and secret. The signing region is the configured region, or the
//! region embedded in the queue host (`sqs.<region>.amazonaws.com`).
//!
//! ## Responses
//!
//! XML responses are parsed with quick-xml. Service errors keep their error
//! code, message, HTTP status and request id so the client can normalize them.

use crate::error::{ConfigurationError, QueueError};
use crate::message::AttributeValue;
use crate::options::AwsOptions;
use crate::transport::{
    BatchOutcome, FailedEntry, QueueTransport, RawAttribute, RawEntry, ReceiveRequest,
    SendBatchRequest, SendRequest, TransportFailure,
};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use reqwest::Client as HttpClient;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

#[cfg(test)]
#[path = "sqs_tests.rs"]
mod tests;

/// SQS query API version
const API_VERSION: &str = "2012-11-05";

/// Default timeout for calls that do not long-poll
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Extra time allowed on top of the long-poll wait before a receive times out
const RECEIVE_TIMEOUT_MARGIN: Duration = Duration::from_secs(10);

/// Error codes the service uses for throttled requests
const THROTTLING_CODES: &[&str] = &[
    "Throttling",
    "ThrottlingException",
    "RequestThrottled",
    "AWS.SimpleQueueService.RequestThrottled",
    "RequestLimitExceeded",
];

// ============================================================================
// AWS Signature V4 Signing
// ============================================================================

type HmacSha256 = Hmac<Sha256>;

/// AWS Signature Version 4 signer for request authentication
///
/// Implements the AWS Signature V4 signing process:
/// 1. Create canonical request (method, URI, query, headers, payload)
/// 2. Create string to sign (algorithm, timestamp, scope, request hash)
/// 3. Derive signing key (4-level HMAC chain)
/// 4. Calculate signature and build Authorization header
#[derive(Clone)]
struct AwsV4Signer {
    access_key: String,
    secret_key: String,
    service: String,
}

impl AwsV4Signer {
    fn new(access_key: String, secret_key: String) -> Self {
        Self {
            access_key,
            secret_key,
            service: "sqs".to_string(),
        }
    }

    /// Sign a request and return the headers to add to it
    ///
    /// # Arguments
    ///
    /// * `method` - HTTP method
    /// * `host` - Host header value, including a non-default port
    /// * `path` - Request path
    /// * `body` - Request body
    /// * `region` - Signing region
    /// * `timestamp` - Request timestamp
    fn sign_request(
        &self,
        method: &str,
        host: &str,
        path: &str,
        body: &str,
        region: &str,
        timestamp: &DateTime<Utc>,
    ) -> Vec<(String, String)> {
        let date_stamp = timestamp.format("%Y%m%d").to_string();
        let amz_date = timestamp.format("%Y%m%dT%H%M%SZ").to_string();

        let canonical_uri = if path.is_empty() { "/" } else { path };
        let canonical_headers = format!("host:{}\nx-amz-date:{}\n", host, amz_date);
        let signed_headers = "host;x-amz-date";
        let payload_hash = format!("{:x}", Sha256::digest(body.as_bytes()));

        let canonical_request = format!(
            "{}\n{}\n{}\n{}\n{}\n{}",
            method, canonical_uri, "", canonical_headers, signed_headers, payload_hash
        );

        let algorithm = "AWS4-HMAC-SHA256";
        let credential_scope = format!(
            "{}/{}/{}/aws4_request",
            date_stamp, region, self.service
        );
        let canonical_request_hash = format!("{:x}", Sha256::digest(canonical_request.as_bytes()));
        let string_to_sign = format!(
            "{}\n{}\n{}\n{}",
            algorithm, amz_date, credential_scope, canonical_request_hash
        );

        let signature = self.calculate_signature(&string_to_sign, &date_stamp, region);

        let authorization_header = format!(
            "{} Credential={}/{}, SignedHeaders={}, Signature={}",
            algorithm, self.access_key, credential_scope, signed_headers, signature
        );

        vec![
            ("Authorization".to_string(), authorization_header),
            ("x-amz-date".to_string(), amz_date),
        ]
    }

    /// Derive the signing key through the HMAC chain and sign
    fn calculate_signature(&self, string_to_sign: &str, date_stamp: &str, region: &str) -> String {
        let k_secret = format!("AWS4{}", self.secret_key);
        let k_date = Self::hmac_sha256(k_secret.as_bytes(), date_stamp.as_bytes());
        let k_region = Self::hmac_sha256(&k_date, region.as_bytes());
        let k_service = Self::hmac_sha256(&k_region, self.service.as_bytes());
        let k_signing = Self::hmac_sha256(&k_service, b"aws4_request");
        let signature = Self::hmac_sha256(&k_signing, string_to_sign.as_bytes());

        hex::encode(signature)
    }

    fn hmac_sha256(key: &[u8], data: &[u8]) -> Vec<u8> {
        let mut mac = HmacSha256::new_from_slice(key).expect("HMAC can take key of any size");
        mac.update(data);
        mac.finalize().into_bytes().to_vec()
    }
}

// ============================================================================
// SQS Transport
// ============================================================================

/// Transport for AWS SQS (or any SQS-compatible endpoint such as LocalStack)
///
/// The transport is stateless apart from its HTTP connection pool and can be
/// shared across tasks behind an `Arc`.
pub struct SqsTransport {
    http_client: HttpClient,
    signer: Option<AwsV4Signer>,
    aws: AwsOptions,
}

impl SqsTransport {
    /// Create a new SQS transport
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the signature version is not `v4` or
    /// the HTTP client cannot be built. Missing credentials are not an error
    /// here; requests fail with `MissingCredentials` instead.
    pub fn new(aws: &AwsOptions) -> Result<Self, QueueError> {
        if !aws.signature_version.eq_ignore_ascii_case("v4") {
            return Err(ConfigurationError::Invalid {
                message: format!(
                    "Unsupported signature version '{}'; only v4 is supported",
                    aws.signature_version
                ),
            }
            .into());
        }

        let signer = match (&aws.access_key_id, &aws.secret_access_key) {
            (Some(access_key), Some(secret_key)) => {
                Some(AwsV4Signer::new(access_key.clone(), secret_key.clone()))
            }
            _ => None,
        };

        let http_client = HttpClient::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ConfigurationError::Invalid {
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        Ok(Self {
            http_client,
            signer,
            aws: aws.clone(),
        })
    }

    /// Sign and send one action against a queue, returning the response body
    async fn make_request(
        &self,
        queue_url: &str,
        action: &str,
        mut params: BTreeMap<String, String>,
        extra: &BTreeMap<String, String>,
        timeout: Duration,
    ) -> Result<String, TransportFailure> {
        let signer = self.signer.as_ref().ok_or_else(|| {
            TransportFailure::new("MissingCredentials", "No AWS credentials configured")
                .with_retryable(false)
        })?;

        let url = url::Url::parse(queue_url).map_err(|e| {
            TransportFailure::new("InvalidAddress", format!("Invalid queue URL: {}", e))
                .with_retryable(false)
        })?;
        let host = match (url.host_str(), url.port()) {
            (Some(host), Some(port)) => format!("{}:{}", host, port),
            (Some(host), None) => host.to_string(),
            (None, _) => {
                return Err(TransportFailure::new("InvalidAddress", "Queue URL has no host")
                    .with_retryable(false))
            }
        };
        let region = self.aws.region_for(queue_url).ok_or_else(|| {
            TransportFailure::new("ConfigError", "Missing region in config").with_retryable(false)
        })?;

        params.insert("Action".to_string(), action.to_string());
        params.insert("Version".to_string(), API_VERSION.to_string());
        params.insert("QueueUrl".to_string(), queue_url.to_string());
        params.extend(extra.iter().map(|(k, v)| (k.clone(), v.clone())));

        let body = params
            .iter()
            .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
            .collect::<Vec<_>>()
            .join("&");

        let auth_headers =
            signer.sign_request("POST", &host, url.path(), &body, &region, &Utc::now());

        let mut request = self
            .http_client
            .post(url.clone())
            .timeout(timeout)
            .header("content-type", "application/x-www-form-urlencoded")
            .body(body);
        for (key, value) in auth_headers {
            request = request.header(key, value);
        }

        let response = request.send().await.map_err(|e| {
            let code = if e.is_timeout() {
                "TimeoutError"
            } else {
                "NetworkingError"
            };
            TransportFailure::new(code, format!("HTTP request failed: {}", e)).with_retryable(true)
        })?;

        let status = response.status();
        let response_body = response.text().await.map_err(|e| {
            TransportFailure::new(
                "NetworkingError",
                format!("Failed to read response body: {}", e),
            )
            .with_retryable(true)
        })?;

        if !status.is_success() {
            return Err(parse_error_response(&response_body, status.as_u16()));
        }

        Ok(response_body)
    }
}

impl fmt::Debug for SqsTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqsTransport")
            .field("aws", &self.aws)
            .field("signer", &self.signer.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

#[async_trait]
impl QueueTransport for SqsTransport {
    async fn receive(&self, request: &ReceiveRequest) -> Result<Vec<RawEntry>, TransportFailure> {
        let mut params = BTreeMap::new();
        params.insert(
            "MaxNumberOfMessages".to_string(),
            request.max_messages.to_string(),
        );
        params.insert(
            "VisibilityTimeout".to_string(),
            request.visibility_timeout.to_string(),
        );
        params.insert("WaitTimeSeconds".to_string(), request.wait_seconds.to_string());
        for (index, name) in request.attribute_names.iter().enumerate() {
            params.insert(format!("MessageAttributeName.{}", index + 1), name.clone());
        }

        let timeout = Duration::from_secs(u64::from(request.wait_seconds)) + RECEIVE_TIMEOUT_MARGIN;
        let response = self
            .make_request(
                &request.queue_url,
                "ReceiveMessage",
                params,
                &request.extra,
                timeout,
            )
            .await?;

        parse_receive_message_response(&response)
    }

    async fn send(&self, request: &SendRequest) -> Result<String, TransportFailure> {
        let mut params = BTreeMap::new();
        params.insert("MessageBody".to_string(), request.body.clone());
        params.insert("DelaySeconds".to_string(), request.delay_seconds.to_string());
        encode_attributes(&mut params, "MessageAttribute", &request.attributes);

        let response = self
            .make_request(
                &request.queue_url,
                "SendMessage",
                params,
                &request.extra,
                REQUEST_TIMEOUT,
            )
            .await?;

        parse_send_message_response(&response)
    }

    async fn send_batch(
        &self,
        request: &SendBatchRequest,
    ) -> Result<BatchOutcome, TransportFailure> {
        let mut params = BTreeMap::new();
        for (index, entry) in request.entries.iter().enumerate() {
            let prefix = format!("SendMessageBatchRequestEntry.{}", index + 1);
            params.insert(format!("{}.Id", prefix), entry.id.clone());
            params.insert(format!("{}.MessageBody", prefix), entry.body.clone());
            params.insert(
                format!("{}.DelaySeconds", prefix),
                entry.delay_seconds.to_string(),
            );
            encode_attributes(
                &mut params,
                &format!("{}.MessageAttribute", prefix),
                &entry.attributes,
            );
        }

        let response = self
            .make_request(
                &request.queue_url,
                "SendMessageBatch",
                params,
                &request.extra,
                REQUEST_TIMEOUT,
            )
            .await?;

        parse_send_batch_response(&response)
    }

    async fn delete(&self, queue_url: &str, receipt: &str) -> Result<(), TransportFailure> {
        let mut params = BTreeMap::new();
        params.insert("ReceiptHandle".to_string(), receipt.to_string());

        // DeleteMessage returns an empty result on success
        self.make_request(
            queue_url,
            "DeleteMessage",
            params,
            &BTreeMap::new(),
            REQUEST_TIMEOUT,
        )
        .await?;
        Ok(())
    }

    async fn purge(&self, queue_url: &str) -> Result<(), TransportFailure> {
        self.make_request(
            queue_url,
            "PurgeQueue",
            BTreeMap::new(),
            &BTreeMap::new(),
            REQUEST_TIMEOUT,
        )
        .await?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "sqs"
    }
}

/// Encode message attributes as `<prefix>.N.Name` / `<prefix>.N.Value.*` parameters
fn encode_attributes(
    params: &mut BTreeMap<String, String>,
    prefix: &str,
    attributes: &BTreeMap<String, AttributeValue>,
) {
    for (index, (name, value)) in attributes.iter().enumerate() {
        let key = format!("{}.{}", prefix, index + 1);
        params.insert(format!("{}.Name", key), name.clone());
        params.insert(
            format!("{}.Value.DataType", key),
            value.data_type().to_string(),
        );
        match value {
            AttributeValue::String(s) | AttributeValue::Number(s) => {
                params.insert(format!("{}.Value.StringValue", key), s.clone());
            }
            AttributeValue::Binary(b) => {
                params.insert(format!("{}.Value.BinaryValue", key), STANDARD.encode(b));
            }
        }
    }
}

// ============================================================================
// XML Parsing
// ============================================================================

enum XmlEvent<'a> {
    Start(&'a [String]),
    Text(&'a [String], String),
    End(&'a [String]),
}

fn ends_with(path: &[String], suffix: &[&str]) -> bool {
    path.len() >= suffix.len()
        && path[path.len() - suffix.len()..]
            .iter()
            .zip(suffix)
            .all(|(a, b)| a == b)
}

/// Walk an XML document, reporting element boundaries and text with the
/// element path leading to them.
///
/// Text is reported untrimmed, once per element, just before its end tag.
fn walk_xml<F>(xml: &str, mut visit: F) -> Result<(), TransportFailure>
where
    F: FnMut(XmlEvent<'_>),
{
    use quick_xml::events::Event;
    use quick_xml::Reader;

    let mut reader = Reader::from_str(xml);

    let mut path: Vec<String> = Vec::new();
    let mut text: Option<String> = None;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => {
                text = None;
                path.push(String::from_utf8_lossy(e.name().as_ref()).into_owned());
                visit(XmlEvent::Start(&path));
            }
            Ok(Event::Empty(ref e)) => {
                text = None;
                path.push(String::from_utf8_lossy(e.name().as_ref()).into_owned());
                visit(XmlEvent::Start(&path));
                visit(XmlEvent::End(&path));
                path.pop();
            }
            Ok(Event::End(_)) => {
                if let Some(text) = text.take() {
                    visit(XmlEvent::Text(&path, text));
                }
                visit(XmlEvent::End(&path));
                path.pop();
            }
            Ok(Event::Text(e)) => {
                let unescaped = e.unescape().map_err(|e| {
                    TransportFailure::new("SerializationError", format!("Failed to parse XML: {}", e))
                })?;
                text.get_or_insert_with(String::new).push_str(&unescaped);
            }
            Ok(Event::CData(e)) => {
                text.get_or_insert_with(String::new)
                    .push_str(&String::from_utf8_lossy(&e.into_inner()));
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(TransportFailure::new(
                    "SerializationError",
                    format!("XML parsing error: {}", e),
                ))
            }
            _ => {}
        }
        buf.clear();
    }

    Ok(())
}

/// Layout whitespace around identifiers and codes is not part of the value
fn field(text: String) -> String {
    text.trim().to_string()
}

/// Parse an error response into a transport failure
fn parse_error_response(xml: &str, status_code: u16) -> TransportFailure {
    let mut code = None;
    let mut message = None;
    let mut request_id = None;

    let _ = walk_xml(xml, |event| {
        if let XmlEvent::Text(path, text) = event {
            if ends_with(path, &["Error", "Code"]) {
                code = Some(field(text));
            } else if ends_with(path, &["Error", "Message"]) {
                message = Some(field(text));
            } else if ends_with(path, &["RequestId"]) {
                request_id = Some(field(text));
            }
        }
    });

    let code = code.unwrap_or_else(|| format!("HTTP{}", status_code));
    let retryable = status_code >= 500 || THROTTLING_CODES.contains(&code.as_str());

    let mut failure = TransportFailure {
        code: Some(code),
        message,
        status_code: Some(status_code),
        request_id: None,
        retryable: Some(retryable),
        retry_delay: None,
    };
    if let Some(request_id) = request_id {
        failure = failure.with_request_id(request_id);
    }
    failure
}

/// Parse a SendMessage response into the message id
fn parse_send_message_response(xml: &str) -> Result<String, TransportFailure> {
    let mut message_id = None;
    walk_xml(xml, |event| {
        if let XmlEvent::Text(path, text) = event {
            if ends_with(path, &["SendMessageResult", "MessageId"]) {
                message_id = Some(field(text));
            }
        }
    })?;

    message_id.ok_or_else(|| {
        TransportFailure::new("SerializationError", "MessageId not found in response")
    })
}

/// Parse a SendMessageBatch response
fn parse_send_batch_response(xml: &str) -> Result<BatchOutcome, TransportFailure> {
    let mut outcome = BatchOutcome::default();
    let mut current: Option<FailedEntry> = None;

    walk_xml(xml, |event| match event {
        XmlEvent::Start(path) if ends_with(path, &["BatchResultErrorEntry"]) => {
            current = Some(FailedEntry {
                id: String::new(),
                code: String::new(),
                message: None,
                sender_fault: false,
            });
        }
        XmlEvent::Text(path, text) => {
            if ends_with(path, &["SendMessageBatchResultEntry", "Id"]) {
                outcome.successful.push(field(text));
            } else if let Some(entry) = current.as_mut() {
                if ends_with(path, &["BatchResultErrorEntry", "Id"]) {
                    entry.id = field(text);
                } else if ends_with(path, &["BatchResultErrorEntry", "Code"]) {
                    entry.code = field(text);
                } else if ends_with(path, &["BatchResultErrorEntry", "Message"]) {
                    entry.message = Some(field(text));
                } else if ends_with(path, &["BatchResultErrorEntry", "SenderFault"]) {
                    entry.sender_fault = text.trim().eq_ignore_ascii_case("true");
                }
            }
        }
        XmlEvent::End(path) if ends_with(path, &["BatchResultErrorEntry"]) => {
            if let Some(entry) = current.take() {
                outcome.failed.push(entry);
            }
        }
        _ => {}
    })?;

    Ok(outcome)
}

/// Attribute being assembled while parsing a received message
#[derive(Default)]
struct PendingAttribute {
    name: Option<String>,
    data_type: Option<String>,
    string_value: Option<String>,
    binary_value: Option<bytes::Bytes>,
}

/// Parse a ReceiveMessage response into raw entries
fn parse_receive_message_response(xml: &str) -> Result<Vec<RawEntry>, TransportFailure> {
    let mut entries = Vec::new();
    let mut current: Option<RawEntry> = None;
    let mut attribute: Option<PendingAttribute> = None;

    walk_xml(xml, |event| match event {
        XmlEvent::Start(path) if ends_with(path, &["ReceiveMessageResult", "Message"]) => {
            current = Some(RawEntry::default());
        }
        XmlEvent::Start(path) if ends_with(path, &["Message", "MessageAttribute"]) => {
            attribute = Some(PendingAttribute::default());
        }
        XmlEvent::Text(path, text) => {
            if let Some(pending) = attribute.as_mut() {
                if ends_with(path, &["MessageAttribute", "Name"]) {
                    pending.name = Some(field(text));
                } else if ends_with(path, &["MessageAttribute", "Value", "DataType"]) {
                    pending.data_type = Some(field(text));
                } else if ends_with(path, &["MessageAttribute", "Value", "StringValue"]) {
                    pending.string_value = Some(text);
                } else if ends_with(path, &["MessageAttribute", "Value", "BinaryValue"]) {
                    pending.binary_value = STANDARD.decode(text.trim().as_bytes()).ok().map(Into::into);
                }
            } else if let Some(entry) = current.as_mut() {
                if ends_with(path, &["Message", "MessageId"]) {
                    entry.message_id = Some(field(text));
                } else if ends_with(path, &["Message", "ReceiptHandle"]) {
                    entry.receipt_handle = Some(field(text));
                } else if ends_with(path, &["Message", "Body"]) {
                    entry.body = Some(text);
                }
            }
        }
        XmlEvent::End(path) if ends_with(path, &["Message", "MessageAttribute"]) => {
            if let (Some(pending), Some(entry)) = (attribute.take(), current.as_mut()) {
                if let (Some(name), Some(data_type)) = (pending.name, pending.data_type) {
                    entry.attributes.insert(
                        name,
                        RawAttribute {
                            data_type,
                            string_value: pending.string_value,
                            binary_value: pending.binary_value,
                        },
                    );
                }
            }
        }
        XmlEvent::End(path) if ends_with(path, &["ReceiveMessageResult", "Message"]) => {
            if let Some(entry) = current.take() {
                entries.push(entry);
            }
        }
        _ => {}
    })?;

    Ok(entries)
}
