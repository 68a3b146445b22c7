//! Client configuration, per-call overrides and parameter merging.

use crate::error::{ConfigurationError, QueueError, ValidationError};
use crate::message::AttributeValue;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

/// Largest number of messages a single receive may return
pub const MAX_MESSAGES_LIMIT: u32 = 10;

/// Longest long-poll wait supported by the service
pub const MAX_WAIT_SECONDS: u32 = 20;

/// Longest visibility timeout supported by the service (12 hours)
pub const MAX_VISIBILITY_SECONDS: u32 = 43_200;

/// Longest send delay supported by the service (15 minutes)
pub const MAX_DELAY_SECONDS: u32 = 900;

/// Prefix of environment variables read by [`ClientOptions::load`]
pub const ENV_PREFIX: &str = "SQS_QUEUE";

// ============================================================================
// Client Options
// ============================================================================

/// Configuration of a queue client.
///
/// A client holds its options behind an `Arc` and never mutates them; derived
/// clients get a modified copy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientOptions {
    /// Logical client name, attached to log events
    pub name: String,
    /// Full URL of the queue
    #[serde(alias = "url")]
    pub queue_url: Option<String>,
    /// Client-level overrides and extra transport parameters
    #[serde(alias = "options")]
    pub params: RequestOptions,
    /// Maximum number of messages per pull
    #[serde(alias = "messages")]
    pub max_messages: u32,
    /// Long-poll wait time in seconds
    #[serde(alias = "wait")]
    pub wait_seconds: u32,
    /// Seconds a received message stays hidden from other consumers
    #[serde(alias = "visibility")]
    pub visibility_seconds: u32,
    /// Delete received messages that fail validation
    pub remove_invalid: bool,
    /// Seconds to delay delivery of pushed messages
    #[serde(alias = "delay")]
    pub delay_seconds: u32,
    pub aws: AwsOptions,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            name: "queue".to_string(),
            queue_url: None,
            params: RequestOptions::default(),
            max_messages: 1,
            wait_seconds: 20,
            visibility_seconds: 30,
            remove_invalid: true,
            delay_seconds: 0,
            aws: AwsOptions::default(),
        }
    }
}

impl ClientOptions {
    /// Create options for a queue URL with every other field defaulted
    pub fn new(queue_url: impl Into<String>) -> Self {
        Self {
            queue_url: Some(queue_url.into()),
            ..Self::default()
        }
    }

    /// Load options from built-in defaults, an optional file and the environment.
    ///
    /// Sources (applied in order, later sources override earlier ones):
    ///  1. Built-in defaults
    ///  2. `path`, if given; the format follows the file extension
    ///  3. Environment variables prefixed `SQS_QUEUE__` with `__` separators,
    ///     e.g. `SQS_QUEUE__AWS__REGION=eu-west-1`
    ///  4. `AWS_ACCESS_KEY`, `AWS_ACCESS_SECRET` and `AWS_REGION` for AWS fields
    ///     still unset
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigurationError> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            if !path.exists() {
                return Err(ConfigurationError::Missing {
                    key: path.display().to_string(),
                });
            }
            builder = builder.add_source(config::File::from(path).required(true));
        }

        let settings = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let mut options: ClientOptions = settings.try_deserialize()?;
        options.aws.fill_from_env(|key| std::env::var(key).ok());
        Ok(options)
    }

    /// Check that every option is within the range the service accepts
    pub fn validate(&self) -> Result<(), ValidationError> {
        check_range("max_messages", self.max_messages, 1, MAX_MESSAGES_LIMIT)?;
        check_range("wait_seconds", self.wait_seconds, 0, MAX_WAIT_SECONDS)?;
        check_range(
            "visibility_seconds",
            self.visibility_seconds,
            0,
            MAX_VISIBILITY_SECONDS,
        )?;
        check_range("delay_seconds", self.delay_seconds, 0, MAX_DELAY_SECONDS)?;
        if let Some(url) = &self.queue_url {
            url::Url::parse(url).map_err(|e| ValidationError::InvalidFormat {
                field: "queue_url".to_string(),
                message: e.to_string(),
            })?;
        }
        Ok(())
    }

    /// Produce a copy with the overridden fields replaced
    pub fn with_overrides(&self, overrides: &ClientOptionsOverride) -> Self {
        let mut derived = self.clone();
        if let Some(name) = &overrides.name {
            derived.name = name.clone();
        }
        if let Some(url) = &overrides.queue_url {
            derived.queue_url = Some(url.clone());
        }
        if let Some(params) = &overrides.params {
            derived.params = self.params.merged_with(params);
        }
        if let Some(max) = overrides.max_messages {
            derived.max_messages = max;
        }
        if let Some(wait) = overrides.wait_seconds {
            derived.wait_seconds = wait;
        }
        if let Some(visibility) = overrides.visibility_seconds {
            derived.visibility_seconds = visibility;
        }
        if let Some(remove) = overrides.remove_invalid {
            derived.remove_invalid = remove;
        }
        if let Some(delay) = overrides.delay_seconds {
            derived.delay_seconds = delay;
        }
        derived
    }

    /// Resolve the parameters of one operation.
    ///
    /// Precedence, last wins: client defaults, then `self.params`, then `call`.
    pub fn resolve(&self, call: Option<&RequestOptions>) -> Result<EffectiveParams, QueueError> {
        let overrides = match call {
            Some(call) => self.params.merged_with(call),
            None => self.params.clone(),
        };

        let queue_url = overrides
            .queue_url
            .or_else(|| self.queue_url.clone())
            .filter(|url| !url.is_empty())
            .ok_or_else(|| ConfigurationError::Missing {
                key: "queue_url".to_string(),
            })?;

        let params = EffectiveParams {
            queue_url,
            max_messages: overrides.max_messages.unwrap_or(self.max_messages),
            wait_seconds: overrides.wait_seconds.unwrap_or(self.wait_seconds),
            visibility_seconds: overrides
                .visibility_seconds
                .unwrap_or(self.visibility_seconds),
            delay_seconds: overrides.delay_seconds.unwrap_or(self.delay_seconds),
            extra: overrides.extra,
            attributes: overrides.attributes,
        };
        params.validate()?;
        Ok(params)
    }
}

fn check_range(field: &str, value: u32, min: u32, max: u32) -> Result<(), ValidationError> {
    if value < min || value > max {
        return Err(ValidationError::OutOfRange {
            field: field.to_string(),
            message: format!("{} is outside {}..={}", value, min, max),
        });
    }
    Ok(())
}

// ============================================================================
// AWS Options
// ============================================================================

/// Credentials and signing settings for the SQS transport
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AwsOptions {
    pub region: Option<String>,
    #[serde(alias = "key", alias = "accessKeyId")]
    pub access_key_id: Option<String>,
    #[serde(alias = "secret", alias = "secretAccessKey")]
    pub secret_access_key: Option<String>,
    #[serde(alias = "signatureVersion")]
    pub signature_version: String,
}

impl Default for AwsOptions {
    fn default() -> Self {
        Self {
            region: None,
            access_key_id: None,
            secret_access_key: None,
            signature_version: "v4".to_string(),
        }
    }
}

impl AwsOptions {
    /// Fill unset fields from the legacy credential variables
    pub(crate) fn fill_from_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |key: &str| lookup(key).filter(|v| !v.is_empty());
        if self.access_key_id.is_none() {
            self.access_key_id = lookup("AWS_ACCESS_KEY");
        }
        if self.secret_access_key.is_none() {
            self.secret_access_key = lookup("AWS_ACCESS_SECRET");
        }
        if self.region.is_none() {
            self.region = lookup("AWS_REGION");
        }
    }

    /// Region to sign for; taken from the queue host when not configured
    pub fn region_for(&self, queue_url: &str) -> Option<String> {
        if let Some(region) = &self.region {
            return Some(region.clone());
        }
        let url = url::Url::parse(queue_url).ok()?;
        let host = url.host_str()?;
        let mut parts = host.split('.');
        match (parts.next(), parts.next()) {
            (Some("sqs"), Some(region)) => Some(region.to_string()),
            _ => None,
        }
    }

    /// Copy with the secret removed, for display
    pub fn redacted(&self) -> Self {
        Self {
            secret_access_key: self
                .secret_access_key
                .as_ref()
                .map(|_| "<redacted>".to_string()),
            ..self.clone()
        }
    }
}

impl fmt::Debug for AwsOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AwsOptions")
            .field("region", &self.region)
            .field("access_key_id", &self.access_key_id)
            .field(
                "secret_access_key",
                &self.secret_access_key.as_ref().map(|_| "<redacted>"),
            )
            .field("signature_version", &self.signature_version)
            .finish()
    }
}

// ============================================================================
// Request Options
// ============================================================================

/// Per-call (or client-level) overrides of the client options
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RequestOptions {
    pub queue_url: Option<String>,
    pub max_messages: Option<u32>,
    pub wait_seconds: Option<u32>,
    pub visibility_seconds: Option<u32>,
    pub delay_seconds: Option<u32>,
    /// Raw transport parameters passed through unchanged
    pub extra: BTreeMap<String, String>,
    /// Message attributes attached to pushed messages. Configuration sources
    /// may set string and number attributes; binary ones are code-only.
    #[serde(with = "attribute_map")]
    pub attributes: BTreeMap<String, AttributeValue>,
}

/// Serde form of an attribute map: a plain JSON object of strings and numbers
mod attribute_map {
    use crate::message::AttributeValue;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use serde_json::Value;
    use std::collections::BTreeMap;

    pub fn serialize<S>(
        attributes: &BTreeMap<String, AttributeValue>,
        serializer: S,
    ) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let values: BTreeMap<&str, Value> = attributes
            .iter()
            .filter_map(|(name, value)| {
                let json = match value {
                    AttributeValue::String(s) => Value::String(s.clone()),
                    AttributeValue::Number(n) => serde_json::from_str::<serde_json::Number>(n)
                        .map(Value::Number)
                        .unwrap_or_else(|_| Value::String(n.clone())),
                    AttributeValue::Binary(_) => return None,
                };
                Some((name.as_str(), json))
            })
            .collect();
        values.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<BTreeMap<String, AttributeValue>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let values = BTreeMap::<String, Value>::deserialize(deserializer)?;
        Ok(values
            .into_iter()
            .filter_map(|(name, value)| AttributeValue::from_json(&value).map(|v| (name, v)))
            .collect())
    }
}

impl RequestOptions {
    /// Create empty overrides
    pub fn new() -> Self {
        Self::default()
    }

    /// Target a different queue
    pub fn with_queue_url(mut self, queue_url: impl Into<String>) -> Self {
        self.queue_url = Some(queue_url.into());
        self
    }

    /// Set maximum number of messages to receive
    pub fn with_max_messages(mut self, max: u32) -> Self {
        self.max_messages = Some(max);
        self
    }

    /// Set long-poll wait time
    pub fn with_wait_seconds(mut self, wait: u32) -> Self {
        self.wait_seconds = Some(wait);
        self
    }

    /// Set visibility timeout
    pub fn with_visibility_seconds(mut self, visibility: u32) -> Self {
        self.visibility_seconds = Some(visibility);
        self
    }

    /// Set push delay
    pub fn with_delay_seconds(mut self, delay: u32) -> Self {
        self.delay_seconds = Some(delay);
        self
    }

    /// Add a raw transport parameter
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    /// Add a message attribute
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Add a message attribute from a JSON value; unsupported types are dropped
    pub fn with_json_attribute(mut self, key: impl Into<String>, value: &Value) -> Self {
        if let Some(value) = AttributeValue::from_json(value) {
            self.attributes.insert(key.into(), value);
        }
        self
    }

    /// Overlay `other` on top of `self`; fields set in `other` win
    pub fn merged_with(&self, other: &RequestOptions) -> RequestOptions {
        let mut extra = self.extra.clone();
        extra.extend(other.extra.clone());
        let mut attributes = self.attributes.clone();
        attributes.extend(other.attributes.clone());

        RequestOptions {
            queue_url: other.queue_url.clone().or_else(|| self.queue_url.clone()),
            max_messages: other.max_messages.or(self.max_messages),
            wait_seconds: other.wait_seconds.or(self.wait_seconds),
            visibility_seconds: other.visibility_seconds.or(self.visibility_seconds),
            delay_seconds: other.delay_seconds.or(self.delay_seconds),
            extra,
            attributes,
        }
    }
}

// ============================================================================
// Client Option Overrides
// ============================================================================

/// Fields to replace when deriving a client from an existing one
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientOptionsOverride {
    pub name: Option<String>,
    pub queue_url: Option<String>,
    pub params: Option<RequestOptions>,
    pub max_messages: Option<u32>,
    pub wait_seconds: Option<u32>,
    pub visibility_seconds: Option<u32>,
    pub remove_invalid: Option<bool>,
    pub delay_seconds: Option<u32>,
}

impl ClientOptionsOverride {
    /// Create an empty override
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_queue_url(mut self, queue_url: impl Into<String>) -> Self {
        self.queue_url = Some(queue_url.into());
        self
    }

    pub fn with_params(mut self, params: RequestOptions) -> Self {
        self.params = Some(params);
        self
    }

    pub fn with_max_messages(mut self, max: u32) -> Self {
        self.max_messages = Some(max);
        self
    }

    pub fn with_wait_seconds(mut self, wait: u32) -> Self {
        self.wait_seconds = Some(wait);
        self
    }

    pub fn with_visibility_seconds(mut self, visibility: u32) -> Self {
        self.visibility_seconds = Some(visibility);
        self
    }

    pub fn with_remove_invalid(mut self, remove: bool) -> Self {
        self.remove_invalid = Some(remove);
        self
    }

    pub fn with_delay_seconds(mut self, delay: u32) -> Self {
        self.delay_seconds = Some(delay);
        self
    }
}

// ============================================================================
// Effective Parameters
// ============================================================================

/// Fully resolved parameters of a single operation
#[derive(Debug, Clone, PartialEq)]
pub struct EffectiveParams {
    pub queue_url: String,
    pub max_messages: u32,
    pub wait_seconds: u32,
    pub visibility_seconds: u32,
    pub delay_seconds: u32,
    pub extra: BTreeMap<String, String>,
    pub attributes: BTreeMap<String, AttributeValue>,
}

impl EffectiveParams {
    fn validate(&self) -> Result<(), ValidationError> {
        check_range("max_messages", self.max_messages, 1, MAX_MESSAGES_LIMIT)?;
        check_range("wait_seconds", self.wait_seconds, 0, MAX_WAIT_SECONDS)?;
        check_range(
            "visibility_seconds",
            self.visibility_seconds,
            0,
            MAX_VISIBILITY_SECONDS,
        )?;
        check_range("delay_seconds", self.delay_seconds, 0, MAX_DELAY_SECONDS)
    }
}

#[cfg(test)]
#[path = "options_tests.rs"]
mod tests;
