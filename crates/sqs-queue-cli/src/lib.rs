//! # SQS Queue CLI
//!
//! Command-line interface for the `sqs-queue` client.
//!
//! This module provides CLI commands for:
//! - Pushing single payloads and JSON arrays of payloads
//! - Pulling messages, printed as JSON lines
//! - Purging a queue
//! - Showing the resolved client configuration
//!
//! Logs go to stderr so stdout only carries command output.

use clap::{CommandFactory, Parser, Subcommand};
use serde::Serialize;
use serde_json::Value;
use sqs_queue::{
    AttributeValue, CancelToken, ClientOptions, ConfigurationError, Message, QueueClient,
    QueueClientFactory, QueueError, RequestOptions,
};
use std::collections::BTreeMap;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;

// ============================================================================
// CLI Structure
// ============================================================================

/// SQS Queue CLI - push, pull and purge messages
#[derive(Parser, Debug)]
#[command(name = "sqs-queue")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Push, pull and purge messages on an SQS queue")]
pub struct Cli {
    /// Configuration file path (toml, yaml or json)
    #[arg(short, long, env = "SQS_QUEUE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Queue URL, overriding the configuration
    #[arg(short = 'u', long, env = "SQS_QUEUE_URL")]
    pub queue_url: Option<String>,

    /// Logging level or filter directive
    #[arg(short, long, default_value = "info")]
    pub log_level: String,

    /// Enable JSON logging
    #[arg(long)]
    pub json_logs: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Push one JSON payload
    Push {
        /// JSON payload
        payload: String,

        /// Message attribute as key=value; may be repeated
        #[arg(short, long = "attribute", value_parser = parse_key_value)]
        attributes: Vec<(String, String)>,

        /// Delivery delay in seconds
        #[arg(short, long)]
        delay: Option<u32>,
    },

    /// Push every element of a JSON array
    BulkPush {
        /// File holding the JSON array, or - for stdin
        file: PathBuf,

        /// Message attribute as key=value; may be repeated
        #[arg(short, long = "attribute", value_parser = parse_key_value)]
        attributes: Vec<(String, String)>,

        /// Delivery delay in seconds
        #[arg(short, long)]
        delay: Option<u32>,
    },

    /// Wait for messages and print them as JSON lines
    Pull {
        /// Maximum number of messages to receive
        #[arg(short = 'n', long)]
        max_messages: Option<u32>,

        /// Long-poll wait in seconds
        #[arg(short, long)]
        wait: Option<u32>,

        /// Visibility timeout in seconds
        #[arg(short, long)]
        visibility: Option<u32>,

        /// Leave pulled messages on the queue
        #[arg(short, long)]
        keep: bool,
    },

    /// Delete every message on the queue
    Purge {
        /// Confirm the purge
        #[arg(short, long)]
        yes: bool,
    },

    /// Print the resolved configuration as JSON, secrets redacted
    Config,

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

/// Parse a `key=value` argument
pub fn parse_key_value(input: &str) -> Result<(String, String), String> {
    match input.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected key=value, got '{}'", input)),
    }
}

// ============================================================================
// CLI Error Types
// ============================================================================

/// CLI error types
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("Command failed: {message}")]
    CommandFailed { message: String },

    #[error("Invalid argument: {arg} - {message}")]
    InvalidArgument { arg: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CliError {
    /// Process exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Configuration(_) => 1,
            Self::Queue(_) => 2,
            Self::CommandFailed { .. } => 3,
            Self::InvalidArgument { .. } => 4,
            Self::Io(_) => 5,
        }
    }
}

// ============================================================================
// Output Types
// ============================================================================

/// A pulled message as printed on stdout
#[derive(Debug, Serialize, PartialEq)]
pub struct MessageOutput {
    pub id: Option<String>,
    pub timestamp: Option<i64>,
    pub attributes: BTreeMap<String, String>,
    pub payload: Value,
}

impl From<&Message> for MessageOutput {
    fn from(message: &Message) -> Self {
        let attributes = message
            .attributes()
            .iter()
            .map(|(name, value)| {
                let shown = match value.as_str() {
                    Some(s) => s.to_string(),
                    None => format!(
                        "<binary {} bytes>",
                        value.as_bytes().map_or(0, |b| b.len())
                    ),
                };
                (name.clone(), shown)
            })
            .collect();

        Self {
            id: message.id().map(str::to_string),
            timestamp: message.timestamp(),
            attributes,
            payload: message.payload().clone(),
        }
    }
}

// ============================================================================
// Main Entry Point
// ============================================================================

/// Parse arguments from the process and run the selected command
pub async fn run_cli() -> Result<(), CliError> {
    let cli = Cli::parse();

    initialize_logging(&cli.log_level, cli.json_logs)?;

    run(cli).await
}

/// Run a parsed command line
pub async fn run(cli: Cli) -> Result<(), CliError> {
    let options = load_options(cli.config.as_deref(), cli.queue_url.as_deref())?;

    match cli.command {
        Commands::Push {
            payload,
            attributes,
            delay,
        } => {
            let client = QueueClientFactory::create_client(options)?;
            execute_push_command(&client, &payload, attributes, delay).await
        }
        Commands::BulkPush {
            file,
            attributes,
            delay,
        } => {
            let client = QueueClientFactory::create_client(options)?;
            let input = read_input(&file)?;
            execute_bulk_push_command(&client, &input, attributes, delay).await
        }
        Commands::Pull {
            max_messages,
            wait,
            visibility,
            keep,
        } => {
            let client = QueueClientFactory::create_client(options)?;
            let call = pull_options(max_messages, wait, visibility);
            let cancel = CancelToken::new();
            let ctrl_c = {
                let cancel = cancel.clone();
                tokio::spawn(async move {
                    if tokio::signal::ctrl_c().await.is_ok() {
                        info!("Interrupt received; cancelling pull");
                        cancel.cancel();
                    }
                })
            };
            let mut stdout = std::io::stdout();
            let result = execute_pull_command(&client, &call, keep, &cancel, &mut stdout).await;
            ctrl_c.abort();
            result
        }
        Commands::Purge { yes } => {
            let client = QueueClientFactory::create_client(options)?;
            execute_purge_command(&client, yes).await
        }
        Commands::Config => {
            let rendered = render_config(&options)?;
            println!("{}", rendered);
            Ok(())
        }
        Commands::Completions { shell } => {
            let mut command = Cli::command();
            clap_complete::generate(shell, &mut command, "sqs-queue", &mut std::io::stdout());
            Ok(())
        }
    }
}

// ============================================================================
// Setup
// ============================================================================

/// Install the tracing subscriber, writing to stderr.
///
/// `RUST_LOG` takes precedence over `log_level`.
pub fn initialize_logging(log_level: &str, json: bool) -> Result<(), CliError> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_level))
        .map_err(|e| CliError::InvalidArgument {
            arg: "--log-level".to_string(),
            message: e.to_string(),
        })?;

    let registry = tracing_subscriber::registry().with(filter);
    let result = if json {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .try_init()
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .try_init()
    };

    result.map_err(|e| CliError::CommandFailed {
        message: format!("Failed to initialize logging: {}", e),
    })
}

/// Load client options from the configuration sources, then apply the
/// command-line queue URL
pub fn load_options(
    config: Option<&Path>,
    queue_url: Option<&str>,
) -> Result<ClientOptions, CliError> {
    let mut options = ClientOptions::load(config)?;
    if let Some(url) = queue_url {
        options.queue_url = Some(url.to_string());
    }
    debug!(
        client = %options.name,
        queue_url = ?options.queue_url,
        "Loaded client options"
    );
    Ok(options)
}

fn read_input(file: &Path) -> Result<String, CliError> {
    if file == Path::new("-") {
        let mut input = String::new();
        std::io::stdin().read_to_string(&mut input)?;
        return Ok(input);
    }
    Ok(std::fs::read_to_string(file)?)
}

/// Per-call options for a push
pub fn push_options(attributes: Vec<(String, String)>, delay: Option<u32>) -> RequestOptions {
    let mut call = RequestOptions::new();
    for (key, value) in attributes {
        call = call.with_attribute(key, AttributeValue::String(value));
    }
    if let Some(delay) = delay {
        call = call.with_delay_seconds(delay);
    }
    call
}

/// Per-call options for a pull
pub fn pull_options(
    max_messages: Option<u32>,
    wait: Option<u32>,
    visibility: Option<u32>,
) -> RequestOptions {
    RequestOptions {
        max_messages,
        wait_seconds: wait,
        visibility_seconds: visibility,
        ..RequestOptions::default()
    }
}

// ============================================================================
// Command Implementations
// ============================================================================

async fn execute_push_command(
    client: &QueueClient,
    payload: &str,
    attributes: Vec<(String, String)>,
    delay: Option<u32>,
) -> Result<(), CliError> {
    let payload: Value = serde_json::from_str(payload).map_err(|e| CliError::InvalidArgument {
        arg: "payload".to_string(),
        message: format!("not valid JSON: {}", e),
    })?;

    let message_id = client
        .push(&payload, Some(&push_options(attributes, delay)))
        .await?;
    info!(message_id = %message_id, "Pushed message");
    println!("{}", message_id);
    Ok(())
}

/// Push every element of a JSON array; fails when any entry was rejected
pub async fn execute_bulk_push_command(
    client: &QueueClient,
    input: &str,
    attributes: Vec<(String, String)>,
    delay: Option<u32>,
) -> Result<(), CliError> {
    let items: Vec<Value> = serde_json::from_str(input).map_err(|e| CliError::InvalidArgument {
        arg: "file".to_string(),
        message: format!("expected a JSON array: {}", e),
    })?;

    let failed = client
        .bulk_push(&items, Some(&push_options(attributes, delay)))
        .await?;
    info!(
        items = items.len(),
        failed = failed.len(),
        "Bulk push complete"
    );

    if failed.is_empty() {
        return Ok(());
    }
    for entry in &failed {
        warn!(
            entry_id = %entry.id,
            code = %entry.code,
            message = ?entry.message,
            "Entry rejected"
        );
    }
    Err(CliError::CommandFailed {
        message: format!("{} of {} entries were rejected", failed.len(), items.len()),
    })
}

/// Pull once, write each message as a JSON line and delete it unless `keep`.
///
/// A cancelled pull is not an error.
pub async fn execute_pull_command<W: std::io::Write>(
    client: &QueueClient,
    call: &RequestOptions,
    keep: bool,
    cancel: &CancelToken,
    out: &mut W,
) -> Result<(), CliError> {
    let pulled = match client.pull_with_cancel(Some(call), cancel).await {
        Ok(pulled) => pulled,
        Err(QueueError::Cancelled) => {
            info!("Pull cancelled");
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };

    for mut message in pulled.into_vec() {
        let line = serde_json::to_string(&MessageOutput::from(&message)).map_err(|e| {
            CliError::CommandFailed {
                message: format!("Failed to render message: {}", e),
            }
        })?;
        writeln!(out, "{}", line)?;

        if !keep {
            message.destroy().await?;
        }
    }
    Ok(())
}

async fn execute_purge_command(client: &QueueClient, yes: bool) -> Result<(), CliError> {
    if !yes {
        return Err(CliError::InvalidArgument {
            arg: "--yes".to_string(),
            message: "purge deletes every message on the queue; pass --yes to confirm".to_string(),
        });
    }
    client.purge(None).await?;
    info!("Queue purged");
    Ok(())
}

/// Render options as pretty JSON with the AWS secret redacted
pub fn render_config(options: &ClientOptions) -> Result<String, CliError> {
    let mut shown = options.clone();
    shown.aws = shown.aws.redacted();
    serde_json::to_string_pretty(&shown).map_err(|e| CliError::CommandFailed {
        message: format!("Failed to render configuration: {}", e),
    })
}
