use sqs_queue_cli::run_cli;
use tracing::error;

#[tokio::main]
async fn main() {
    // Run CLI and exit with a code matching the error type
    if let Err(e) = run_cli().await {
        error!(error = %e, "CLI error");
        eprintln!("{}", e);
        std::process::exit(e.exit_code());
    }
}
