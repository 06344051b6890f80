//! blob-lifecycle: run the blob lifecycle once against a storage account.

use clap::Parser;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use blob_lifecycle::{Args, Config, Workflow};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // Parse command-line arguments
    let args = Args::parse();

    // Set up logging
    let log_level = if args.debug {
        Level::DEBUG
    } else if args.silent {
        Level::ERROR
    } else {
        Level::INFO
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    let json = args.json;
    let config = Config::from(args);
    info!(local_dir = %config.local_dir.display(), in_memory = config.in_memory, "Starting blob lifecycle run");

    let report = Workflow::new(config).run().await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    }
    if !report.is_clean() {
        // Cleanup problems are reported but do not fail the run
        for problem in &report.cleanup_errors {
            eprintln!("cleanup: {}", problem);
        }
    }
    info!(container = %report.container, blob = %report.blob, "Run complete");
    Ok(())
}
