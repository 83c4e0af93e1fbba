//! Backup binary entry point.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use backup::{BackupConfig, BackupPipeline, JsonFileSource, LoggingCommitter};
use common::create_upload_store;

#[derive(Debug, Parser)]
#[command(
    name = "backup",
    about = "Continuously backs up topic records into object storage"
)]
struct CliArgs {
    /// Path to a YAML configuration file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Newline-delimited JSON record file to consume.
    #[arg(long)]
    source: PathBuf,
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Parse CLI arguments
    let args = CliArgs::parse();
    let config = match &args.config {
        Some(path) => match BackupConfig::from_yaml_file(path) {
            Ok(config) => config,
            Err(e) => {
                tracing::error!("failed to load configuration: {}", e);
                std::process::exit(1);
            }
        },
        None => BackupConfig::default(),
    };

    tracing::info!("Starting backup with config: {:?}", config);

    let store = create_upload_store(&config.storage)
        .await
        .expect("Failed to create upload store");
    let source = JsonFileSource::open(&args.source)
        .await
        .expect("Failed to open record source");

    let handle = BackupPipeline::new(config, source, Arc::new(LoggingCommitter), store).start();

    // Log completed objects as they appear.
    let mut results = handle.subscribe();
    tokio::spawn(async move {
        while let Ok(result) = results.recv().await {
            tracing::info!(key = %result.key, size = result.object_size, "object backed up");
        }
    });

    // Drain gracefully on Ctrl-C, leaving the open upload resumable.
    let signal_task = {
        let token = handle.shutdown_token();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("shutdown signal received");
                token.cancel();
            }
        })
    };

    let outcome = handle.wait().await;
    signal_task.abort();
    if let Err(e) = outcome {
        tracing::error!("backup failed: {}", e);
        std::process::exit(1);
    }
}
