//! tap-s3-csv: a Singer tap for CSV files in S3.
//!
//! Protocol messages are written to stdout; logs go to stderr.

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use tap_s3_csv::error::TapError;
use tap_s3_csv::{
    Catalog, Config, FileExtractor, JsonLinesWriter, RunState, StorageProvider, do_discover,
    sync_run, synchronize,
};

/// Extract CSV files from S3 as a Singer tap.
#[derive(Parser, Debug)]
#[command(name = "tap-s3-csv")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file.
    #[arg(short, long)]
    config: PathBuf,

    /// Run discovery and write the catalog.
    #[arg(short, long)]
    discover: bool,

    /// Catalog selecting the streams to sync.
    #[arg(short, long, visible_alias = "catalog")]
    properties: Option<PathBuf>,

    /// State file to resume from.
    #[arg(short, long)]
    state: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[snafu::report]
#[tokio::main]
async fn main() -> Result<(), TapError> {
    let args = Args::parse();

    // Initialize logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config = Config::from_file(&args.config)?;
    let storage = Arc::new(StorageProvider::for_config(&config)?);

    match storage.probe().await {
        Ok(_) => info!("Bucket access verified: {}", storage.canonical_url()),
        Err(e) => warn!(
            "Unable to list bucket {}; continuing, sync may fail: {e}",
            storage.canonical_url()
        ),
    }

    if args.discover {
        do_discover(&config, &storage).await?;
        return Ok(());
    }

    let state = args.state.as_ref().map(RunState::load).transpose()?;

    let extractor = FileExtractor::new(storage.clone());
    let mut writer = JsonLinesWriter::stdout();

    let summary = match &args.properties {
        Some(path) => {
            let catalog = Catalog::load(path)?;
            let mut state = state.unwrap_or_default();
            synchronize(&config, &catalog, &mut state, &extractor, &mut writer).await?
        }
        None => {
            sync_run(&config, &storage, None, state, &extractor, &mut writer)
                .await?
                .0
        }
    };

    info!(
        "Synced {} rows across {} streams",
        summary.total_rows(),
        summary.rows.len()
    );
    Ok(())
}
