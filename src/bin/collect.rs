#![forbid(unsafe_code)]

//! Collector entry point. Loads configuration and the channel list, opens the
//! content store, then walks every channel once and prints a summary.
//!
//! Only configuration and store problems abort the run; a failing channel is
//! reported and skipped.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use content_feed_tools::{
    collector::{ChannelOutcome, RunSummary, collect_channels},
    config::{ConfigOverrides, StoreLocation, load_channels, resolve_collector_config},
    logging::init_tracing,
    store::ContentStore,
    youtube::YouTubeClient,
};

#[derive(Debug, Parser)]
#[command(
    name = "collect",
    about = "Fetch recent long-form uploads from the configured channels"
)]
struct CollectArgs {
    /// dotenv file to read before the process environment.
    #[arg(long, value_name = "PATH")]
    env_file: Option<PathBuf>,
    /// Local database file; overrides CONTENT_DB_PATH and CONTENT_DB_URL.
    #[arg(long, value_name = "PATH")]
    db_path: Option<PathBuf>,
    #[arg(long, value_name = "PATH")]
    channels_file: Option<PathBuf>,
    /// Most recent uploads to inspect per channel (the API caps this at 50).
    #[arg(long, value_name = "N")]
    max_results: Option<u32>,
}

impl CollectArgs {
    fn into_overrides(self) -> ConfigOverrides {
        ConfigOverrides {
            env_path: self.env_file,
            db_path: self.db_path,
            channels_file: self.channels_file,
            max_results: self.max_results,
            ..ConfigOverrides::default()
        }
    }
}

// The run is strictly sequential; a single-threaded runtime is all the async
// store needs, and blocking API calls simply hold that thread.
#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    init_tracing("content_feed_tools=info,collect=info");
    let args = CollectArgs::parse();

    let config = resolve_collector_config(args.into_overrides()).context("loading configuration")?;
    let channels = load_channels(&config.channels_file)?;

    println!("Starting YouTube collector");
    println!("Loaded {} channel(s) from {}", channels.len(), config.channels_file.display());
    match &config.store {
        StoreLocation::Local(path) => println!("Content DB: {}", path.display()),
        StoreLocation::Remote { url, .. } => println!("Content DB: {url}"),
    }

    let store = ContentStore::open(&config.store)
        .await
        .context("opening content store")?;
    let client = YouTubeClient::from_config(&config);

    let summary = collect_channels(&client, &store, &channels, config.max_results).await;
    print_summary(&summary);

    Ok(())
}

fn print_summary(summary: &RunSummary) {
    println!();
    for outcome in &summary.outcomes {
        match outcome {
            ChannelOutcome::Succeeded { .. } => println!("  {outcome}"),
            ChannelOutcome::Failed { .. } => eprintln!("  Warning: {outcome}"),
        }
    }

    println!();
    println!("Collection complete!");
    println!("  Total new videos: {}", summary.total_new());
    println!("  Total duplicates: {}", summary.total_duplicates());
    let failed = summary.failed().count();
    if failed > 0 {
        println!("  Failed channels: {failed}");
    }
}
