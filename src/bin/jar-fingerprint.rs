//! Scans the archives named on the command line and prints them as JSON.
//!
//! Set `RUST_LOG` to control log output (stderr).

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use jar_fingerprint::{ArchiveScanner, ProvidesRegistry, ScanConfig, ScanExecutor};
use tracing_subscriber::EnvFilter;

/// Per-archive dependency fingerprints: provides, requires and package edges
#[derive(Parser, Debug)]
#[command(name = "jar-fingerprint")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Archives to scan; files that are not zip containers are skipped
    #[arg(required = true)]
    paths: Vec<PathBuf>,

    /// Number of archives scanned at once
    #[arg(short = 'j', long, default_value_t = 8)]
    concurrency: usize,

    /// JSON scan configuration (class suffix, manifest name, member size limit)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config = match &cli.config {
        Some(path) => ScanConfig::from_file(path)?,
        None => ScanConfig::default(),
    };

    let registry = Arc::new(ProvidesRegistry::new());
    let archives = ScanExecutor::new(cli.concurrency)
        .scan_all(
            Arc::new(ArchiveScanner::new().with_config(config)),
            cli.paths,
            Some(Arc::clone(&registry)),
            None,
        )
        .await;

    let duplicated = registry
        .snapshot()
        .values()
        .filter(|providers| providers.len() > 1)
        .count();
    tracing::info!(symbols = registry.len(), duplicated, "Provides registry built");

    println!("{}", serde_json::to_string_pretty(&archives)?);
    Ok(())
}
