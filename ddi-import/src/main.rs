//! ddi - study metadata import and search indexing

use anyhow::Result;
use clap::Parser;
use ddi_common::config::DdiConfig;
use ddi_import::cli::{run, Cli};
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = DdiConfig::load(cli.config.as_deref(), cli.root_folder.as_deref())?;

    let level: tracing::Level = config.logging.level.parse().unwrap_or(tracing::Level::INFO);
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    info!(
        "Starting ddi v{} (root folder {})",
        env!("CARGO_PKG_VERSION"),
        config.root_folder().display()
    );

    run(cli, config).await
}
