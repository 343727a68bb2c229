//! ddi-portal - JSON API over the DDI catalog

use anyhow::{Context, Result};
use clap::Parser;
use ddi_common::config::DdiConfig;
use ddi_import::study_admin::StudyAdmin;
use ddi_import::{ImportContext, JobQueue};
use ddi_portal::{build_router, AppState};
use ddi_search::{ElasticsearchBackend, IndexSynchronizer, SearchIndexer};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

/// Command-line arguments for ddi-portal
#[derive(Parser, Debug)]
#[command(name = "ddi-portal")]
#[command(about = "JSON API for the DDI study catalog")]
#[command(version)]
struct Args {
    /// Configuration file
    #[arg(short, long, env = "DDI_CONFIG")]
    config: Option<PathBuf>,

    /// Root folder holding the database and repository checkouts
    #[arg(short, long)]
    root_folder: Option<PathBuf>,

    /// Listen address (overrides bind_address)
    #[arg(short, long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = DdiConfig::load(args.config.as_deref(), args.root_folder.as_deref())?;

    let level: tracing::Level = config.logging.level.parse().unwrap_or(tracing::Level::INFO);
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    info!("Starting ddi-portal v{}", env!("CARGO_PKG_VERSION"));
    info!("Database path: {}", config.database_path().display());

    let config = Arc::new(config);
    let ctx = ImportContext::open(&config).await?;

    // Keep the search index current with webhook-triggered imports
    if let Some(url) = &config.search.url {
        let backend = ElasticsearchBackend::new(url).context("Invalid search url")?;
        let indexer = SearchIndexer::new(ctx.store.clone(), Arc::new(backend), &config.search.index_prefix);
        IndexSynchronizer::new(indexer).spawn(&ctx.events);
        info!("Search index synchronizer started ({})", url);
    } else {
        info!("Search indexing disabled (no search.url)");
    }

    if config.webhook_secret.is_none() {
        info!("No webhook_secret configured, push webhooks are accepted unsigned");
    }

    let admin = StudyAdmin::new(ctx, config.clone(), JobQueue::new(config.workers));
    let app = build_router(AppState::new(admin));

    let bind = args.bind.unwrap_or_else(|| config.bind_address.clone());
    let listener = tokio::net::TcpListener::bind(&bind)
        .await
        .with_context(|| format!("Failed to bind {}", bind))?;
    info!("ddi-portal listening on http://{}", bind);
    info!("Health check: http://{}/health", bind);

    axum::serve(listener, app).await?;

    Ok(())
}
