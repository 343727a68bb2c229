//! `ddi` command line

use crate::context::ImportContext;
use crate::queue::JobQueue;
use crate::study_admin::{StudyAdmin, StudyImport};
use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use ddi_common::config::DdiConfig;
use ddi_search::{DocumentType, ElasticsearchBackend, IndexSynchronizer, SearchIndexer};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

/// Command-line arguments for ddi
#[derive(Parser, Debug)]
#[command(name = "ddi")]
#[command(about = "Import and index DDI study metadata")]
#[command(version)]
pub struct Cli {
    /// Configuration file
    #[arg(short, long, global = true, env = "DDI_CONFIG")]
    pub config: Option<PathBuf>,

    /// Root folder holding the database and repository checkouts
    #[arg(short, long, global = true)]
    pub root_folder: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Register a study and its metadata repository
    Add { study: String, repo: String },

    /// Remove a study with all its metadata
    Remove {
        study: String,
        /// Do not ask for confirmation
        #[arg(short = 'y', long = "yes")]
        yes: bool,
    },

    /// Sync a study repository (or `all`) and import it
    Update {
        study: String,
        /// Entity keys to import (default: all)
        entities: Vec<String>,
        /// Import this file instead of the configured source
        #[arg(short, long)]
        filename: Option<PathBuf>,
        /// Use the checkout as it is, without pulling
        #[arg(short, long)]
        local: bool,
    },

    /// Pull every study and re-import those with new commits
    Upgrade,

    /// Sync the system repository and register the studies it lists
    System {
        #[arg(short, long)]
        local: bool,
    },

    /// Manage the search indices
    Index {
        action: IndexAction,
        /// Document types (default: all)
        #[arg(short, long = "type", value_delimiter = ',')]
        types: Vec<String>,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum IndexAction {
    Create,
    Delete,
    Reset,
    Rebuild,
}

fn document_types(names: &[String]) -> Result<Vec<DocumentType>> {
    if names.is_empty() {
        return Ok(DocumentType::ALL.to_vec());
    }
    names
        .iter()
        .map(|name| name.parse::<DocumentType>().map_err(anyhow::Error::from))
        .collect()
}

fn confirm(prompt: &str) -> Result<bool> {
    use std::io::Write;

    print!("{} [y/N] ", prompt);
    std::io::stdout().flush()?;
    let mut answer = String::new();
    std::io::stdin().read_line(&mut answer)?;
    Ok(matches!(answer.trim().to_lowercase().as_str(), "y" | "yes"))
}

fn report(study: &str, import: &StudyImport) {
    match import {
        StudyImport::Run(run) => {
            println!("{}: run {} {}", study, run.id, run.state.as_str());
            for (key, job) in &run.jobs {
                println!(
                    "  {:<22} {:<10} imported={} skipped={} failed={}{}",
                    key,
                    job.state.as_str(),
                    job.imported,
                    job.skipped,
                    job.failed,
                    job.error.as_deref().map(|e| format!(" ({})", e)).unwrap_or_default()
                );
            }
        }
        StudyImport::Entities(outcomes) => {
            for (key, results) in outcomes {
                for outcome in results {
                    let report = outcome.report();
                    println!(
                        "{}: {:<22} {:<10} imported={} skipped={} failed={}",
                        study,
                        key,
                        outcome.state().as_str(),
                        report.imported,
                        report.skipped,
                        report.failed
                    );
                }
            }
        }
    }
}

fn indexer(config: &DdiConfig, ctx: &ImportContext) -> Result<Option<SearchIndexer>> {
    let Some(url) = &config.search.url else {
        return Ok(None);
    };
    let backend = ElasticsearchBackend::new(url).context("Invalid search url")?;
    Ok(Some(SearchIndexer::new(
        ctx.store.clone(),
        Arc::new(backend),
        &config.search.index_prefix,
    )))
}

async fn index(config: &DdiConfig, ctx: &ImportContext, action: IndexAction, types: &[String]) -> Result<()> {
    let types = document_types(types)?;
    let Some(indexer) = indexer(config, ctx)? else {
        bail!("search.url is not configured");
    };
    match action {
        IndexAction::Create => indexer.create(&types).await?,
        IndexAction::Delete => indexer.delete(&types).await?,
        IndexAction::Reset => indexer.reset(&types).await?,
        IndexAction::Rebuild => {
            let total = indexer.rebuild(&types).await?;
            println!("Indexed {} documents", total);
        }
    }
    Ok(())
}

/// Execute a parsed command line
pub async fn run(cli: Cli, config: DdiConfig) -> Result<()> {
    let config = Arc::new(config);
    let ctx = ImportContext::open(&config).await?;

    // Follow catalog writes while the command runs
    let follow = !matches!(cli.command, Command::Index { .. });
    let synchronizer = match indexer(&config, &ctx)? {
        Some(indexer) if follow => Some(IndexSynchronizer::new(indexer).spawn(&ctx.events)),
        Some(_) => None,
        None => {
            info!("Search indexing disabled (no search.url)");
            None
        }
    };

    let admin = StudyAdmin::new(ctx.clone(), config.clone(), JobQueue::new(config.workers));
    let result = execute(&admin, cli.command).await;

    // The synchronizer stops once every sender is gone
    drop(admin);
    drop(ctx);
    if let Some(handle) = synchronizer {
        if let Err(e) = handle.await {
            warn!(error = %e, "Index synchronizer ended abnormally");
        }
    }

    result
}

async fn execute(admin: &StudyAdmin, command: Command) -> Result<()> {
    match command {
        Command::Add { study, repo } => {
            let study = admin.add_study(&study, &repo).await?;
            println!("Added study {} ({})", study.name, study.id);
        }
        Command::Remove { study, yes } => {
            if !yes && !confirm(&format!("Remove study '{}' and all its metadata?", study))? {
                println!("Aborted");
                return Ok(());
            }
            match admin.remove_study(&study).await? {
                Some(report) => println!("Removed study {} ({} rows)", study, report.total()),
                None => bail!("Study '{}' does not exist", study),
            }
        }
        Command::Update {
            study,
            entities,
            filename,
            local,
        } => {
            let names: Vec<String> = if study == "all" {
                admin.all_studies().await?.into_iter().map(|s| s.name).collect()
            } else {
                vec![study]
            };
            for name in names {
                let import = admin
                    .update(&name, &entities, filename.as_deref(), local)
                    .await
                    .with_context(|| format!("Update of study '{}' failed", name))?;
                report(&name, &import);
            }
        }
        Command::Upgrade => {
            let runs = admin.upgrade().await?;
            if runs.is_empty() {
                println!("All studies up to date");
            }
            for run in runs {
                let name = run.study_name.clone();
                report(&name, &StudyImport::Run(run));
            }
        }
        Command::System { local } => {
            let report = admin.system(local).await?;
            println!("Registered {} studies ({} failed)", report.imported, report.failed);
        }
        Command::Index { action, types } => index(admin.config(), admin.context(), action, &types).await?,
    }
    Ok(())
}
