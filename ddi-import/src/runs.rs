//! Persistence of import runs

use crate::ImportError;
use ddi_common::db::{Filter, Repository, Store};
use ddi_common::models::ImportRun;
use std::sync::Arc;
use uuid::Uuid;

pub async fn save_run(store: &Arc<dyn Store>, run: &ImportRun) -> Result<(), ImportError> {
    Repository::<ImportRun>::new(store.clone()).upsert(run).await?;
    Ok(())
}

pub async fn get_run(store: &Arc<dyn Store>, id: Uuid) -> Result<Option<ImportRun>, ImportError> {
    Ok(Repository::<ImportRun>::new(store.clone()).get(id).await?)
}

/// Latest runs first, optionally for one study
pub async fn recent_runs(
    store: &Arc<dyn Store>,
    study_name: Option<&str>,
    limit: usize,
) -> Result<Vec<ImportRun>, ImportError> {
    let mut filter = Filter::new();
    if let Some(name) = study_name {
        filter = filter.eq("study_name", name);
    }
    let filter = filter.order_by_desc("started_at").limit(limit);
    Ok(Repository::<ImportRun>::new(store.clone()).filter(&filter).await?)
}
