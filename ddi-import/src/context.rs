//! Shared state handed to every importer

use crate::ImportError;
use ddi_common::config::DdiConfig;
use ddi_common::db::{init_database, Repository, SqliteStore, Store};
use ddi_common::events::{DdiEvent, EventBus};
use ddi_common::models::{AnalysisUnit, Concept, ConceptualDataset, Entity, Period, Study, NONE_NAME};
use ddi_common::IdDeriver;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

/// Events buffered per subscriber before it lags
pub const EVENT_BUS_CAPACITY: usize = 10_000;

/// Store, id deriver and event bus
#[derive(Clone)]
pub struct ImportContext {
    pub store: Arc<dyn Store>,
    pub ids: Arc<IdDeriver>,
    pub events: EventBus,
}

impl ImportContext {
    pub fn new(store: Arc<dyn Store>, ids: Arc<IdDeriver>, events: EventBus) -> Self {
        Self { store, ids, events }
    }

    /// Open the configured SQLite catalog
    pub async fn open(config: &DdiConfig) -> Result<Self, ImportError> {
        let db_path = config.database_path();
        let pool = init_database(&db_path).await?;
        info!(path = %db_path.display(), "Catalog database ready");

        Ok(Self::new(
            Arc::new(SqliteStore::new(pool)),
            Arc::new(IdDeriver::with_capacity(config.base_uuid, config.id_cache_capacity)),
            EventBus::new(EVENT_BUS_CAPACITY),
        ))
    }

    pub fn repo<E: Entity>(&self) -> Repository<E> {
        Repository::new(self.store.clone())
    }

    /// Announce a write so the search index can follow
    pub fn changed<E: Entity>(&self, entity: &E) {
        self.events.emit_lossy(DdiEvent::changed(E::table().name, entity.id()));
    }

    /// Upsert one entity and announce it
    pub async fn upsert<E: Entity>(&self, entity: &E) -> Result<Uuid, ImportError> {
        self.repo::<E>().upsert(entity).await?;
        self.changed(entity);
        Ok(entity.id())
    }

    /// Load the stored entity or start a fresh one
    ///
    /// Importers overwrite the fields their source carries and leave the
    /// rest as stored.
    pub async fn existing_or<E: Entity>(&self, id: Uuid, fresh: impl FnOnce() -> E) -> Result<E, ImportError> {
        Ok(self.repo::<E>().get(id).await?.unwrap_or_else(fresh))
    }

    /// Period of `study`, falling back to the `none` sentinel; created on demand
    pub async fn period(&self, study: &Study, name: Option<&str>) -> Result<Uuid, ImportError> {
        let name = name.unwrap_or(NONE_NAME);
        let id = self.ids.child(study.id, name);
        let (period, created) = self
            .repo::<Period>()
            .get_or_create(id, || Period::new(&self.ids, study.id, name))
            .await?;
        if created {
            debug!(study = %study.name, period = %period.name, "Created period");
        }
        Ok(id)
    }

    /// Period when named, otherwise none (nullable references)
    pub async fn optional_period(&self, study: &Study, name: Option<&str>) -> Result<Option<Uuid>, ImportError> {
        match name {
            Some(name) => self.period(study, Some(name)).await.map(Some),
            None => Ok(None),
        }
    }

    /// Analysis unit of `study`, falling back to the `none` sentinel
    pub async fn analysis_unit(&self, study: &Study, name: Option<&str>) -> Result<Uuid, ImportError> {
        let name = name.unwrap_or(NONE_NAME);
        let id = self.ids.child(study.id, name);
        let (unit, created) = self
            .repo::<AnalysisUnit>()
            .get_or_create(id, || AnalysisUnit::new(&self.ids, study.id, name))
            .await?;
        if created {
            debug!(study = %study.name, analysis_unit = %unit.name, "Created analysis unit");
        }
        Ok(id)
    }

    /// Conceptual dataset, falling back to the `none` sentinel
    pub async fn conceptual_dataset(&self, name: Option<&str>) -> Result<Uuid, ImportError> {
        let name = name.unwrap_or(NONE_NAME);
        let id = self.ids.conceptual_dataset(name);
        self.repo::<ConceptualDataset>()
            .get_or_create(id, || ConceptualDataset::new(&self.ids, name))
            .await?;
        Ok(id)
    }

    /// Concept when named (created on demand), otherwise none
    pub async fn optional_concept(&self, name: Option<&str>) -> Result<Option<Uuid>, ImportError> {
        let Some(name) = name else {
            return Ok(None);
        };
        let id = self.ids.concept(name);
        let (concept, created) = self
            .repo::<Concept>()
            .get_or_create(id, || Concept::new(&self.ids, name))
            .await?;
        if created {
            self.changed(&concept);
        }
        Ok(Some(id))
    }
}
