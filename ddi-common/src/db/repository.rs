//! Typed repository over a [`Store`]
//!
//! Converts between entity structs and records via serde, validates before
//! every write and exposes the lookups the importers and the portal need.

use super::store::{Filter, Store, WriteBatch};
use crate::models::Entity;
use crate::{Error, Result};
use serde_json::Value;
use std::marker::PhantomData;
use std::sync::Arc;
use uuid::Uuid;

/// Repository for one entity type
pub struct Repository<E> {
    store: Arc<dyn Store>,
    _entity: PhantomData<fn() -> E>,
}

impl<E> Clone for Repository<E> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            _entity: PhantomData,
        }
    }
}

impl<E: Entity> Repository<E> {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            store,
            _entity: PhantomData,
        }
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    pub async fn get(&self, id: Uuid) -> Result<Option<E>> {
        match self.store.fetch(E::table(), id).await? {
            Some(record) => Ok(Some(E::from_record(record)?)),
            None => Ok(None),
        }
    }

    /// Like [`Self::get`] but missing rows are an error
    pub async fn require(&self, id: Uuid) -> Result<E> {
        self.get(id).await?.ok_or_else(|| {
            Error::NotFound(format!("{} {}", E::table().name, id))
        })
    }

    pub async fn exists(&self, id: Uuid) -> Result<bool> {
        Ok(self.store.fetch(E::table(), id).await?.is_some())
    }

    /// Look up by natural key values, in the order the table declares them
    pub async fn find_by_natural_key(&self, values: &[Value]) -> Result<Option<E>> {
        let table = E::table();
        if values.len() != table.natural_key.len() {
            return Err(Error::InvalidInput(format!(
                "{} natural key has {} columns, got {} values",
                table.name,
                table.natural_key.len(),
                values.len()
            )));
        }

        let filter = table
            .natural_key
            .iter()
            .zip(values)
            .fold(Filter::new().limit(1), |f, (column, value)| f.eq(column, value));

        Ok(self.filter(&filter).await?.into_iter().next())
    }

    pub async fn filter(&self, filter: &Filter) -> Result<Vec<E>> {
        self.store
            .select(E::table(), filter)
            .await?
            .into_iter()
            .map(E::from_record)
            .collect()
    }

    pub async fn all(&self) -> Result<Vec<E>> {
        self.filter(&Filter::new()).await
    }

    pub async fn count(&self, filter: &Filter) -> Result<u64> {
        self.store.count(E::table(), filter).await
    }

    /// Validate and upsert by id (last write wins)
    pub async fn upsert(&self, entity: &E) -> Result<()> {
        entity.validate()?;
        self.store.upsert(E::table(), vec![entity.to_record()?]).await?;
        Ok(())
    }

    /// Validate all, then upsert all in one atomic batch
    pub async fn upsert_many(&self, entities: &[E]) -> Result<usize> {
        let mut batch = WriteBatch::new();
        batch.upsert(E::table(), to_records(entities)?);
        self.store.write(batch).await
    }

    /// Return the stored entity, or store and return `make()` when absent
    ///
    /// The boolean is true when the entity was created.
    pub async fn get_or_create<F>(&self, id: Uuid, make: F) -> Result<(E, bool)>
    where
        F: FnOnce() -> E,
    {
        if let Some(existing) = self.get(id).await? {
            return Ok((existing, false));
        }

        let entity = make();
        if entity.id() != id {
            return Err(Error::Internal(format!(
                "{} created with id {} while {} was requested",
                E::table().name,
                entity.id(),
                id
            )));
        }
        self.upsert(&entity).await?;
        Ok((entity, true))
    }

    pub async fn delete(&self, id: Uuid) -> Result<bool> {
        let plan = super::store::DeletePlan {
            entries: vec![(E::table(), vec![id])],
        };
        Ok(self.store.delete(plan).await? > 0)
    }
}

/// Validate and convert entities for a [`WriteBatch`]
pub fn to_records<E: Entity>(entities: &[E]) -> Result<Vec<super::store::Record>> {
    entities
        .iter()
        .map(|e| {
            e.validate()?;
            e.to_record()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::memory::MemoryStore;
    use crate::models::{Concept, Period, Study};
    use crate::IdDeriver;
    use serde_json::json;

    fn setup() -> (Arc<dyn Store>, IdDeriver) {
        (Arc::new(MemoryStore::new()), IdDeriver::new(Uuid::new_v4()))
    }

    #[tokio::test]
    async fn test_upsert_and_find_by_natural_key() {
        let (store, ids) = setup();
        let studies: Repository<Study> = Repository::new(store);
        let study = Study::new(&ids, "soep-test");

        studies.upsert(&study).await.unwrap();
        studies.upsert(&study).await.unwrap();

        assert_eq!(studies.count(&Filter::new()).await.unwrap(), 1);
        let found = studies
            .find_by_natural_key(&[json!("soep-test")])
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.id, ids.study("soep-test"));
        assert!(studies.find_by_natural_key(&[]).await.is_err());
    }

    #[tokio::test]
    async fn test_get_or_create_is_idempotent() {
        let (store, ids) = setup();
        let studies: Repository<Study> = Repository::new(store.clone());
        let periods: Repository<Period> = Repository::new(store);
        let study = Study::new(&ids, "soep-test");
        studies.upsert(&study).await.unwrap();

        let period_id = ids.child(study.id, "2010");
        let (_, created) = periods
            .get_or_create(period_id, || Period::new(&ids, study.id, "2010"))
            .await
            .unwrap();
        assert!(created);

        let (period, created) = periods
            .get_or_create(period_id, || Period::new(&ids, study.id, "2010"))
            .await
            .unwrap();
        assert!(!created);
        assert_eq!(period.name, "2010");
    }

    #[tokio::test]
    async fn test_validation_blocks_write() {
        let (store, ids) = setup();
        let concepts: Repository<Concept> = Repository::new(store);
        let mut concept = Concept::new(&ids, "x");
        concept.name = String::new();

        assert!(matches!(
            concepts.upsert(&concept).await,
            Err(Error::Validation { .. })
        ));
        assert_eq!(concepts.count(&Filter::new()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_require_missing() {
        let (store, _) = setup();
        let studies: Repository<Study> = Repository::new(store);
        assert!(matches!(
            studies.require(Uuid::new_v4()).await,
            Err(Error::NotFound(_))
        ));
    }
}
