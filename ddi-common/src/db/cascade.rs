//! Cascading delete over the declared foreign keys
//!
//! Starting from the root rows, every table with a foreign key into a table
//! reached so far is queried for referencing rows, level by level. The
//! collected rows are deleted children first in one atomic plan.

use super::schema::Table;
use super::store::{record_uuid, DeletePlan, Filter, Store};
use super::tables::{all_tables, STUDIES};
use crate::Result;
use indexmap::{IndexMap, IndexSet};
use tracing::{debug, info};
use uuid::Uuid;

/// Ids per `IN (...)` lookup
const LOOKUP_CHUNK: usize = 500;

/// Every row transitively referencing `root_ids` in `root`, root rows included
///
/// Keyed by table name in discovery order.
pub async fn collect_dependents(
    store: &dyn Store,
    root: &'static Table,
    root_ids: &[Uuid],
) -> Result<IndexMap<&'static str, IndexSet<Uuid>>> {
    let tables = all_tables();
    let mut seen: IndexMap<&'static str, IndexSet<Uuid>> = IndexMap::new();
    seen.insert(root.name, root_ids.iter().copied().collect());

    let mut frontier: Vec<(&'static Table, Vec<Uuid>)> = vec![(root, root_ids.to_vec())];
    let mut level = 0;

    while !frontier.is_empty() {
        level += 1;
        let mut next: IndexMap<&'static str, (&'static Table, Vec<Uuid>)> = IndexMap::new();

        for (parent, ids) in &frontier {
            for child in &tables {
                for (column, fk) in child.foreign_keys() {
                    if fk.table != parent.name {
                        continue;
                    }

                    for chunk in ids.chunks(LOOKUP_CHUNK) {
                        let filter = Filter::new().any_of(column.name, chunk.iter().copied());
                        for record in store.select(child, &filter).await? {
                            let Some(id) = record_uuid(&record, "id") else {
                                continue;
                            };
                            if seen.entry(child.name).or_default().insert(id) {
                                next.entry(child.name)
                                    .or_insert_with(|| (*child, Vec::new()))
                                    .1
                                    .push(id);
                            }
                        }
                    }
                }
            }
        }

        debug!(
            level,
            tables = next.len(),
            rows = next.values().map(|(_, ids)| ids.len()).sum::<usize>(),
            "Cascade level collected"
        );
        frontier = next.into_values().collect();
    }

    Ok(seen)
}

/// Order collected rows children first
pub fn deletion_plan(collected: &IndexMap<&'static str, IndexSet<Uuid>>) -> DeletePlan {
    let entries = all_tables()
        .into_iter()
        .rev()
        .filter_map(|table| {
            collected
                .get(table.name)
                .filter(|ids| !ids.is_empty())
                .map(|ids| (table, ids.iter().copied().collect()))
        })
        .collect();

    DeletePlan { entries }
}

/// Result of a cascading delete
#[derive(Debug, Clone, Default)]
pub struct CascadeReport {
    /// Deleted ids per table
    pub deleted: IndexMap<&'static str, Vec<Uuid>>,
}

impl CascadeReport {
    pub fn total(&self) -> usize {
        self.deleted.values().map(Vec::len).sum()
    }

    pub fn count(&self, table: &str) -> usize {
        self.deleted.get(table).map(Vec::len).unwrap_or(0)
    }
}

/// Delete a study and everything below it
pub async fn delete_study(store: &dyn Store, study_id: Uuid) -> Result<CascadeReport> {
    let collected = collect_dependents(store, &STUDIES, &[study_id]).await?;
    let plan = deletion_plan(&collected);
    let report = CascadeReport {
        deleted: plan
            .entries
            .iter()
            .map(|(table, ids)| (table.name, ids.clone()))
            .collect(),
    };

    let deleted = store.delete(plan).await?;
    info!(study_id = %study_id, rows = deleted, "Study deleted with all dependent rows");

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::memory::MemoryStore;
    use crate::db::repository::Repository;
    use crate::models::*;
    use crate::IdDeriver;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_delete_study_removes_children_only() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let ids = IdDeriver::new(Uuid::new_v4());

        let study = Study::new(&ids, "soep-test");
        let keep = Study::new(&ids, "keep-me");
        Repository::<Study>::new(store.clone()).upsert_many(&[study.clone(), keep.clone()]).await.unwrap();

        let period = Period::new(&ids, study.id, "2010");
        Repository::<Period>::new(store.clone()).upsert(&period).await.unwrap();

        let mut dataset = Dataset::new(&ids, study.id, "ds");
        dataset.period_id = Some(period.id);
        Repository::<Dataset>::new(store.clone()).upsert(&dataset).await.unwrap();

        let concept = Concept::new(&ids, "income");
        Repository::<Concept>::new(store.clone()).upsert(&concept).await.unwrap();

        let mut a = Variable::new(&ids, dataset.id, "a");
        a.concept_id = Some(concept.id);
        let b = Variable::new(&ids, dataset.id, "b");
        Repository::<Variable>::new(store.clone()).upsert_many(&[a.clone(), b.clone()]).await.unwrap();
        Repository::<Transformation>::new(store.clone())
            .upsert(&Transformation::new(&ids, a.id, b.id))
            .await
            .unwrap();

        let root = Topic::new(&ids, study.id, "root");
        let mut leaf = Topic::new(&ids, study.id, "leaf");
        leaf.parent_id = Some(root.id);
        Repository::<Topic>::new(store.clone()).upsert_many(&[root, leaf]).await.unwrap();

        let other_dataset = Dataset::new(&ids, keep.id, "ds");
        Repository::<Dataset>::new(store.clone()).upsert(&other_dataset).await.unwrap();

        let report = delete_study(store.as_ref(), study.id).await.unwrap();
        assert_eq!(report.count("studies"), 1);
        assert_eq!(report.count("variables"), 2);
        assert_eq!(report.count("transformations"), 1);
        assert_eq!(report.count("topics"), 2);
        assert_eq!(report.count("periods"), 1);

        // children first
        let order: Vec<_> = report.deleted.keys().copied().collect();
        let pos = |t: &str| order.iter().position(|x| *x == t).unwrap();
        assert!(pos("transformations") < pos("variables"));
        assert!(pos("variables") < pos("datasets"));
        assert!(pos("datasets") < pos("studies"));

        assert!(store.fetch(&STUDIES, study.id).await.unwrap().is_none());
        assert!(store.fetch(&STUDIES, keep.id).await.unwrap().is_some());
        assert_eq!(Repository::<Dataset>::new(store.clone()).all().await.unwrap().len(), 1);
        // shared vocabulary survives
        assert_eq!(Repository::<Concept>::new(store).all().await.unwrap().len(), 1);
    }
}
