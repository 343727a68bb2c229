//! Concept-scoped listings of variables and questions

use crate::pagination::{calculate_pagination, Page, PageQuery, PAGE_SIZE};
use ddi_common::db::store::{Filter, Store};
use ddi_common::models::{ConceptQuestion, Dataset, Entity, Instrument, Question, Variable};
use ddi_common::Result;
use indexmap::IndexMap;
use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize)]
pub struct VariableSummary {
    pub id: Uuid,
    pub name: String,
    pub label: String,
    pub label_de: String,
    pub dataset: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct QuestionSummary {
    pub id: Uuid,
    pub name: String,
    pub label: String,
    pub label_de: String,
    pub instrument: String,
}

async fn select<E: Entity>(store: &dyn Store, filter: &Filter) -> Result<Vec<E>> {
    store
        .select(E::table(), filter)
        .await?
        .into_iter()
        .map(E::from_record)
        .collect()
}

/// Names by id of the datasets in scope (one study, or all)
async fn datasets(store: &dyn Store, study_id: Option<Uuid>) -> Result<IndexMap<Uuid, String>> {
    let filter = match study_id {
        Some(id) => Filter::new().eq("study_id", id),
        None => Filter::new(),
    };
    Ok(select::<Dataset>(store, &filter)
        .await?
        .into_iter()
        .map(|d| (d.id, d.name))
        .collect())
}

async fn instruments(store: &dyn Store, study_id: Option<Uuid>) -> Result<IndexMap<Uuid, String>> {
    let filter = match study_id {
        Some(id) => Filter::new().eq("study_id", id),
        None => Filter::new(),
    };
    Ok(select::<Instrument>(store, &filter)
        .await?
        .into_iter()
        .map(|i| (i.id, i.name))
        .collect())
}

fn paged(filter: Filter, total: u64, page: PageQuery) -> (Filter, crate::pagination::Pagination) {
    let pagination = calculate_pagination(total, page.page);
    let filter = filter
        .order_by("name")
        .order_by("id")
        .limit(PAGE_SIZE as usize)
        .offset(pagination.offset as usize);
    (filter, pagination)
}

/// Variables linked to any of `concept_ids`, optionally within one study
pub async fn variables_for_concepts(
    store: &dyn Store,
    concept_ids: &[Uuid],
    study_id: Option<Uuid>,
    page: PageQuery,
) -> Result<Page<VariableSummary>> {
    let datasets = datasets(store, study_id).await?;

    let mut filter = Filter::new().any_of("concept_id", concept_ids.iter().copied());
    if study_id.is_some() {
        filter = filter.any_of("dataset_id", datasets.keys().copied());
    }
    let total = store.count(Variable::table(), &filter).await?;
    let (filter, pagination) = paged(filter, total, page);

    let results = select::<Variable>(store, &filter)
        .await?
        .into_iter()
        .map(|v| VariableSummary {
            dataset: datasets.get(&v.dataset_id).cloned().unwrap_or_default(),
            id: v.id,
            name: v.name,
            label: v.label,
            label_de: v.label_de,
        })
        .collect();

    Ok(Page::new(pagination, total, results))
}

/// Questions linked to any of `concept_ids`, optionally within one study
pub async fn questions_for_concepts(
    store: &dyn Store,
    concept_ids: &[Uuid],
    study_id: Option<Uuid>,
    page: PageQuery,
) -> Result<Page<QuestionSummary>> {
    let links: Vec<ConceptQuestion> = select(
        store,
        &Filter::new().any_of("concept_id", concept_ids.iter().copied()),
    )
    .await?;
    let instruments = instruments(store, study_id).await?;

    let mut filter = Filter::new().any_of("id", links.iter().map(|l| l.question_id));
    if study_id.is_some() {
        filter = filter.any_of("instrument_id", instruments.keys().copied());
    }
    let total = store.count(Question::table(), &filter).await?;
    let (filter, pagination) = paged(filter, total, page);

    let results = select::<Question>(store, &filter)
        .await?
        .into_iter()
        .map(|q| QuestionSummary {
            instrument: instruments.get(&q.instrument_id).cloned().unwrap_or_default(),
            id: q.id,
            name: q.name,
            label: q.label,
            label_de: q.label_de,
        })
        .collect();

    Ok(Page::new(pagination, total, results))
}
