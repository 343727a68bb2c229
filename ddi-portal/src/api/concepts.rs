//! Concept-scoped listings

use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use ddi_common::models::Concept;
use serde::Deserialize;
use uuid::Uuid;

use super::study_by_name;
use crate::error::{ApiError, ApiResult};
use crate::pagination::{Page, PageQuery};
use crate::queries::{self, QuestionSummary, VariableSummary};
use crate::AppState;

/// `?study=&page=`
#[derive(Debug, Deserialize)]
pub struct ConceptQuery {
    pub study: Option<String>,
    #[serde(default = "default_page")]
    pub page: i64,
}

fn default_page() -> i64 {
    1
}

async fn scope(state: &AppState, concept: &str, query: &ConceptQuery) -> ApiResult<(Uuid, Option<Uuid>)> {
    let concept = state
        .ctx
        .repo::<Concept>()
        .get(state.ctx.ids.concept(concept))
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("concept '{}'", concept)))?;

    let study_id = match query.study.as_deref().filter(|s| !s.is_empty()) {
        Some(name) => Some(study_by_name(state, name).await?.id),
        None => None,
    };
    Ok((concept.id, study_id))
}

/// GET /api/concepts/:concept/variables
pub async fn concept_variables(
    State(state): State<AppState>,
    Path(concept): Path<String>,
    Query(query): Query<ConceptQuery>,
) -> ApiResult<Json<Page<VariableSummary>>> {
    let (concept_id, study_id) = scope(&state, &concept, &query).await?;
    let page = queries::variables_for_concepts(
        state.ctx.store.as_ref(),
        &[concept_id],
        study_id,
        PageQuery { page: query.page },
    )
    .await?;
    Ok(Json(page))
}

/// GET /api/concepts/:concept/questions
pub async fn concept_questions(
    State(state): State<AppState>,
    Path(concept): Path<String>,
    Query(query): Query<ConceptQuery>,
) -> ApiResult<Json<Page<QuestionSummary>>> {
    let (concept_id, study_id) = scope(&state, &concept, &query).await?;
    let page = queries::questions_for_concepts(
        state.ctx.store.as_ref(),
        &[concept_id],
        study_id,
        PageQuery { page: query.page },
    )
    .await?;
    Ok(Json(page))
}

pub fn concept_routes() -> Router<AppState> {
    Router::new()
        .route("/api/concepts/:concept/variables", get(concept_variables))
        .route("/api/concepts/:concept/questions", get(concept_questions))
}
