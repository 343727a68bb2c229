//! Topic tree and topic-scoped listings

use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use ddi_common::ids::normalize_name;
use ddi_common::topic_tree::{Language, TopicTree};
use serde_json::Value;

use super::study_by_name;
use crate::error::{ApiError, ApiResult};
use crate::pagination::{Page, PageQuery};
use crate::queries::{self, QuestionSummary, VariableSummary};
use crate::AppState;

/// GET /api/topics/:study/:language
///
/// Nested topics with their concepts, labelled in `language` (`en`, `de`).
pub async fn topic_tree(
    State(state): State<AppState>,
    Path((study, language)): Path<(String, String)>,
) -> ApiResult<Json<Vec<Value>>> {
    let study = study_by_name(&state, &study).await?;
    let tree = TopicTree::load(state.ctx.store.as_ref(), study.id).await?;
    Ok(Json(tree.to_json(Language::parse(&language))))
}

/// Concept ids attached to `topic` or any topic below it
async fn topic_concepts(state: &AppState, study: &str, topic: &str) -> ApiResult<(uuid::Uuid, Vec<uuid::Uuid>)> {
    let study = study_by_name(state, study).await?;
    let tree = TopicTree::load(state.ctx.store.as_ref(), study.id).await?;
    let topic = tree
        .find(&normalize_name(topic))
        .ok_or_else(|| ApiError::NotFound(format!("topic '{}' in study '{}'", topic, study.name)))?;
    Ok((study.id, tree.concept_closure(topic.id)))
}

/// GET /api/topics/:study/:topic/variables
pub async fn topic_variables(
    State(state): State<AppState>,
    Path((study, topic)): Path<(String, String)>,
    Query(page): Query<PageQuery>,
) -> ApiResult<Json<Page<VariableSummary>>> {
    let (study_id, concepts) = topic_concepts(&state, &study, &topic).await?;
    let page = queries::variables_for_concepts(state.ctx.store.as_ref(), &concepts, Some(study_id), page).await?;
    Ok(Json(page))
}

/// GET /api/topics/:study/:topic/questions
pub async fn topic_questions(
    State(state): State<AppState>,
    Path((study, topic)): Path<(String, String)>,
    Query(page): Query<PageQuery>,
) -> ApiResult<Json<Page<QuestionSummary>>> {
    let (study_id, concepts) = topic_concepts(&state, &study, &topic).await?;
    let page = queries::questions_for_concepts(state.ctx.store.as_ref(), &concepts, Some(study_id), page).await?;
    Ok(Json(page))
}

// The second segment is the language for the tree and the topic name below
// it; the router requires one parameter name per position.
pub fn topic_routes() -> Router<AppState> {
    Router::new()
        .route("/api/topics/:study/:name", get(topic_tree))
        .route("/api/topics/:study/:name/variables", get(topic_variables))
        .route("/api/topics/:study/:name/questions", get(topic_questions))
}
