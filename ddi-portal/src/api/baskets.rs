//! User baskets and their variables

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use ddi_common::db::cascade::{collect_dependents, deletion_plan};
use ddi_common::db::store::{DeletePlan, Filter};
use ddi_common::ids::normalize_name;
use ddi_common::models::{Basket, BasketVariable, Dataset, Entity, Study, User, Variable};
use ddi_common::topic_tree::TopicTree;
use indexmap::IndexSet;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::info;
use uuid::Uuid;

use super::study_by_name;
use crate::error::{ApiError, ApiResult};
use crate::pagination::{calculate_pagination, Page, PageQuery, PAGE_SIZE};
use crate::queries::VariableSummary;
use crate::AppState;

/// `?user=`
#[derive(Debug, Deserialize)]
pub struct BasketListQuery {
    pub user: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateBasket {
    pub user: String,
    pub study: String,
    pub name: String,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Serialize)]
pub struct BasketResponse {
    #[serde(flatten)]
    pub basket: Basket,
    pub study: String,
    pub variable_count: u64,
}

/// Variables to add or remove: explicit ids, or everything linked to a
/// topic subtree or a concept within the basket's study
#[derive(Debug, Default, Deserialize)]
pub struct VariableSelection {
    #[serde(default)]
    pub variables: Vec<Uuid>,
    pub topic: Option<String>,
    pub concept: Option<String>,
}

impl VariableSelection {
    fn is_empty(&self) -> bool {
        self.variables.is_empty() && self.topic.is_none() && self.concept.is_none()
    }
}

async fn basket_response(state: &AppState, basket: Basket) -> ApiResult<BasketResponse> {
    let study = state.ctx.repo::<Study>().require(basket.study_id).await?;
    let variable_count = state
        .ctx
        .repo::<BasketVariable>()
        .count(&Filter::new().eq("basket_id", basket.id))
        .await?;
    Ok(BasketResponse {
        basket,
        study: study.name,
        variable_count,
    })
}

/// GET /api/baskets?user=
pub async fn list_baskets(
    State(state): State<AppState>,
    Query(query): Query<BasketListQuery>,
) -> ApiResult<Json<Vec<BasketResponse>>> {
    let filter = match query.user.as_deref() {
        Some(user) => Filter::new().eq("user_id", state.ctx.ids.user(user)),
        None => Filter::new(),
    };
    let baskets = state.ctx.repo::<Basket>().filter(&filter.order_by("name")).await?;

    let mut responses = Vec::with_capacity(baskets.len());
    for basket in baskets {
        responses.push(basket_response(&state, basket).await?);
    }
    Ok(Json(responses))
}

/// POST /api/baskets
///
/// Creates the user on first use. A basket of the same user and name is
/// updated in place; moving it to another study is a conflict, since its
/// entries belong to the old one.
pub async fn create_basket(
    State(state): State<AppState>,
    Json(req): Json<CreateBasket>,
) -> ApiResult<(StatusCode, Json<BasketResponse>)> {
    let study = study_by_name(&state, &req.study).await?;

    let ids = state.ctx.ids.clone();
    let user = User::new(&ids, &req.user);
    let (user, _) = state
        .ctx
        .repo::<User>()
        .get_or_create(user.id, || user.clone())
        .await?;

    let mut basket = Basket::new(&ids, user.id, study.id, &req.name);
    if let Some(existing) = state.ctx.repo::<Basket>().get(basket.id).await? {
        if existing.study_id != study.id {
            return Err(ApiError::Conflict(format!(
                "basket '{}' of user '{}' already belongs to another study",
                existing.name, user.username
            )));
        }
    }
    basket.label = req.label;
    basket.description = req.description;
    state.ctx.repo::<Basket>().upsert(&basket).await?;

    info!(basket = %basket.name, user = %user.username, study = %study.name, "Basket saved");
    Ok((StatusCode::CREATED, Json(basket_response(&state, basket).await?)))
}

/// GET /api/baskets/:id
pub async fn get_basket(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<Json<BasketResponse>> {
    let basket = state.ctx.repo::<Basket>().require(id).await?;
    Ok(Json(basket_response(&state, basket).await?))
}

/// DELETE /api/baskets/:id
///
/// Removes the basket with its entries and scripts.
pub async fn delete_basket(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<StatusCode> {
    let basket = state.ctx.repo::<Basket>().require(id).await?;
    let store = state.ctx.store.as_ref();

    let collected = collect_dependents(store, Basket::table(), &[basket.id]).await?;
    let deleted = store.delete(deletion_plan(&collected)).await?;

    info!(basket = %basket.name, rows = deleted, "Basket deleted");
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/baskets/:id/variables
pub async fn basket_variables(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(page): Query<PageQuery>,
) -> ApiResult<Json<Page<VariableSummary>>> {
    let basket = state.ctx.repo::<Basket>().require(id).await?;
    let entries = state
        .ctx
        .repo::<BasketVariable>()
        .filter(&Filter::new().eq("basket_id", basket.id))
        .await?;

    let filter = Filter::new().any_of("id", entries.iter().map(|e| e.variable_id));
    let variables = state.ctx.repo::<Variable>();
    let total = variables.count(&filter).await?;
    let pagination = calculate_pagination(total, page.page);
    let page_filter = filter
        .order_by("name")
        .order_by("id")
        .limit(PAGE_SIZE as usize)
        .offset(pagination.offset as usize);

    let datasets = state
        .ctx
        .repo::<Dataset>()
        .filter(&Filter::new().eq("study_id", basket.study_id))
        .await?;

    let results = variables
        .filter(&page_filter)
        .await?
        .into_iter()
        .map(|v| VariableSummary {
            dataset: datasets
                .iter()
                .find(|d| d.id == v.dataset_id)
                .map(|d| d.name.clone())
                .unwrap_or_default(),
            id: v.id,
            name: v.name,
            label: v.label,
            label_de: v.label_de,
        })
        .collect();

    Ok(Json(Page::new(pagination, total, results)))
}

/// Resolve a selection to variable ids, in request order without duplicates
async fn selected_variables(state: &AppState, basket: &Basket, selection: &VariableSelection) -> ApiResult<Vec<Uuid>> {
    let mut selected: IndexSet<Uuid> = selection.variables.iter().copied().collect();
    let mut concepts: Vec<Uuid> = Vec::new();

    if let Some(topic) = &selection.topic {
        let tree = TopicTree::load(state.ctx.store.as_ref(), basket.study_id).await?;
        let topic = tree
            .find(&normalize_name(topic))
            .ok_or_else(|| ApiError::NotFound(format!("topic '{}'", topic)))?;
        concepts.extend(tree.concept_closure(topic.id));
    }
    if let Some(concept) = &selection.concept {
        let id = state.ctx.ids.concept(concept);
        if !state.ctx.repo::<ddi_common::models::Concept>().exists(id).await? {
            return Err(ApiError::NotFound(format!("concept '{}'", concept)));
        }
        concepts.push(id);
    }

    if !concepts.is_empty() {
        let datasets = state
            .ctx
            .repo::<Dataset>()
            .filter(&Filter::new().eq("study_id", basket.study_id))
            .await?;
        let filter = Filter::new()
            .any_of("concept_id", concepts)
            .any_of("dataset_id", datasets.iter().map(|d| d.id))
            .order_by("name");
        selected.extend(state.ctx.repo::<Variable>().filter(&filter).await?.into_iter().map(|v| v.id));
    }

    Ok(selected.into_iter().collect())
}

/// Add the selected variables; returns how many entries were new
async fn add_selection(state: &AppState, basket_id: Uuid, selection: &VariableSelection) -> ApiResult<usize> {
    if selection.is_empty() {
        return Err(ApiError::BadRequest(
            "one of variables, topic or concept is required".to_string(),
        ));
    }
    let basket = state.ctx.repo::<Basket>().require(basket_id).await?;
    let variable_ids = selected_variables(state, &basket, selection).await?;

    let entries_repo = state.ctx.repo::<BasketVariable>();
    let mut entries = Vec::new();
    for variable_id in variable_ids {
        let entry = BasketVariable::new(&state.ctx.ids, basket.id, variable_id);
        if entries_repo.exists(entry.id).await? {
            continue;
        }
        entry.clean(state.ctx.store.as_ref()).await?;
        entries.push(entry);
    }

    let created = entries_repo.upsert_many(&entries).await?;
    info!(basket = %basket.name, created, "Variables added to basket");
    Ok(created)
}

/// POST /api/baskets/:id/variables
pub async fn add_variables(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(selection): Json<VariableSelection>,
) -> ApiResult<Json<Value>> {
    let created = add_selection(&state, id, &selection).await?;
    Ok(Json(json!({ "created": created })))
}

/// DELETE /api/baskets/:id/variables
pub async fn remove_variables(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(selection): Json<VariableSelection>,
) -> ApiResult<Json<Value>> {
    if selection.is_empty() {
        return Err(ApiError::BadRequest(
            "one of variables, topic or concept is required".to_string(),
        ));
    }
    let basket = state.ctx.repo::<Basket>().require(id).await?;
    let variable_ids = selected_variables(&state, &basket, &selection).await?;

    let entry_ids: Vec<Uuid> = variable_ids
        .into_iter()
        .map(|v| BasketVariable::new(&state.ctx.ids, basket.id, v).id)
        .collect();
    let deleted = state
        .ctx
        .store
        .delete(DeletePlan {
            entries: vec![(BasketVariable::table(), entry_ids)],
        })
        .await?;

    info!(basket = %basket.name, deleted, "Variables removed from basket");
    Ok(Json(json!({ "deleted": deleted })))
}

#[derive(Debug, Deserialize)]
pub struct TopicRequest {
    pub topic: String,
}

#[derive(Debug, Deserialize)]
pub struct ConceptRequest {
    pub concept: String,
}

/// POST /api/baskets/:id/add_by_topic (legacy, answers `DONE`)
pub async fn add_by_topic(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<TopicRequest>,
) -> ApiResult<&'static str> {
    let selection = VariableSelection {
        topic: Some(req.topic),
        ..Default::default()
    };
    add_selection(&state, id, &selection).await?;
    Ok("DONE")
}

/// POST /api/baskets/:id/add_by_concept (legacy, answers `DONE`)
pub async fn add_by_concept(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<ConceptRequest>,
) -> ApiResult<&'static str> {
    let selection = VariableSelection {
        concept: Some(req.concept),
        ..Default::default()
    };
    add_selection(&state, id, &selection).await?;
    Ok("DONE")
}

pub fn basket_routes() -> Router<AppState> {
    Router::new()
        .route("/api/baskets", get(list_baskets).post(create_basket))
        .route("/api/baskets/:id", get(get_basket).delete(delete_basket))
        .route(
            "/api/baskets/:id/variables",
            get(basket_variables).post(add_variables).delete(remove_variables),
        )
        .route("/api/baskets/:id/add_by_topic", post(add_by_topic))
        .route("/api/baskets/:id/add_by_concept", post(add_by_concept))
}
