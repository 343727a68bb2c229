//! Script settings stored per basket

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, put},
    Json, Router,
};
use ddi_common::db::store::Filter;
use ddi_common::models::{Basket, Script};
use serde::Deserialize;
use serde_json::Value;
use tracing::info;
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateScript {
    pub name: String,
    #[serde(default)]
    pub label: String,
    pub generator_name: String,
    #[serde(default)]
    pub settings: Option<Value>,
}

/// GET /api/baskets/:id/scripts
pub async fn list_scripts(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<Json<Vec<Script>>> {
    let basket = state.ctx.repo::<Basket>().require(id).await?;
    let scripts = state
        .ctx
        .repo::<Script>()
        .filter(&Filter::new().eq("basket_id", basket.id).order_by("name"))
        .await?;
    Ok(Json(scripts))
}

/// POST /api/baskets/:id/scripts
pub async fn create_script(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<CreateScript>,
) -> ApiResult<(StatusCode, Json<Script>)> {
    let basket = state.ctx.repo::<Basket>().require(id).await?;

    let mut script = Script::new(&state.ctx.ids, basket.id, &req.name);
    script.label = req.label;
    script.generator_name = req.generator_name;
    if let Some(settings) = req.settings {
        script.settings = settings;
    }
    state.ctx.repo::<Script>().upsert(&script).await?;

    info!(basket = %basket.name, script = %script.name, generator = %script.generator_name, "Script saved");
    Ok((StatusCode::CREATED, Json(script)))
}

/// GET /api/scripts/:id
pub async fn get_script(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<Json<Script>> {
    Ok(Json(state.ctx.repo::<Script>().require(id).await?))
}

/// DELETE /api/scripts/:id
pub async fn delete_script(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<StatusCode> {
    if !state.ctx.repo::<Script>().delete(id).await? {
        return Err(ApiError::NotFound(format!("script {}", id)));
    }
    Ok(StatusCode::NO_CONTENT)
}

/// PUT /api/scripts/:id/settings
///
/// Replaces the settings object.
pub async fn update_settings(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(settings): Json<Value>,
) -> ApiResult<Json<Script>> {
    if !settings.is_object() {
        return Err(ApiError::BadRequest("settings must be a JSON object".to_string()));
    }
    let scripts = state.ctx.repo::<Script>();
    let mut script = scripts.require(id).await?;
    script.settings = settings;
    scripts.upsert(&script).await?;
    Ok(Json(script))
}

pub fn script_routes() -> Router<AppState> {
    Router::new()
        .route("/api/baskets/:id/scripts", get(list_scripts).post(create_script))
        .route("/api/scripts/:id", get(get_script).delete(delete_script))
        .route("/api/scripts/:id/settings", put(update_settings))
}
