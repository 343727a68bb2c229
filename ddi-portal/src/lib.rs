//! ddi-portal library - JSON API over the DDI catalog
//!
//! Topic trees, concept and topic scoped listings, user baskets with their
//! script settings, and push webhooks that re-import a study.

use axum::Router;
use ddi_import::study_admin::StudyAdmin;
use ddi_import::ImportContext;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub mod api;
pub mod error;
pub mod pagination;
pub mod queries;

pub use error::{ApiError, ApiResult};

/// Application state shared across HTTP handlers
#[derive(Clone)]
pub struct AppState {
    pub ctx: ImportContext,
    pub admin: StudyAdmin,
    /// HMAC key for push webhooks; unsigned pushes are accepted when unset
    pub webhook_secret: Option<String>,
}

impl AppState {
    pub fn new(admin: StudyAdmin) -> Self {
        Self {
            ctx: admin.context().clone(),
            webhook_secret: admin.config().webhook_secret.clone(),
            admin,
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(api::health_routes())
        .merge(api::topic_routes())
        .merge(api::concept_routes())
        .merge(api::basket_routes())
        .merge(api::script_routes())
        .merge(api::webhook_routes())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
