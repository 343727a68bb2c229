//! HTTP API handlers for ddi-portal

pub mod baskets;
pub mod concepts;
pub mod health;
pub mod scripts;
pub mod topics;
pub mod webhooks;

pub use baskets::basket_routes;
pub use concepts::concept_routes;
pub use health::health_routes;
pub use scripts::script_routes;
pub use topics::topic_routes;
pub use webhooks::webhook_routes;

use crate::error::{ApiError, ApiResult};
use crate::AppState;
use ddi_common::models::Study;

/// Look up a study by name, 404 when unknown
pub(crate) async fn study_by_name(state: &AppState, name: &str) -> ApiResult<Study> {
    state
        .ctx
        .repo::<Study>()
        .get(state.ctx.ids.study(name))
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("study '{}'", name)))
}
