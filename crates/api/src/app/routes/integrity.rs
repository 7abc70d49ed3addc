use std::sync::Arc;

use axum::{
    extract::Extension,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use tracing::info;

use crate::app::errors;
use crate::app::services::AppServices;
use crate::context::InitiatorContext;

pub fn router() -> Router {
    Router::new()
        .route("/integrity", get(check))
        .route("/integrity/fix", post(fix))
}

pub async fn check(
    Extension(services): Extension<Arc<AppServices>>,
) -> axum::response::Response {
    match services.reconciler.compute_report().await {
        Ok(report) => (StatusCode::OK, Json(report)).into_response(),
        Err(e) => errors::store_error_to_response(e),
    }
}

pub async fn fix(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(initiator): Extension<InitiatorContext>,
) -> axum::response::Response {
    info!(initiator = initiator.initiator(), "integrity fix requested");
    match services.reconciler.fix_data_inconsistencies().await {
        Ok(outcome) => (StatusCode::OK, Json(outcome)).into_response(),
        Err(e) => errors::store_error_to_response(e),
    }
}
