use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use tracing::info;

use inviteflow_core::BatchId;

use crate::app::{dto, errors};
use crate::app::services::AppServices;
use crate::context::InitiatorContext;

pub fn router() -> Router {
    Router::new()
        .route("/batches", get(list_batches))
        .route("/batches/attention", get(batches_needing_attention))
        .route("/batches/:batch_id/retry", post(retry_batch))
}

pub async fn list_batches(
    Extension(services): Extension<Arc<AppServices>>,
) -> axum::response::Response {
    match services.batches.list_batches().await {
        Ok(batches) => (StatusCode::OK, Json(dto::BatchListResponse { batches })).into_response(),
        Err(e) => errors::store_error_to_response(e),
    }
}

pub async fn batches_needing_attention(
    Extension(services): Extension<Arc<AppServices>>,
) -> axum::response::Response {
    let Some(dispatch) = services.dispatch() else {
        return errors::not_configured();
    };
    match dispatch.stuck.find_batches_needing_attention(Utc::now()).await {
        Ok(attention) => (StatusCode::OK, Json(attention)).into_response(),
        Err(e) => errors::store_error_to_response(e),
    }
}

pub async fn retry_batch(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(initiator): Extension<InitiatorContext>,
    Path(batch_id): Path<String>,
) -> axum::response::Response {
    let Some(dispatch) = services.dispatch() else {
        return errors::not_configured();
    };
    let batch_id: BatchId = match batch_id.parse() {
        Ok(id) => id,
        Err(e) => {
            return errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", e.to_string())
        }
    };

    info!(initiator = initiator.initiator(), batch_id = %batch_id, "batch retry requested");

    match dispatch.stuck.retry_stuck_batch(&batch_id).await {
        Ok(outcome) => (StatusCode::OK, Json(outcome)).into_response(),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}
