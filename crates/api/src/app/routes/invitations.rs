use std::sync::Arc;

use axum::{
    extract::Extension,
    http::StatusCode,
    response::IntoResponse,
    routing::post,
    Json, Router,
};
use chrono::Utc;
use tracing::info;

use inviteflow_core::{BatchId, PersonaType};
use inviteflow_ingest::{parse_and_deduplicate, ImportOptions};

use crate::app::{dto, errors};
use crate::app::services::AppServices;
use crate::context::InitiatorContext;

pub fn router() -> Router {
    Router::new()
        .route("/invitations/import", post(import))
        .route("/dispatch", post(dispatch))
}

/// Parse, deduplicate, and insert a CSV of invitees. Emails already holding
/// an active invitation are reported as conflicts, never overwritten.
pub async fn import(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(initiator): Extension<InitiatorContext>,
    Json(body): Json<dto::ImportRequest>,
) -> axum::response::Response {
    let persona_type = match PersonaType::parse(&body.persona_type) {
        Ok(p) => p,
        Err(e) => {
            return errors::json_error(StatusCode::BAD_REQUEST, "validation_error", e.to_string())
        }
    };

    let options = match body.list_columns {
        Some(list_columns) => ImportOptions { list_columns },
        None => ImportOptions::default(),
    };

    let (records, stats) = match parse_and_deduplicate(&body.csv_text, persona_type, &options) {
        Ok(parsed) => parsed,
        Err(e) => return errors::json_error(StatusCode::BAD_REQUEST, "invalid_csv", e.to_string()),
    };

    let now = Utc::now();
    let invitations = records.into_iter().map(|r| r.into_invitation(now)).collect();
    let report = match services.invitations.insert_many(invitations).await {
        Ok(report) => report,
        Err(e) => return errors::store_error_to_response(e),
    };

    info!(
        initiator = initiator.initiator(),
        persona_type = %persona_type,
        inserted = report.inserted,
        conflicts = report.conflicts.len(),
        duplicates = stats.duplicates_found,
        "csv import complete"
    );

    (
        StatusCode::CREATED,
        Json(dto::ImportResponse {
            inserted: report.inserted,
            conflicts: report.conflicts,
            stats,
        }),
    )
        .into_response()
}

/// Create a batch over the requested emails and run one dispatch pass.
pub async fn dispatch(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(initiator): Extension<InitiatorContext>,
    Json(body): Json<dto::DispatchRequestBody>,
) -> axum::response::Response {
    let Some(dispatch) = services.dispatch() else {
        return errors::not_configured();
    };
    if body.emails.is_empty() {
        return errors::json_error(
            StatusCode::BAD_REQUEST,
            "validation_error",
            "emails must not be empty",
        );
    }

    let batch_id = match body.batch_id {
        Some(raw) => match raw.parse::<BatchId>() {
            Ok(id) => id,
            Err(e) => {
                return errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", e.to_string())
            }
        },
        None => match services.manager.create_batch(&body.emails, Utc::now()).await {
            Ok(Some(batch)) => batch.batch_id,
            Ok(None) => {
                return (
                    StatusCode::OK,
                    Json(serde_json::json!({
                        "success": false,
                        "message": "no pending invitations found for the requested emails",
                    })),
                )
                    .into_response()
            }
            Err(e) => return errors::store_error_to_response(e),
        },
    };

    info!(
        initiator = initiator.initiator(),
        batch_id = %batch_id,
        emails = body.emails.len(),
        test_mode = body.test_mode,
        "dispatch requested"
    );

    let response = match dispatch
        .worker
        .dispatch(inviteflow_dispatch::DispatchRequest {
            emails: body.emails,
            test_mode: body.test_mode,
            batch_id: Some(batch_id),
        })
        .await
    {
        Ok(response) => response,
        Err(e) => return errors::dispatch_error_to_response(e),
    };

    (StatusCode::OK, Json(response)).into_response()
}
