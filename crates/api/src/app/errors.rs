use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use inviteflow_dispatch::DispatchError;
use inviteflow_store::StoreError;

pub fn store_error_to_response(err: StoreError) -> axum::response::Response {
    match err {
        StoreError::UniqueViolation(msg) => json_error(StatusCode::CONFLICT, "conflict", msg),
        StoreError::NotFound(msg) => json_error(StatusCode::NOT_FOUND, "not_found", msg),
        StoreError::Backend(msg) => {
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "store_error", msg)
        }
    }
}

pub fn dispatch_error_to_response(err: DispatchError) -> axum::response::Response {
    match err {
        DispatchError::Store(e) => store_error_to_response(e),
    }
}

pub fn not_configured() -> axum::response::Response {
    json_error(
        StatusCode::SERVICE_UNAVAILABLE,
        "not_configured",
        "email provider credentials are not configured",
    )
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}
