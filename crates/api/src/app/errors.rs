use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use shelfaudit_infra::service::AuditError;

pub fn audit_error_to_response(err: AuditError) -> axum::response::Response {
    let status = match &err {
        AuditError::Validation(_) => StatusCode::BAD_REQUEST,
        AuditError::NotFound(_) => StatusCode::NOT_FOUND,
        AuditError::Conflict(_) => StatusCode::CONFLICT,
        AuditError::Dependency(_) => StatusCode::SERVICE_UNAVAILABLE,
    };
    json_error(status, err.kind(), err.to_string())
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
