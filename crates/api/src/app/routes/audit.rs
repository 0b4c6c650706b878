use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path, rejection::JsonRejection},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use serde_json::json;

use crate::app::services::AppServices;
use crate::app::{dto, errors};

pub fn router() -> Router {
    Router::new()
        .route("/start", post(start_session))
        .route("/scan-shelf", post(scan_shelf))
        .route("/finalize", post(finalize_audit))
        .route("/report/:session_id", get(get_report))
        .route("/sessions", get(list_sessions))
}

pub async fn start_session(
    Extension(services): Extension<Arc<AppServices>>,
    payload: Result<Json<dto::StartSessionRequest>, JsonRejection>,
) -> axum::response::Response {
    let body = match dto::body(payload) {
        Ok(b) => b,
        Err(resp) => return resp,
    };

    match services.audit.start_session(&body.auditor).await {
        Ok(session) => (
            StatusCode::CREATED,
            Json(json!({
                "message": "Audit session started successfully",
                "sessionId": session.session_id.to_string(),
                "auditor": session.auditor,
            })),
        )
            .into_response(),
        Err(e) => errors::audit_error_to_response(e),
    }
}

pub async fn scan_shelf(
    Extension(services): Extension<Arc<AppServices>>,
    payload: Result<Json<dto::ScanShelfRequest>, JsonRejection>,
) -> axum::response::Response {
    let body = match dto::body(payload) {
        Ok(b) => b,
        Err(resp) => return resp,
    };

    match services
        .audit
        .scan_shelf(&body.session_id, &body.rack, &body.shelf, &body.scanned_codes)
        .await
    {
        Ok(summary) => (StatusCode::OK, Json(dto::scan_json(&summary))).into_response(),
        Err(e) => errors::audit_error_to_response(e),
    }
}

pub async fn finalize_audit(
    Extension(services): Extension<Arc<AppServices>>,
    payload: Result<Json<dto::FinalizeAuditRequest>, JsonRejection>,
) -> axum::response::Response {
    let body = match dto::body(payload) {
        Ok(b) => b,
        Err(resp) => return resp,
    };

    match services
        .audit
        .finalize_audit(&body.session_id, body.notes.as_deref())
        .await
    {
        Ok(summary) => (StatusCode::OK, Json(dto::finalize_json(&summary))).into_response(),
        Err(e) => errors::audit_error_to_response(e),
    }
}

pub async fn get_report(
    Extension(services): Extension<Arc<AppServices>>,
    Path(session_id): Path<String>,
) -> axum::response::Response {
    match services.audit.audit_report(&session_id).await {
        Ok(report) => (StatusCode::OK, Json(dto::report_json(&report))).into_response(),
        Err(e) => errors::audit_error_to_response(e),
    }
}

pub async fn list_sessions(Extension(services): Extension<Arc<AppServices>>) -> axum::response::Response {
    match services.audit.list_sessions().await {
        Ok(sessions) => (StatusCode::OK, Json(dto::sessions_json(&sessions))).into_response(),
        Err(e) => errors::audit_error_to_response(e),
    }
}
