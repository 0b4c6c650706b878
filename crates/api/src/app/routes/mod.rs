use axum::Router;

pub mod audit;
pub mod system;

/// Router for the audit endpoints.
pub fn router() -> Router {
    Router::new().nest("/audit", audit::router())
}
