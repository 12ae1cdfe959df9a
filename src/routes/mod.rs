pub mod admin;
pub mod audit_logs;
pub mod auth;
pub mod documents;

use axum::Router;
use axum::routing::{get, post};

use crate::state::SharedState;

pub fn api_routes() -> Router<SharedState> {
    Router::new()
        // Auth
        .route("/api/v1/auth/register", post(auth::register))
        .route("/api/v1/auth/login", post(auth::login))
        .route("/api/v1/auth/logout", post(auth::logout))
        // Documents
        .route(
            "/api/v1/documents",
            get(documents::list).post(documents::create),
        )
        .route("/api/v1/documents/{id}", get(documents::get))
        // Audit log (investigator only)
        .route("/api/v1/audit-logs", get(audit_logs::list))
        .route("/api/v1/audit-logs/verify", post(audit_logs::verify))
        // Admin (investigator only)
        .route(
            "/api/v1/admin/workspaces",
            get(admin::list_workspaces).post(admin::create_workspace),
        )
        .route("/api/v1/admin/users", post(admin::create_user))
}
