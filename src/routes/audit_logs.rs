use axum::Json;
use axum::extract::{Query, State};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use crate::audit::verify::verify_workspace;
use crate::auth::extractor::AuthUser;
use crate::db;
use crate::db::audit_records::AuditLogFilter;
use crate::error::AppError;
use crate::state::SharedState;

const DEFAULT_LIMIT: i64 = 100;

#[derive(Deserialize)]
pub struct AuditLogQuery {
    pub workspace_id: Option<Uuid>,
    pub actor_user_id: Option<Uuid>,
    pub resource_type: Option<String>,
    pub resource_id: Option<Uuid>,
    pub action: Option<String>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub after_id: Option<i64>,
    pub limit: Option<i64>,
}

#[derive(Deserialize)]
pub struct VerifyRequest {
    pub workspace_id: Uuid,
}

/// Investigator search across all workspaces. Filters combine freely; a
/// resource can be traced through its whole lifetime by id alone.
pub async fn list(
    auth: AuthUser,
    State(state): State<SharedState>,
    Query(query): Query<AuditLogQuery>,
) -> Result<Json<serde_json::Value>, AppError> {
    auth.require_investigator()?;

    let filter = AuditLogFilter {
        workspace_id: query.workspace_id,
        actor_user_id: query.actor_user_id,
        resource_type: query.resource_type,
        resource_id: query.resource_id,
        action: query.action,
        from: query.from,
        to: query.to,
        after_id: query.after_id.unwrap_or(0),
        limit: query.limit.unwrap_or(DEFAULT_LIMIT),
    };

    let logs = db::audit_records::search(&state.pool, &filter).await?;

    Ok(Json(json!({
        "success": true,
        "data": { "logs": logs },
    })))
}

/// Re-walk one workspace's hash chain and report the first divergence, if
/// any. Read-only; investigators run this on demand.
pub async fn verify(
    auth: AuthUser,
    State(state): State<SharedState>,
    Json(req): Json<VerifyRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    auth.require_investigator()?;

    let report = verify_workspace(&state.pool, req.workspace_id).await?;

    Ok(Json(json!({
        "success": true,
        "data": report,
    })))
}
