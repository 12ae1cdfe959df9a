use axum::Json;
use axum::extract::State;
use serde::Deserialize;
use uuid::Uuid;

use crate::audit::{self, AuditEvent, action};
use crate::auth::extractor::AuthUser;
use crate::auth::password;
use crate::db;
use crate::error::AppError;
use crate::models::{User, Workspace};
use crate::state::SharedState;

#[derive(Deserialize)]
pub struct CreateWorkspace {
    pub name: String,
    pub slug: String,
}

#[derive(Deserialize)]
pub struct CreateUser {
    pub workspace_id: Uuid,
    pub email: String,
    pub password: String,
    pub name: String,
    pub role: String,
    #[serde(default)]
    pub is_investigator: bool,
}

pub async fn list_workspaces(
    auth: AuthUser,
    State(state): State<SharedState>,
) -> Result<Json<Vec<Workspace>>, AppError> {
    auth.require_investigator()?;
    let workspaces = db::workspaces::list(&state.pool).await?;
    Ok(Json(workspaces))
}

pub async fn create_workspace(
    auth: AuthUser,
    State(state): State<SharedState>,
    Json(req): Json<CreateWorkspace>,
) -> Result<Json<Workspace>, AppError> {
    auth.require_investigator()?;

    let workspace = db::workspaces::create(&state.pool, &req.name, &req.slug)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
                AppError::Conflict("A workspace with this slug already exists".to_string())
            }
            _ => AppError::Database(e),
        })?;

    audit::append::record(
        &state,
        AuditEvent::new(workspace.id, action::WORKSPACE_CREATED, "workspace")
            .actor(auth.user_id)
            .resource(workspace.id),
    )
    .await?;

    Ok(Json(workspace))
}

pub async fn create_user(
    auth: AuthUser,
    State(state): State<SharedState>,
    Json(req): Json<CreateUser>,
) -> Result<Json<User>, AppError> {
    auth.require_investigator()?;

    if req.password.len() < 8 {
        return Err(AppError::BadRequest(
            "Password must be at least 8 characters".to_string(),
        ));
    }

    db::workspaces::find_by_id(&state.pool, req.workspace_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Workspace not found".to_string()))?;

    let pw_hash = password::hash(&req.password).map_err(AppError::Internal)?;

    let user = db::users::create(
        &state.pool,
        req.workspace_id,
        &req.email,
        &pw_hash,
        &req.name,
        &req.role,
        req.is_investigator,
    )
    .await
    .map_err(|e| match e {
        sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
            AppError::Conflict("A user with this email already exists".to_string())
        }
        _ => AppError::Database(e),
    })?;

    audit::append::record(
        &state,
        AuditEvent::new(req.workspace_id, action::USER_CREATED, "user")
            .actor(auth.user_id)
            .resource(user.id),
    )
    .await?;

    Ok(Json(user))
}
