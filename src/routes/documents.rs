use std::net::SocketAddr;

use axum::Json;
use axum::extract::{ConnectInfo, Path, State};
use axum::http::HeaderMap;
use serde::Deserialize;
use uuid::Uuid;

use crate::audit::{self, AuditEvent, action};
use crate::auth::extractor::AuthUser;
use crate::db;
use crate::error::AppError;
use crate::models::Document;
use crate::state::SharedState;

#[derive(Deserialize)]
pub struct CreateDocument {
    pub title: String,
    #[serde(default)]
    pub body: String,
}

pub async fn create(
    auth: AuthUser,
    State(state): State<SharedState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Json(req): Json<CreateDocument>,
) -> Result<Json<Document>, AppError> {
    if req.title.trim().is_empty() {
        return Err(AppError::BadRequest("Title is required".to_string()));
    }

    let document = db::documents::create(
        &state.pool,
        auth.workspace_id,
        auth.user_id,
        &req.title,
        &req.body,
    )
    .await?;

    let metadata =
        audit::metadata::from_request(&headers, Some(addr.ip()), &state.config.trusted_proxies);
    audit::append::record(
        &state,
        AuditEvent::new(auth.workspace_id, action::DOCUMENT_CREATE, "document")
            .actor(auth.user_id)
            .resource(document.id)
            .metadata(metadata),
    )
    .await?;

    Ok(Json(document))
}

pub async fn list(
    auth: AuthUser,
    State(state): State<SharedState>,
) -> Result<Json<Vec<Document>>, AppError> {
    let documents = db::documents::list_by_workspace(&state.pool, auth.workspace_id).await?;
    Ok(Json(documents))
}

/// View a document. The permission decision itself is the auditable event:
/// an allowed read logs `document.view`, a denied one logs
/// `document.view_denied` against the document's workspace before the 403
/// goes out. The denial stands in the chain even though no read happened.
pub async fn get(
    auth: AuthUser,
    State(state): State<SharedState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<Json<Document>, AppError> {
    let document = db::documents::find_by_id(&state.pool, id)
        .await?
        .ok_or_else(|| AppError::NotFound("Document not found".to_string()))?;

    let metadata =
        audit::metadata::from_request(&headers, Some(addr.ip()), &state.config.trusted_proxies);

    let allowed = auth.workspace_id == document.workspace_id || auth.is_investigator;

    if !allowed {
        audit::append::record(
            &state,
            AuditEvent::new(document.workspace_id, action::DOCUMENT_VIEW_DENIED, "document")
                .actor(auth.user_id)
                .resource(document.id)
                .metadata(metadata),
        )
        .await?;

        return Err(AppError::Forbidden(
            "You do not have access to this document".to_string(),
        ));
    }

    audit::append::record(
        &state,
        AuditEvent::new(document.workspace_id, action::DOCUMENT_VIEW, "document")
            .actor(auth.user_id)
            .resource(document.id)
            .metadata(metadata),
    )
    .await?;

    Ok(Json(document))
}
