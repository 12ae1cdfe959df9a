use sqlx::PgPool;
use uuid::Uuid;

use crate::models::Document;

pub async fn create(
    pool: &PgPool,
    workspace_id: Uuid,
    author_id: Uuid,
    title: &str,
    body: &str,
) -> Result<Document, sqlx::Error> {
    sqlx::query_as::<_, Document>(
        "INSERT INTO documents (workspace_id, author_id, title, body)
         VALUES ($1, $2, $3, $4) RETURNING *",
    )
    .bind(workspace_id)
    .bind(author_id)
    .bind(title)
    .bind(body)
    .fetch_one(pool)
    .await
}

/// Unscoped lookup. The permission check happens in the handler, which must
/// see the document's workspace to decide allow/deny and to log the decision
/// against the right chain.
pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Document>, sqlx::Error> {
    sqlx::query_as::<_, Document>("SELECT * FROM documents WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
}

pub async fn list_by_workspace(
    pool: &PgPool,
    workspace_id: Uuid,
) -> Result<Vec<Document>, sqlx::Error> {
    sqlx::query_as::<_, Document>(
        "SELECT * FROM documents WHERE workspace_id = $1 ORDER BY created_at DESC",
    )
    .bind(workspace_id)
    .fetch_all(pool)
    .await
}
