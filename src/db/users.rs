use sqlx::PgPool;
use uuid::Uuid;

use crate::models::User;

pub async fn create<'e, E: sqlx::PgExecutor<'e>>(
    executor: E,
    workspace_id: Uuid,
    email: &str,
    password_hash: &str,
    name: &str,
    role: &str,
    is_investigator: bool,
) -> Result<User, sqlx::Error> {
    sqlx::query_as::<_, User>(
        "INSERT INTO users (workspace_id, email, password_hash, name, role, is_investigator)
         VALUES ($1, $2, $3, $4, $5, $6) RETURNING *",
    )
    .bind(workspace_id)
    .bind(email)
    .bind(password_hash)
    .bind(name)
    .bind(role)
    .bind(is_investigator)
    .fetch_one(executor)
    .await
}

pub async fn find_by_email(pool: &PgPool, email: &str) -> Result<Option<User>, sqlx::Error> {
    sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = $1")
        .bind(email)
        .fetch_optional(pool)
        .await
}

pub async fn count_all<'e, E: sqlx::PgExecutor<'e>>(executor: E) -> Result<i64, sqlx::Error> {
    let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM users")
        .fetch_one(executor)
        .await?;
    Ok(row.0)
}
