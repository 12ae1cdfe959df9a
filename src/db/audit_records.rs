use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use crate::models::{AuditLogEntry, AuditRecord};

/// The only write path: audit records are inserted complete and never touched
/// again. Everything else in this module is read-only, except the purge
/// helper at the bottom.
pub async fn insert<'e, E: sqlx::PgExecutor<'e>>(
    executor: E,
    record: AuditRecord,
) -> Result<AuditRecord, sqlx::Error> {
    sqlx::query_as::<_, AuditRecord>(
        "INSERT INTO audit_records
            (id, workspace_id, actor_user_id, action, resource_type, resource_id,
             metadata, created_at, record_hash, previous_record_hash)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
         RETURNING *",
    )
    .bind(record.id)
    .bind(record.workspace_id)
    .bind(record.actor_user_id)
    .bind(&record.action)
    .bind(&record.resource_type)
    .bind(record.resource_id)
    .bind(&record.metadata)
    .bind(record.created_at)
    .bind(&record.record_hash)
    .bind(&record.previous_record_hash)
    .fetch_one(executor)
    .await
}

/// Hash of the current tail of a workspace's chain, if any.
pub async fn tail_hash<'e, E: sqlx::PgExecutor<'e>>(
    executor: E,
    workspace_id: Uuid,
) -> Result<Option<String>, sqlx::Error> {
    sqlx::query_scalar::<_, String>(
        "SELECT record_hash FROM audit_records
         WHERE workspace_id = $1 ORDER BY id DESC LIMIT 1",
    )
    .bind(workspace_id)
    .fetch_optional(executor)
    .await
}

/// Reserve the next record id and take the server clock, truncated to the
/// millisecond precision the hash preimage uses.
pub async fn next_id_and_timestamp<'e, E: sqlx::PgExecutor<'e>>(
    executor: E,
) -> Result<(i64, DateTime<Utc>), sqlx::Error> {
    sqlx::query_as::<_, (i64, DateTime<Utc>)>(
        "SELECT nextval(pg_get_serial_sequence('audit_records', 'id')),
                date_trunc('milliseconds', clock_timestamp())",
    )
    .fetch_one(executor)
    .await
}

/// One page of a workspace's chain in id order, for verification.
pub async fn chain_page(
    pool: &PgPool,
    workspace_id: Uuid,
    after_id: i64,
    limit: i64,
) -> Result<Vec<AuditRecord>, sqlx::Error> {
    sqlx::query_as::<_, AuditRecord>(
        "SELECT * FROM audit_records
         WHERE workspace_id = $1 AND id > $2
         ORDER BY id ASC LIMIT $3",
    )
    .bind(workspace_id)
    .bind(after_id)
    .bind(limit)
    .fetch_all(pool)
    .await
}

/// Investigator search criteria. All filters combine with AND; none are
/// required, so a resource can be looked up without knowing its workspace.
#[derive(Debug, Default, Clone)]
pub struct AuditLogFilter {
    pub workspace_id: Option<Uuid>,
    pub actor_user_id: Option<Uuid>,
    pub resource_type: Option<String>,
    pub resource_id: Option<Uuid>,
    pub action: Option<String>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub after_id: i64,
    pub limit: i64,
}

/// Cross-workspace search, investigator only. Ascending id order with keyset
/// pagination; the actor's email is joined in for investigation output.
pub async fn search(
    pool: &PgPool,
    filter: &AuditLogFilter,
) -> Result<Vec<AuditLogEntry>, sqlx::Error> {
    let mut qb: QueryBuilder<Postgres> = QueryBuilder::new(
        "SELECT a.id, a.workspace_id, a.actor_user_id, u.email AS actor_email,
                a.action, a.resource_type, a.resource_id, a.metadata,
                a.created_at, a.record_hash, a.previous_record_hash
         FROM audit_records a
         LEFT JOIN users u ON u.id = a.actor_user_id
         WHERE a.id > ",
    );
    qb.push_bind(filter.after_id);

    if let Some(workspace_id) = filter.workspace_id {
        qb.push(" AND a.workspace_id = ").push_bind(workspace_id);
    }
    if let Some(actor_user_id) = filter.actor_user_id {
        qb.push(" AND a.actor_user_id = ").push_bind(actor_user_id);
    }
    if let Some(ref resource_type) = filter.resource_type {
        qb.push(" AND a.resource_type = ").push_bind(resource_type);
    }
    if let Some(resource_id) = filter.resource_id {
        qb.push(" AND a.resource_id = ").push_bind(resource_id);
    }
    if let Some(ref action) = filter.action {
        qb.push(" AND a.action = ").push_bind(action);
    }
    if let Some(from) = filter.from {
        qb.push(" AND a.created_at >= ").push_bind(from);
    }
    if let Some(to) = filter.to {
        qb.push(" AND a.created_at <= ").push_bind(to);
    }

    qb.push(" ORDER BY a.id ASC LIMIT ")
        .push_bind(filter.limit.clamp(1, 1000));

    qb.build_query_as::<AuditLogEntry>().fetch_all(pool).await
}

/// Retention purge: the one sanctioned path around the immutability trigger.
/// Disables the trigger for its own transaction only, deletes the workspace's
/// records, and re-enables it before committing. Not reachable from any
/// route; used by retention tooling and test teardown.
pub async fn admin_purge_workspace(pool: &PgPool, workspace_id: Uuid) -> Result<u64, sqlx::Error> {
    tracing::warn!(%workspace_id, "purging audit records via administrative override");

    let mut tx = pool.begin().await?;

    sqlx::query("ALTER TABLE audit_records DISABLE TRIGGER audit_records_immutable")
        .execute(&mut *tx)
        .await?;

    let deleted = sqlx::query("DELETE FROM audit_records WHERE workspace_id = $1")
        .bind(workspace_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

    sqlx::query("ALTER TABLE audit_records ENABLE TRIGGER audit_records_immutable")
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    Ok(deleted)
}
