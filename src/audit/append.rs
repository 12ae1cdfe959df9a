use serde_json::{Value, json};
use sqlx::PgPool;
use uuid::Uuid;

use crate::audit::hash::{self, GENESIS_HASH, HashInput};
use crate::config::AuditFailurePolicy;
use crate::db;
use crate::error::AppError;
use crate::models::AuditRecord;
use crate::state::AppState;

/// One auditable event, as described by the handler that witnessed it.
#[derive(Debug, Clone)]
pub struct AuditEvent {
    pub workspace_id: Uuid,
    pub actor_user_id: Option<Uuid>,
    pub action: String,
    pub resource_type: String,
    pub resource_id: Option<Uuid>,
    pub metadata: Option<Value>,
}

impl AuditEvent {
    pub fn new(workspace_id: Uuid, action: &str, resource_type: &str) -> Self {
        Self {
            workspace_id,
            actor_user_id: None,
            action: action.to_string(),
            resource_type: resource_type.to_string(),
            resource_id: None,
            metadata: None,
        }
    }

    pub fn actor(mut self, user_id: Uuid) -> Self {
        self.actor_user_id = Some(user_id);
        self
    }

    pub fn resource(mut self, resource_id: Uuid) -> Self {
        self.resource_id = Some(resource_id);
        self
    }

    pub fn metadata(mut self, metadata: Value) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// Append an event as the new tail of its workspace's chain.
///
/// Retries once on lock timeout / serialization conflicts; a failed attempt
/// rolls back whole, so no partial record is ever visible.
pub async fn append(
    pool: &PgPool,
    lock_timeout_ms: u64,
    event: &AuditEvent,
) -> Result<AuditRecord, sqlx::Error> {
    match append_once(pool, lock_timeout_ms, event).await {
        Err(e) if is_retryable(&e) => {
            tracing::warn!(
                workspace_id = %event.workspace_id,
                action = %event.action,
                error = %e,
                "audit append conflicted, retrying once"
            );
            append_once(pool, lock_timeout_ms, event).await
        }
        other => other,
    }
}

async fn append_once(
    pool: &PgPool,
    lock_timeout_ms: u64,
    event: &AuditEvent,
) -> Result<AuditRecord, sqlx::Error> {
    let mut tx = pool.begin().await?;

    // Bound the wait on the per-workspace serialization point so audit
    // contention cannot stall unrelated requests indefinitely.
    sqlx::query(&format!("SET LOCAL lock_timeout = '{lock_timeout_ms}ms'"))
        .execute(&mut *tx)
        .await?;

    // Serialize appends per workspace. Two concurrent appends to the same
    // chain must not both read the same tail; chains in other workspaces
    // proceed in parallel.
    sqlx::query("SELECT pg_advisory_xact_lock($1)")
        .bind(lock_key(event.workspace_id))
        .execute(&mut *tx)
        .await?;

    let previous_hash = db::audit_records::tail_hash(&mut *tx, event.workspace_id)
        .await?
        .unwrap_or_else(|| GENESIS_HASH.to_string());

    // id and created_at are server-assigned. clock_timestamp() rather than
    // now(): the transaction may have started before the lock was granted,
    // and created_at must be monotonic within the chain.
    let (id, created_at) = db::audit_records::next_id_and_timestamp(&mut *tx).await?;

    let metadata = event.metadata.clone().unwrap_or_else(|| json!({}));
    let record_hash = hash::record_hash(&HashInput {
        id,
        workspace_id: event.workspace_id,
        actor_user_id: event.actor_user_id,
        action: &event.action,
        resource_type: &event.resource_type,
        resource_id: event.resource_id,
        metadata: &metadata,
        created_at,
        previous_hash: &previous_hash,
    });

    let record = db::audit_records::insert(
        &mut *tx,
        AuditRecord {
            id,
            workspace_id: event.workspace_id,
            actor_user_id: event.actor_user_id,
            action: event.action.clone(),
            resource_type: event.resource_type.clone(),
            resource_id: event.resource_id,
            metadata,
            created_at,
            record_hash,
            previous_record_hash: previous_hash,
        },
    )
    .await?;

    tx.commit().await?;
    Ok(record)
}

/// Append with the configured failure policy applied. Handlers call this
/// after making a security decision; the decision itself never depends on
/// the append succeeding, only on what the policy does with a failure.
pub async fn record(state: &AppState, event: AuditEvent) -> Result<(), AppError> {
    match append(&state.pool, state.config.audit_lock_timeout_ms, &event).await {
        Ok(_) => Ok(()),
        Err(e) => match state.config.on_audit_failure {
            AuditFailurePolicy::FailClosed => Err(AppError::AppendFailed(format!(
                "audit append for {} failed: {e}",
                event.action
            ))),
            AuditFailurePolicy::FailOpenAndAlert => {
                tracing::error!(
                    workspace_id = %event.workspace_id,
                    action = %event.action,
                    error = %e,
                    "audit append failed, continuing per fail-open policy"
                );
                Ok(())
            }
        },
    }
}

/// Advisory lock key for a workspace: the first eight bytes of its UUID.
/// Collisions between workspaces only cost unnecessary serialization, never
/// correctness.
fn lock_key(workspace_id: Uuid) -> i64 {
    let bytes = workspace_id.as_bytes();
    i64::from_be_bytes([
        bytes[0], bytes[1], bytes[2], bytes[3], bytes[4], bytes[5], bytes[6], bytes[7],
    ])
}

fn is_retryable(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::PoolTimedOut => true,
        sqlx::Error::Database(db) => matches!(
            db.code().as_deref(),
            // lock_not_available, serialization_failure, deadlock_detected
            Some("55P03") | Some("40001") | Some("40P01")
        ),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lock_key_is_stable_per_workspace() {
        let id = Uuid::parse_str("018f3b1e-0000-7000-8000-000000000001").unwrap();
        assert_eq!(lock_key(id), lock_key(id));
        let other = Uuid::parse_str("018f3b1e-0000-7000-8000-000000000002").unwrap();
        assert_eq!(lock_key(id), lock_key(other)); // same first 8 bytes
        let distant = Uuid::parse_str("ffff3b1e-0000-7000-8000-000000000001").unwrap();
        assert_ne!(lock_key(id), lock_key(distant));
    }
}
