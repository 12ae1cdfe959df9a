use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, Serializer};
use uuid::Uuid;

use crate::audit::hash::format_timestamp;

/// One committed entry of a workspace's audit chain.
#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct AuditRecord {
    pub id: i64,
    pub workspace_id: Uuid,
    pub actor_user_id: Option<Uuid>,
    pub action: String,
    pub resource_type: String,
    pub resource_id: Option<Uuid>,
    pub metadata: serde_json::Value,
    #[serde(serialize_with = "serialize_millis")]
    pub created_at: DateTime<Utc>,
    pub record_hash: String,
    pub previous_record_hash: String,
}

/// Audit record as returned by the investigator query API, with the actor's
/// email resolved for cross-referencing during an investigation.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct AuditLogEntry {
    pub id: i64,
    pub workspace_id: Uuid,
    pub actor_user_id: Option<Uuid>,
    pub actor_email: Option<String>,
    pub action: String,
    pub resource_type: String,
    pub resource_id: Option<Uuid>,
    pub metadata: serde_json::Value,
    #[serde(serialize_with = "serialize_millis")]
    pub created_at: DateTime<Utc>,
    pub record_hash: String,
    pub previous_record_hash: String,
}

/// Serialize timestamps with the same fixed millisecond precision used in the
/// hash preimage, so API output and chain input never disagree.
fn serialize_millis<S: Serializer>(dt: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&format_timestamp(dt))
}
