use chrono::{DateTime, Utc};
use serde_json::Value;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::models::AuditRecord;

/// `previous_record_hash` of the first record in every workspace chain.
pub const GENESIS_HASH: &str = "0000000000000000000000000000000000000000000000000000000000000000";

/// Sentinel written into the preimage for nullable fields, so that a null
/// actor and an actor whose id happens to serialize to an empty string can
/// never collide.
const NULL_SENTINEL: &str = "-";

/// Fields that feed a record's hash. The hash is a pure function of these
/// plus the previous record's hash; recomputing it from a stored row must
/// reproduce the stored value exactly.
#[derive(Debug)]
pub struct HashInput<'a> {
    pub id: i64,
    pub workspace_id: Uuid,
    pub actor_user_id: Option<Uuid>,
    pub action: &'a str,
    pub resource_type: &'a str,
    pub resource_id: Option<Uuid>,
    pub metadata: &'a Value,
    pub created_at: DateTime<Utc>,
    pub previous_hash: &'a str,
}

/// Fixed-order newline-joined preimage. Field order must never change:
/// id, workspace_id, actor_user_id, action, resource_type, resource_id,
/// metadata, created_at, previous_hash.
pub fn canonicalize(input: &HashInput<'_>) -> String {
    let actor = input
        .actor_user_id
        .map(|u| u.to_string())
        .unwrap_or_else(|| NULL_SENTINEL.to_string());
    let resource = input
        .resource_id
        .map(|u| u.to_string())
        .unwrap_or_else(|| NULL_SENTINEL.to_string());

    [
        input.id.to_string(),
        input.workspace_id.to_string(),
        actor,
        input.action.to_string(),
        input.resource_type.to_string(),
        resource,
        canonical_metadata(input.metadata),
        format_timestamp(&input.created_at),
        input.previous_hash.to_string(),
    ]
    .join("\n")
}

/// SHA-256 over the canonical preimage, lowercase hex, 64 characters.
pub fn record_hash(input: &HashInput<'_>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(canonicalize(input).as_bytes());
    hex::encode(hasher.finalize())
}

/// Recompute a stored record's hash against a caller-supplied previous hash.
/// Used by chain verification, which walks with its own expected value rather
/// than trusting the stored `previous_record_hash`.
pub fn hash_stored_record(record: &AuditRecord, previous_hash: &str) -> String {
    record_hash(&HashInput {
        id: record.id,
        workspace_id: record.workspace_id,
        actor_user_id: record.actor_user_id,
        action: &record.action,
        resource_type: &record.resource_type,
        resource_id: record.resource_id,
        metadata: &record.metadata,
        created_at: record.created_at,
        previous_hash,
    })
}

/// Metadata is hashed in sorted-key compact JSON form, recursively, so the
/// digest is independent of whatever key order the producing handler used.
pub fn canonical_metadata(value: &Value) -> String {
    serde_json::to_string(&sort_keys(value)).unwrap_or_else(|_| "{}".to_string())
}

fn sort_keys(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            let mut sorted = serde_json::Map::with_capacity(entries.len());
            for (k, v) in entries {
                sorted.insert(k.clone(), sort_keys(v));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(sort_keys).collect()),
        other => other.clone(),
    }
}

/// RFC 3339 UTC with exactly millisecond precision. Timestamps are stored
/// truncated to milliseconds, so this formatting is lossless.
pub fn format_timestamp(dt: &DateTime<Utc>) -> String {
    dt.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn sample_input<'a>(metadata: &'a Value) -> HashInput<'a> {
        HashInput {
            id: 7,
            workspace_id: Uuid::parse_str("018f3b1e-0000-7000-8000-000000000001").unwrap(),
            actor_user_id: None,
            action: "document.view",
            resource_type: "document",
            resource_id: None,
            metadata,
            created_at: Utc.with_ymd_and_hms(2025, 3, 14, 9, 26, 53).unwrap(),
            previous_hash: GENESIS_HASH,
        }
    }

    #[test]
    fn genesis_is_64_zeros() {
        assert_eq!(GENESIS_HASH.len(), 64);
        assert!(GENESIS_HASH.chars().all(|c| c == '0'));
    }

    #[test]
    fn hash_is_lowercase_hex_64() {
        let metadata = json!({});
        let hash = record_hash(&sample_input(&metadata));
        assert_eq!(hash.len(), 64);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn hash_is_deterministic() {
        let metadata = json!({"ip": "10.0.0.1", "user_agent": "test"});
        let a = record_hash(&sample_input(&metadata));
        let b = record_hash(&sample_input(&metadata));
        assert_eq!(a, b);
    }

    #[test]
    fn metadata_key_order_does_not_matter() {
        let a = json!({"b": 1, "a": {"d": 2, "c": 3}});
        let b = json!({"a": {"c": 3, "d": 2}, "b": 1});
        assert_eq!(canonical_metadata(&a), canonical_metadata(&b));
        assert_eq!(canonical_metadata(&a), r#"{"a":{"c":3,"d":2},"b":1}"#);
    }

    #[test]
    fn array_order_is_preserved() {
        let v = json!({"tags": ["b", "a"]});
        assert_eq!(canonical_metadata(&v), r#"{"tags":["b","a"]}"#);
    }

    #[test]
    fn null_actor_uses_sentinel() {
        let metadata = json!({});
        let preimage = canonicalize(&sample_input(&metadata));
        let lines: Vec<&str> = preimage.split('\n').collect();
        assert_eq!(lines.len(), 9);
        assert_eq!(lines[2], "-");
        assert_eq!(lines[5], "-");
    }

    #[test]
    fn changing_any_field_changes_the_hash() {
        let metadata = json!({});
        let base = record_hash(&sample_input(&metadata));

        let mut tampered = sample_input(&metadata);
        tampered.action = "document.view_denied";
        assert_ne!(record_hash(&tampered), base);

        let other_meta = json!({"x": 1});
        let tampered = sample_input(&other_meta);
        assert_ne!(record_hash(&tampered), base);

        let mut tampered = sample_input(&metadata);
        tampered.previous_hash = &base;
        assert_ne!(record_hash(&tampered), base);
    }

    #[test]
    fn timestamp_has_millisecond_precision() {
        let dt = Utc.timestamp_millis_opt(1_741_944_413_123).unwrap();
        assert_eq!(format_timestamp(&dt), "2025-03-14T09:26:53.123Z");

        let whole = Utc.with_ymd_and_hms(2025, 3, 14, 9, 26, 53).unwrap();
        assert_eq!(format_timestamp(&whole), "2025-03-14T09:26:53.000Z");
    }
}
