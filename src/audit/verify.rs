use serde::Serialize;
use sqlx::PgPool;
use uuid::Uuid;

use crate::audit::hash::{self, GENESIS_HASH};
use crate::db;

const PAGE_SIZE: i64 = 500;

/// Outcome of walking one workspace's chain. Divergence is data, not an
/// error: the investigator needs to know where the chain broke and how much
/// of it was clean.
#[derive(Debug, Clone, Serialize)]
pub struct ChainReport {
    pub valid: bool,
    pub records_checked: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_invalid_record_id: Option<i64>,
}

impl ChainReport {
    fn valid(records_checked: u64) -> Self {
        Self {
            valid: true,
            records_checked,
            first_invalid_record_id: None,
        }
    }

    fn diverged(records_checked: u64, record_id: i64) -> Self {
        Self {
            valid: false,
            records_checked,
            first_invalid_record_id: Some(record_id),
        }
    }
}

/// Recompute the hash chain for one workspace from stored data.
///
/// Walks records in id order, carrying the expected previous hash. A record
/// diverges if its stored link does not match the expected value (deleted or
/// reordered predecessor) or if its recomputed digest does not match the
/// stored one (altered fields). Pure read; safe to re-run at any time.
pub async fn verify_workspace(
    pool: &PgPool,
    workspace_id: Uuid,
) -> Result<ChainReport, sqlx::Error> {
    let mut expected_previous = GENESIS_HASH.to_string();
    let mut checked: u64 = 0;
    let mut after_id: i64 = 0;

    loop {
        let page = db::audit_records::chain_page(pool, workspace_id, after_id, PAGE_SIZE).await?;
        if page.is_empty() {
            return Ok(ChainReport::valid(checked));
        }

        for record in &page {
            checked += 1;

            if record.previous_record_hash != expected_previous {
                tracing::warn!(
                    %workspace_id,
                    record_id = record.id,
                    "audit chain link mismatch"
                );
                return Ok(ChainReport::diverged(checked, record.id));
            }

            let recomputed = hash::hash_stored_record(record, &expected_previous);
            if recomputed != record.record_hash {
                tracing::warn!(
                    %workspace_id,
                    record_id = record.id,
                    "audit record hash mismatch"
                );
                return Ok(ChainReport::diverged(checked, record.id));
            }

            expected_previous = record.record_hash.clone();
        }

        after_id = page.last().map(|r| r.id).unwrap_or(after_id);
        if (page.len() as i64) < PAGE_SIZE {
            return Ok(ChainReport::valid(checked));
        }
    }
}
