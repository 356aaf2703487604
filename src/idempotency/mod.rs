//! Idempotency manager (spec §4.14): guards every state-mutating execution-bot operation
//! behind a SHA-256 reservation key so a retried or duplicated request cannot double-spend.
//! Persisted the same way `persistence::AnalyticsDb` persists its tables.

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;
use sha2::{Digest, Sha256};
use tokio::sync::Mutex;

use crate::error::IdempotencyError;
use crate::types::{IdempotencyOperation, IdempotencyRecord, IdempotencyState};

const RECORD_TTL_SECONDS: i64 = 24 * 3600;
const PURGE_AFTER_DAYS: i64 = 30;

/// `idem_key = SHA-256(operation || user_id || canonical(operation_data))`, hex-encoded.
pub fn derive_key(operation: IdempotencyOperation, user_id: &uuid::Uuid, operation_data: &Value) -> String {
    let mut hasher = Sha256::new();
    hasher.update(serde_json::to_vec(&operation).unwrap_or_default());
    hasher.update(user_id.as_bytes());
    hasher.update(canonical_bytes(operation_data));
    hex::encode(hasher.finalize())
}

fn checksum(operation_data: &Value) -> String {
    let mut hasher = Sha256::new();
    hasher.update(canonical_bytes(operation_data));
    hex::encode(hasher.finalize())
}

fn canonical_bytes(value: &Value) -> Vec<u8> {
    // serde_json::Value serializes maps in BTreeMap-sorted order internally only when the
    // `preserve_order` feature is off; this crate does not enable it, so field order here is
    // already canonical.
    serde_json::to_vec(value).unwrap_or_default()
}

fn parse_state(stored: &str) -> Option<IdempotencyState> {
    serde_json::from_str(stored).ok()
}

fn to_timestamp(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(secs, 0).unwrap_or_else(Utc::now)
}

/// Raw row read back from `idempotency_records`, kept separate from `IdempotencyRecord` so
/// a read can be reconstructed into the latter without re-deriving `idem_key`/`operation`.
struct ExistingRow {
    state: String,
    checksum: String,
    created_at: i64,
    started_at: Option<i64>,
    completed_at: Option<i64>,
    trade_id: Option<String>,
    tx_signature: Option<String>,
    operation_data: String,
    result_data: Option<String>,
    error: Option<String>,
}

impl ExistingRow {
    fn into_record(
        self,
        idem_key: String,
        operation: IdempotencyOperation,
        user_id: uuid::Uuid,
    ) -> IdempotencyRecord {
        IdempotencyRecord {
            idem_key,
            operation,
            user_id,
            state: parse_state(&self.state).unwrap_or(IdempotencyState::Failed),
            trade_id: self.trade_id,
            tx_signature: self.tx_signature,
            created_at: to_timestamp(self.created_at),
            started_at: self.started_at.map(to_timestamp),
            completed_at: self.completed_at.map(to_timestamp),
            operation_data: serde_json::from_str(&self.operation_data).unwrap_or(Value::Null),
            result_data: self.result_data.and_then(|s| serde_json::from_str(&s).ok()),
            error: self.error,
            checksum: self.checksum,
        }
    }
}

#[derive(Clone)]
pub struct IdempotencyStore {
    conn: Arc<Mutex<Connection>>,
}

impl IdempotencyStore {
    pub fn new(db_path: &str) -> Result<Self> {
        let conn = Connection::open(db_path).context("open idempotency db")?;
        conn.pragma_update(None, "journal_mode", "WAL").ok();
        conn.execute(
            "CREATE TABLE IF NOT EXISTS idempotency_records (
                idem_key TEXT PRIMARY KEY,
                operation TEXT NOT NULL,
                user_id TEXT NOT NULL,
                state TEXT NOT NULL,
                trade_id TEXT,
                tx_signature TEXT,
                created_at INTEGER NOT NULL,
                started_at INTEGER,
                completed_at INTEGER,
                operation_data TEXT NOT NULL,
                result_data TEXT,
                error TEXT,
                checksum TEXT NOT NULL
            )",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_idempotency_created
             ON idempotency_records(created_at)",
            [],
        )?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Reserve `idem_key` for `operation_data`, or return the existing record if one is
    /// already in flight or already `confirmed` (spec §4.14 "check_and_reserve": "replays of
    /// a confirmed record return the prior result"). A record older than `RECORD_TTL_SECONDS`
    /// and still `pending`/`started` is treated as abandoned and re-reserved rather than
    /// blocking forever. A `confirmed` row is read back and returned verbatim — it is never
    /// reset to `started` by this call, since that would let a retried request re-execute a
    /// trade that already has a signature.
    pub async fn check_and_reserve(
        &self,
        operation: IdempotencyOperation,
        user_id: uuid::Uuid,
        operation_data: Value,
        now: DateTime<Utc>,
    ) -> Result<IdempotencyRecord, IdempotencyError> {
        let idem_key = derive_key(operation, &user_id, &operation_data);
        let new_checksum = checksum(&operation_data);
        let conn = self.conn.lock().await;

        let existing: Option<ExistingRow> = conn
            .query_row(
                "SELECT state, checksum, created_at, started_at, completed_at, trade_id,
                        tx_signature, operation_data, result_data, error
                 FROM idempotency_records WHERE idem_key = ?1",
                params![idem_key],
                |row| {
                    Ok(ExistingRow {
                        state: row.get(0)?,
                        checksum: row.get(1)?,
                        created_at: row.get(2)?,
                        started_at: row.get(3)?,
                        completed_at: row.get(4)?,
                        trade_id: row.get(5)?,
                        tx_signature: row.get(6)?,
                        operation_data: row.get(7)?,
                        result_data: row.get(8)?,
                        error: row.get(9)?,
                    })
                },
            )
            .optional()
            .map_err(|e| IdempotencyError::Storage(e.to_string()))?;

        if let Some(row) = existing {
            if row.checksum != new_checksum {
                return Err(IdempotencyError::ChecksumMismatch { idem_key });
            }
            let state = parse_state(&row.state);
            if state == Some(IdempotencyState::Confirmed) {
                return Ok(row.into_record(idem_key, operation, user_id));
            }
            let abandoned = now.timestamp() - row.created_at > RECORD_TTL_SECONDS;
            let in_flight = matches!(state, Some(IdempotencyState::Pending) | Some(IdempotencyState::Started));
            if in_flight && !abandoned {
                return Err(IdempotencyError::InFlight { idem_key });
            }
        }

        conn.execute(
            "INSERT INTO idempotency_records
                (idem_key, operation, user_id, state, trade_id, tx_signature, created_at,
                 started_at, completed_at, operation_data, result_data, error, checksum)
             VALUES (?1, ?2, ?3, ?4, NULL, NULL, ?5, ?5, NULL, ?6, NULL, NULL, ?7)
             ON CONFLICT(idem_key) DO UPDATE SET
                state = excluded.state, started_at = excluded.started_at, completed_at = NULL,
                result_data = NULL, error = NULL",
            params![
                idem_key,
                serde_json::to_string(&operation).unwrap_or_default(),
                user_id.to_string(),
                serde_json::to_string(&IdempotencyState::Started).unwrap_or_default(),
                now.timestamp(),
                serde_json::to_string(&operation_data).unwrap_or_default(),
                new_checksum,
            ],
        )
        .map_err(|e| IdempotencyError::Storage(e.to_string()))?;

        Ok(IdempotencyRecord {
            idem_key,
            operation,
            user_id,
            state: IdempotencyState::Started,
            trade_id: None,
            tx_signature: None,
            created_at: now,
            started_at: Some(now),
            completed_at: None,
            operation_data,
            result_data: None,
            error: None,
            checksum: new_checksum,
        })
    }

    /// Record the terminal outcome of a reserved operation (spec §4.14 "record_result").
    pub async fn record_result(
        &self,
        idem_key: &str,
        state: IdempotencyState,
        trade_id: Option<String>,
        tx_signature: Option<String>,
        result_data: Option<Value>,
        error: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<(), IdempotencyError> {
        let conn = self.conn.lock().await;
        conn.execute(
            "UPDATE idempotency_records
             SET state = ?1, trade_id = ?2, tx_signature = ?3, completed_at = ?4,
                 result_data = ?5, error = ?6
             WHERE idem_key = ?7",
            params![
                serde_json::to_string(&state).unwrap_or_default(),
                trade_id,
                tx_signature,
                now.timestamp(),
                result_data.map(|v| serde_json::to_string(&v).unwrap_or_default()),
                error,
                idem_key,
            ],
        )
        .map_err(|e| IdempotencyError::Storage(e.to_string()))?;
        Ok(())
    }

    /// Purge records older than 30 days (spec §4.14 retention). Returns the row count deleted.
    pub async fn purge_expired(&self, now: DateTime<Utc>) -> Result<usize, IdempotencyError> {
        let cutoff = now.timestamp() - PURGE_AFTER_DAYS * 24 * 3600;
        let conn = self.conn.lock().await;
        let deleted = conn
            .execute(
                "DELETE FROM idempotency_records WHERE created_at < ?1",
                params![cutoff],
            )
            .map_err(|e| IdempotencyError::Storage(e.to_string()))?;
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn db() -> (IdempotencyStore, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = IdempotencyStore::new(dir.path().join("idem.db").to_str().unwrap()).unwrap();
        (store, dir)
    }

    #[tokio::test]
    async fn second_reservation_with_same_payload_is_rejected_while_in_flight() {
        let (store, _dir) = db();
        let user = uuid::Uuid::new_v4();
        let payload = serde_json::json!({"trade": "a"});
        let now = Utc::now();
        store
            .check_and_reserve(IdempotencyOperation::TradeExecution, user, payload.clone(), now)
            .await
            .unwrap();
        let second = store
            .check_and_reserve(IdempotencyOperation::TradeExecution, user, payload, now)
            .await;
        assert!(matches!(second, Err(IdempotencyError::InFlight { .. })));
    }

    #[tokio::test]
    async fn differing_payload_under_same_key_is_a_checksum_mismatch() {
        let (store, _dir) = db();
        let user = uuid::Uuid::new_v4();
        let now = Utc::now();
        let record = store
            .check_and_reserve(
                IdempotencyOperation::TradeExecution,
                user,
                serde_json::json!({"trade": "a"}),
                now,
            )
            .await
            .unwrap();

        // Force a same-key, different-payload collision by reusing the derived key manually.
        let conn = store.conn.lock().await;
        conn.execute(
            "UPDATE idempotency_records SET checksum = 'deadbeef' WHERE idem_key = ?1",
            params![record.idem_key],
        )
        .unwrap();
        drop(conn);

        let result = store
            .check_and_reserve(
                IdempotencyOperation::TradeExecution,
                user,
                serde_json::json!({"trade": "a"}),
                now,
            )
            .await;
        assert!(matches!(result, Err(IdempotencyError::ChecksumMismatch { .. })));
    }

    #[tokio::test]
    async fn abandoned_reservation_past_ttl_can_be_retaken() {
        let (store, _dir) = db();
        let user = uuid::Uuid::new_v4();
        let payload = serde_json::json!({"trade": "a"});
        let start = Utc::now() - chrono::Duration::seconds(RECORD_TTL_SECONDS + 60);
        store
            .check_and_reserve(IdempotencyOperation::TradeExecution, user, payload.clone(), start)
            .await
            .unwrap();

        let retaken = store
            .check_and_reserve(IdempotencyOperation::TradeExecution, user, payload, Utc::now())
            .await;
        assert!(retaken.is_ok());
    }

    #[tokio::test]
    async fn confirmed_replay_returns_the_stored_signature_without_resetting_state() {
        let (store, _dir) = db();
        let user = uuid::Uuid::new_v4();
        let payload = serde_json::json!({"trade": "a"});
        let now = Utc::now();
        let reserved = store
            .check_and_reserve(IdempotencyOperation::TradeExecution, user, payload.clone(), now)
            .await
            .unwrap();
        store
            .record_result(
                &reserved.idem_key,
                IdempotencyState::Confirmed,
                Some("trade-1".to_string()),
                Some("sig-1".to_string()),
                None,
                None,
                now,
            )
            .await
            .unwrap();

        let replay = store
            .check_and_reserve(IdempotencyOperation::TradeExecution, user, payload, Utc::now())
            .await
            .unwrap();

        assert_eq!(replay.state, IdempotencyState::Confirmed);
        assert_eq!(replay.tx_signature.as_deref(), Some("sig-1"));

        // The replay must not have reset the row back to `started`.
        let conn = store.conn.lock().await;
        let state: String = conn
            .query_row(
                "SELECT state FROM idempotency_records WHERE idem_key = ?1",
                params![reserved.idem_key],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(state, serde_json::to_string(&IdempotencyState::Confirmed).unwrap());
    }

    #[tokio::test]
    async fn purge_removes_records_older_than_thirty_days() {
        let (store, _dir) = db();
        let user = uuid::Uuid::new_v4();
        let old = Utc::now() - chrono::Duration::days(31);
        store
            .check_and_reserve(
                IdempotencyOperation::TradeExecution,
                user,
                serde_json::json!({"trade": "a"}),
                old,
            )
            .await
            .unwrap();
        let deleted = store.purge_expired(Utc::now()).await.unwrap();
        assert_eq!(deleted, 1);
    }
}
