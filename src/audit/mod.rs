//! Append-only, hash-chained audit log (spec §4.18). Every entry's `entry_hash` commits to
//! its own payload and the previous entry's hash, so any row tampered with in place breaks
//! the chain for every entry after it.

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;
use sha2::{Digest, Sha256};
use tokio::sync::Mutex;

use crate::types::{AuditEntry, DecisionContext, Severity};

const GENESIS_HASH: &str = "0000000000000000000000000000000000000000000000000000000000000";

fn compute_entry_hash(entry: &AuditEntry) -> String {
    let mut hasher = Sha256::new();
    hasher.update(entry.entry_id.as_bytes());
    hasher.update(entry.ts.timestamp_nanos_opt().unwrap_or_default().to_le_bytes());
    hasher.update(entry.event_type.as_bytes());
    hasher.update(serde_json::to_vec(&entry.severity).unwrap_or_default());
    hasher.update(serde_json::to_vec(&entry.event_data).unwrap_or_default());
    hasher.update(entry.previous_entry_hash.as_bytes());
    hex::encode(hasher.finalize())
}

#[derive(Clone)]
pub struct AuditLog {
    conn: Arc<Mutex<Connection>>,
}

impl AuditLog {
    pub fn new(db_path: &str) -> Result<Self> {
        let conn = Connection::open(db_path).context("open audit db")?;
        conn.pragma_update(None, "journal_mode", "WAL").ok();
        conn.execute(
            "CREATE TABLE IF NOT EXISTS audit_entries (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                entry_id TEXT UNIQUE NOT NULL,
                ts INTEGER NOT NULL,
                event_type TEXT NOT NULL,
                severity TEXT NOT NULL,
                user_id TEXT,
                wallet_address TEXT,
                trader_address TEXT,
                event_data TEXT NOT NULL,
                decision_rationale TEXT,
                risk_assessment TEXT,
                trade_details TEXT,
                tx_signature TEXT,
                error TEXT,
                system_state TEXT,
                decision_context TEXT NOT NULL,
                entry_hash TEXT NOT NULL,
                previous_entry_hash TEXT NOT NULL
            )",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_audit_entries_ts ON audit_entries(ts)",
            [],
        )?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Append a new entry, chaining it to the current head. `decision_context` may be left
    /// default for routine events; the calculation-trail fields are used for scoring/trade
    /// decisions so the rationale can be reconstructed later.
    #[allow(clippy::too_many_arguments)]
    pub async fn append(
        &self,
        event_type: &str,
        severity: Severity,
        user_id: Option<uuid::Uuid>,
        wallet_address: Option<String>,
        trader_address: Option<String>,
        event_data: Value,
        decision_rationale: Option<String>,
        tx_signature: Option<String>,
        error: Option<String>,
        decision_context: DecisionContext,
        now: DateTime<Utc>,
    ) -> Result<AuditEntry> {
        let conn = self.conn.lock().await;
        let previous_entry_hash = conn
            .query_row(
                "SELECT entry_hash FROM audit_entries ORDER BY seq DESC LIMIT 1",
                [],
                |row| row.get::<_, String>(0),
            )
            .optional()?
            .unwrap_or_else(|| GENESIS_HASH.to_string());

        let mut entry = AuditEntry {
            entry_id: uuid::Uuid::new_v4(),
            ts: now,
            event_type: event_type.to_string(),
            severity,
            user_id,
            wallet_address,
            trader_address,
            event_data,
            decision_rationale,
            risk_assessment: None,
            trade_details: None,
            tx_signature,
            error,
            system_state: None,
            decision_context,
            entry_hash: String::new(),
            previous_entry_hash,
        };
        entry.entry_hash = compute_entry_hash(&entry);

        conn.execute(
            "INSERT INTO audit_entries
                (entry_id, ts, event_type, severity, user_id, wallet_address, trader_address,
                 event_data, decision_rationale, risk_assessment, trade_details, tx_signature,
                 error, system_state, decision_context, entry_hash, previous_entry_hash)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)",
            params![
                entry.entry_id.to_string(),
                entry.ts.timestamp(),
                entry.event_type,
                serde_json::to_string(&entry.severity).unwrap_or_default(),
                entry.user_id.map(|u| u.to_string()),
                entry.wallet_address,
                entry.trader_address,
                serde_json::to_string(&entry.event_data).unwrap_or_default(),
                entry.decision_rationale,
                entry.risk_assessment.as_ref().map(|v| serde_json::to_string(v).unwrap_or_default()),
                entry.trade_details.as_ref().map(|v| serde_json::to_string(v).unwrap_or_default()),
                entry.tx_signature,
                entry.error,
                entry.system_state.as_ref().map(|v| serde_json::to_string(v).unwrap_or_default()),
                serde_json::to_string(&entry.decision_context).unwrap_or_default(),
                entry.entry_hash,
                entry.previous_entry_hash,
            ],
        )?;

        Ok(entry)
    }

    /// Walk the chain in insertion order and verify every entry's hash both commits to its
    /// own payload and correctly links to its predecessor. Returns the first broken link, if
    /// any (spec §4.18 "tamper detection").
    pub async fn verify_chain(&self) -> Result<Option<uuid::Uuid>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            "SELECT entry_id, ts, event_type, severity, event_data, entry_hash, previous_entry_hash
             FROM audit_entries ORDER BY seq ASC",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, String>(5)?,
                row.get::<_, String>(6)?,
            ))
        })?;

        let mut expected_previous = GENESIS_HASH.to_string();
        for row in rows {
            let (entry_id, ts, event_type, severity_json, event_data_json, entry_hash, previous_entry_hash) =
                row?;
            if previous_entry_hash != expected_previous {
                return Ok(Some(uuid::Uuid::parse_str(&entry_id).unwrap_or_default()));
            }
            let severity: Severity = serde_json::from_str(&severity_json)?;
            let event_data: Value = serde_json::from_str(&event_data_json)?;
            let recomputed = compute_entry_hash(&AuditEntry {
                entry_id: uuid::Uuid::parse_str(&entry_id).unwrap_or_default(),
                ts: DateTime::from_timestamp(ts, 0).unwrap_or_default(),
                event_type,
                severity,
                user_id: None,
                wallet_address: None,
                trader_address: None,
                event_data,
                decision_rationale: None,
                risk_assessment: None,
                trade_details: None,
                tx_signature: None,
                error: None,
                system_state: None,
                decision_context: DecisionContext::default(),
                entry_hash: String::new(),
                previous_entry_hash: previous_entry_hash.clone(),
            });
            if recomputed != entry_hash {
                return Ok(Some(uuid::Uuid::parse_str(&entry_id).unwrap_or_default()));
            }
            expected_previous = entry_hash;
        }
        Ok(None)
    }
}

/// Fatal startup check analogue to `Swap::validate_invariants`: a log with a broken chain
/// must halt the system rather than silently continuing (spec §4.18, §4.17 system halt).
pub async fn assert_chain_intact(log: &AuditLog) -> Result<()> {
    if let Some(entry_id) = log.verify_chain().await? {
        bail!("audit chain integrity violation at entry {entry_id}");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn chain_verifies_after_several_appends() {
        let dir = tempfile::tempdir().unwrap();
        let log = AuditLog::new(dir.path().join("audit.db").to_str().unwrap()).unwrap();
        for i in 0..5 {
            log.append(
                "trade_generated",
                Severity::Info,
                None,
                None,
                None,
                serde_json::json!({"i": i}),
                None,
                None,
                None,
                DecisionContext::default(),
                Utc::now(),
            )
            .await
            .unwrap();
        }
        assert!(log.verify_chain().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn tampered_row_breaks_the_chain() {
        let dir = tempfile::tempdir().unwrap();
        let log = AuditLog::new(dir.path().join("audit.db").to_str().unwrap()).unwrap();
        log.append(
            "trade_generated",
            Severity::Info,
            None,
            None,
            None,
            serde_json::json!({"a": 1}),
            None,
            None,
            None,
            DecisionContext::default(),
            Utc::now(),
        )
        .await
        .unwrap();
        log.append(
            "trade_executed",
            Severity::Info,
            None,
            None,
            None,
            serde_json::json!({"a": 2}),
            None,
            None,
            None,
            DecisionContext::default(),
            Utc::now(),
        )
        .await
        .unwrap();

        let conn = log.conn.lock().await;
        conn.execute(
            "UPDATE audit_entries SET event_data = '{\"a\":999}' WHERE seq = 1",
            [],
        )
        .unwrap();
        drop(conn);

        assert!(log.verify_chain().await.unwrap().is_some());
    }
}
