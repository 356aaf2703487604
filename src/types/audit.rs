use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warning,
    Error,
    Critical,
}

/// Structured, nested calculation/decision context carried on select audit entries.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DecisionContext {
    #[serde(default)]
    pub calculation_inputs: Value,
    #[serde(default)]
    pub calculation_outputs: Value,
    #[serde(default)]
    pub decision_factors: Value,
    #[serde(default)]
    pub validation_results: Value,
    #[serde(default)]
    pub performance_metrics: Value,
    #[serde(default)]
    pub context_snapshot: Value,
    pub correlation_id: Option<uuid::Uuid>,
}

/// Append-only, hash-chained audit entry (spec §3/§4.18).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub entry_id: uuid::Uuid,
    pub ts: DateTime<Utc>,
    pub event_type: String,
    pub severity: Severity,
    pub user_id: Option<uuid::Uuid>,
    pub wallet_address: Option<String>,
    pub trader_address: Option<String>,
    pub event_data: Value,
    pub decision_rationale: Option<String>,
    pub risk_assessment: Option<Value>,
    pub trade_details: Option<Value>,
    pub tx_signature: Option<String>,
    pub error: Option<String>,
    pub system_state: Option<Value>,
    pub decision_context: DecisionContext,
    /// `SHA-256(canonical(entry - entry_hash) || previous_entry_hash)`, hex-encoded.
    pub entry_hash: String,
    pub previous_entry_hash: String,
}
