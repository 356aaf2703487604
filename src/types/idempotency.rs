use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdempotencyOperation {
    TradeGeneration,
    TradeExecution,
    PortfolioReconciliation,
    StrategyIngestion,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdempotencyState {
    Pending,
    Started,
    Confirmed,
    Failed,
    Cancelled,
    Expired,
}

/// Persistent, tamper-evident idempotency record (spec §3/§4.14).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdempotencyRecord {
    pub idem_key: String,
    pub operation: IdempotencyOperation,
    pub user_id: uuid::Uuid,
    pub state: IdempotencyState,
    pub trade_id: Option<String>,
    pub tx_signature: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub operation_data: Value,
    pub result_data: Option<Value>,
    pub error: Option<String>,
    pub checksum: String,
}
