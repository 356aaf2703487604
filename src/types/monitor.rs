use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TxState {
    Submitted,
    Pending,
    Confirmed,
    Finalized,
    Failed,
    Stuck,
    Replaced,
    Dropped,
    Timeout,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfirmationRequirement {
    pub min_confirmations: u32,
    pub max_wait_seconds: u64,
    pub require_finalization: bool,
}

impl ConfirmationRequirement {
    /// Derive confirmation requirements from trade USD value (spec §4.16 table).
    pub fn for_trade_value(usd: f64) -> Self {
        if usd >= 10_000.0 {
            Self {
                min_confirmations: 3,
                max_wait_seconds: 300,
                require_finalization: true,
            }
        } else if usd >= 1_000.0 {
            Self {
                min_confirmations: 2,
                max_wait_seconds: 180,
                require_finalization: false,
            }
        } else if usd >= 100.0 {
            Self {
                min_confirmations: 1,
                max_wait_seconds: 120,
                require_finalization: false,
            }
        } else {
            Self {
                min_confirmations: 1,
                max_wait_seconds: 60,
                require_finalization: false,
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfirmationErrorKind {
    NetworkError,
    RateLimited,
    NodeUnhealthy,
    UnknownError,
    BlockhashExpired,
    ComputeBudgetExceeded,
    TimeoutError,
    ProgramError,
    InsufficientFunds,
    SlippageExceeded,
    TxTooLarge,
    DuplicateTx,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryStrategy {
    ExponentialBackoff,
    Replace,
    LinearBackoff,
    NoRetry,
}

impl ConfirmationErrorKind {
    /// Retry strategy classification table (spec §4.16).
    pub fn retry_strategy(&self) -> RetryStrategy {
        use ConfirmationErrorKind::*;
        match self {
            NetworkError | RateLimited | NodeUnhealthy | UnknownError => {
                RetryStrategy::ExponentialBackoff
            }
            BlockhashExpired | ComputeBudgetExceeded | TimeoutError => RetryStrategy::Replace,
            ProgramError => RetryStrategy::LinearBackoff,
            InsufficientFunds | SlippageExceeded | TxTooLarge | DuplicateTx => {
                RetryStrategy::NoRetry
            }
        }
    }
}

/// `(trade_id, tx_signature, submitted_at, state, confirmations, ...)` (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionMonitor {
    pub trade_id: String,
    pub tx_signature: String,
    pub submitted_at: DateTime<Utc>,
    pub state: TxState,
    pub confirmations: u32,
    pub block_height: Option<u64>,
    pub finalized: bool,
    pub confirmation_requirement: ConfirmationRequirement,
    pub error_count: u32,
    pub retry_count: u32,
    pub next_retry_at: Option<DateTime<Utc>>,
}

impl TransactionMonitor {
    /// "Stuck": pending with 0 confirmations for > 120s.
    pub fn is_stuck(&self, now: DateTime<Utc>) -> bool {
        self.state == TxState::Pending
            && self.confirmations == 0
            && (now - self.submitted_at).num_seconds() > 120
    }

    /// "Expired": elapsed time exceeds the requirement's max wait.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        (now - self.submitted_at).num_seconds()
            > self.confirmation_requirement.max_wait_seconds as i64
    }

    /// Exponential backoff per spec §4.16: `min(initial * multiplier^retry, max_delay)`.
    pub fn backoff_delay_seconds(retry_count: u32) -> u64 {
        const INITIAL: u64 = 5;
        const MULTIPLIER: u64 = 2;
        const MAX_DELAY: u64 = 300;
        INITIAL
            .saturating_mul(MULTIPLIER.saturating_pow(retry_count))
            .min(MAX_DELAY)
    }
}
