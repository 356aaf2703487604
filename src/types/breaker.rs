use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakerDomain {
    TradeFailureRate,
    Network,
    MarketVolatility,
    SlippageRate,
    HsmFailure,
    SystemErrors,
    ConfirmationTimeout,
}

impl BreakerDomain {
    pub fn display_name(&self) -> &'static str {
        match self {
            BreakerDomain::TradeFailureRate => "Trade Failure Rate Monitor",
            BreakerDomain::Network => "Network Reliability Monitor",
            BreakerDomain::MarketVolatility => "Market Volatility Monitor",
            BreakerDomain::SlippageRate => "Slippage Rate Monitor",
            BreakerDomain::HsmFailure => "HSM Failure Monitor",
            BreakerDomain::SystemErrors => "System Error Monitor",
            BreakerDomain::ConfirmationTimeout => "Confirmation Timeout Monitor",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakerPriority {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BreakerConfig {
    pub failure_threshold: u32,
    pub time_window_minutes: i64,
    pub consecutive_failure_limit: u32,
    pub recovery_timeout_minutes: i64,
    pub test_request_limit: u32,
    pub recovery_success_threshold: u32,
    pub percentage_threshold: Option<f64>,
    pub priority: BreakerPriority,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BreakerEvent {
    pub at: DateTime<Utc>,
    pub success: bool,
}

/// `(type, name, state, recent_events[window], failure_count, ...)` (spec §3/§4.17).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreaker {
    pub domain: BreakerDomain,
    pub name: String,
    pub state: BreakerState,
    pub recent_events: Vec<BreakerEvent>,
    pub failure_count: u32,
    pub consecutive_failures: u32,
    pub opened_at: Option<DateTime<Utc>>,
    pub half_open_successes: u32,
    pub half_open_attempts: u32,
    pub config: BreakerConfig,
}
