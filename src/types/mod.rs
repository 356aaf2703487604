//! Core data model (spec §3): the structural types shared by both services.
//!
//! Per spec §9 ("From dynamic to structural typing"), every external message and persisted
//! record gets a strict type here; nothing downstream takes a generic `serde_json::Value` map.

pub mod audit;
pub mod breaker;
pub mod idempotency;
pub mod metrics;
pub mod monitor;
pub mod portfolio;
pub mod ranking;
pub mod swap;
pub mod trade;
pub mod trust_score;
pub mod user;

pub use audit::{AuditEntry, DecisionContext, Severity};
pub use breaker::{BreakerConfig, BreakerDomain, BreakerPriority, BreakerState, CircuitBreaker};
pub use idempotency::{IdempotencyOperation, IdempotencyRecord, IdempotencyState};
pub use metrics::PerformanceMetrics;
pub use monitor::{ConfirmationErrorKind, ConfirmationRequirement, RetryStrategy, TransactionMonitor, TxState};
pub use portfolio::{
    Allocation, AssetDiscrepancy, GeneratedTrade, HoldingPosition, Portfolio, PortfolioComparison,
    SwapInstruction, TargetPortfolio, TradeStatus,
};
pub use ranking::{EligibilityCriteria, PerformanceBreakdown, RankedTrader, RankingSnapshot, ScoringWeights};
pub use swap::{Swap, SwapStatus, SwapVariant, TokenLeg};
pub use trade::{Trade, TradeType};
pub use trust_score::{Eligibility, NormalizedTriple, TrustScoreResult};
pub use user::{RiskProfile, UserRiskProfile};
