use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::trust_score::{Eligibility, NormalizedTriple};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceBreakdown {
    pub performance_score: Decimal,
    pub risk_penalty: Decimal,
    pub normalized: NormalizedTriple,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankedTrader {
    pub rank: u32,
    pub wallet: String,
    pub trust_score: Decimal,
    pub performance_breakdown: PerformanceBreakdown,
    pub metrics_digest: String,
    pub eligibility: Eligibility,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringWeights {
    pub sharpe_weight: Decimal,
    pub roi_weight: Decimal,
    pub drawdown_penalty_weight: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EligibilityCriteria {
    pub min_trading_days: u32,
    pub min_total_trades: u32,
    pub max_single_day_roi_spike: Decimal,
}

/// Append-only, timestamped publication of the ordered trader roster (spec §3/§4.7).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankingSnapshot {
    pub snapshot_id: uuid::Uuid,
    pub calculation_timestamp: DateTime<Utc>,
    pub period_days: u32,
    pub algorithm_version: String,
    pub eligibility_criteria: EligibilityCriteria,
    pub scoring_weights: ScoringWeights,
    pub traders: Vec<RankedTrader>,
}
