use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::metrics::PerformanceMetrics;

/// Enumerated eligibility outcomes, in check order (spec §4.6).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Eligibility {
    Eligible,
    NoData { reason: String },
    InsufficientHistory { reason: String },
    InsufficientTrades { reason: String },
    ExtremeRoiSpike { reason: String },
    CalculationError { reason: String },
}

impl Eligibility {
    pub fn is_eligible(&self) -> bool {
        matches!(self, Eligibility::Eligible)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizedTriple {
    pub normalized_sharpe: Decimal,
    pub normalized_roi: Decimal,
    pub normalized_drawdown: Decimal,
}

/// Trust-Score result (spec §3/§4.6). `score` is always populated ([0,100]); the breakdown
/// fields are only populated when `eligibility` is `Eligible`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrustScoreResult {
    pub wallet: String,
    pub score: Decimal,
    pub eligibility: Eligibility,
    pub normalized: Option<NormalizedTriple>,
    pub performance_score: Option<Decimal>,
    pub risk_penalty: Option<Decimal>,
    pub metrics: Option<PerformanceMetrics>,
}
