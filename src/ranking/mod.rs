//! Ranking & leaderboard (spec §4.7): filter by eligibility and minimum trust score, sort
//! descending, assign ranks, truncate, and publish a self-describing snapshot.

use chrono::Utc;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use sha2::{Digest, Sha256};

use crate::types::{
    EligibilityCriteria, PerformanceBreakdown, RankedTrader, RankingSnapshot, ScoringWeights,
    TrustScoreResult,
};

const ALGORITHM_VERSION: &str = "trust-score-v1";
const SHARPE_WEIGHT: Decimal = dec!(0.40);
const ROI_WEIGHT: Decimal = dec!(0.25);
const DRAWDOWN_PENALTY_WEIGHT: Decimal = dec!(0.35);
const MIN_TRADING_DAYS: u32 = 90;
const MIN_TOTAL_TRADES: u32 = 50;
const MAX_SINGLE_DAY_ROI_SPIKE: Decimal = dec!(0.5);

/// Build a ranking snapshot from scored results (spec §4.7). `min_trust_score` and `limit`
/// gate the published roster; eligibility criteria and scoring weights are always carried
/// inline so consumers never need to reconstruct them from code.
pub fn build_snapshot(
    scored: Vec<TrustScoreResult>,
    period_days: u32,
    min_trust_score: Decimal,
    limit: usize,
) -> RankingSnapshot {
    let mut eligible: Vec<TrustScoreResult> = scored
        .into_iter()
        .filter(|r| r.eligibility.is_eligible() && r.score >= min_trust_score)
        .collect();

    eligible.sort_by(|a, b| b.score.cmp(&a.score));
    eligible.truncate(limit);

    let traders = eligible
        .into_iter()
        .enumerate()
        .map(|(i, result)| to_ranked_trader(i as u32 + 1, result))
        .collect();

    RankingSnapshot {
        snapshot_id: uuid::Uuid::new_v4(),
        calculation_timestamp: Utc::now(),
        period_days,
        algorithm_version: ALGORITHM_VERSION.to_string(),
        eligibility_criteria: EligibilityCriteria {
            min_trading_days: MIN_TRADING_DAYS,
            min_total_trades: MIN_TOTAL_TRADES,
            max_single_day_roi_spike: MAX_SINGLE_DAY_ROI_SPIKE,
        },
        scoring_weights: ScoringWeights {
            sharpe_weight: SHARPE_WEIGHT,
            roi_weight: ROI_WEIGHT,
            drawdown_penalty_weight: DRAWDOWN_PENALTY_WEIGHT,
        },
        traders,
    }
}

fn to_ranked_trader(rank: u32, result: TrustScoreResult) -> RankedTrader {
    let metrics_digest = result
        .metrics
        .as_ref()
        .map(digest_metrics)
        .unwrap_or_default();

    RankedTrader {
        rank,
        wallet: result.wallet,
        trust_score: result.score,
        performance_breakdown: PerformanceBreakdown {
            performance_score: result.performance_score.unwrap_or(Decimal::ZERO),
            risk_penalty: result.risk_penalty.unwrap_or(Decimal::ZERO),
            normalized: result.normalized.unwrap_or(crate::types::NormalizedTriple {
                normalized_sharpe: Decimal::ZERO,
                normalized_roi: Decimal::ZERO,
                normalized_drawdown: Decimal::ZERO,
            }),
        },
        metrics_digest,
        eligibility: result.eligibility,
    }
}

fn digest_metrics(metrics: &crate::types::PerformanceMetrics) -> String {
    let canonical = serde_json::to_vec(metrics).unwrap_or_default();
    let mut hasher = Sha256::new();
    hasher.update(&canonical);
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Eligibility;

    fn result(wallet: &str, score: Decimal, eligible: bool) -> TrustScoreResult {
        TrustScoreResult {
            wallet: wallet.to_string(),
            score,
            eligibility: if eligible {
                Eligibility::Eligible
            } else {
                Eligibility::NoData {
                    reason: "test".to_string(),
                }
            },
            normalized: None,
            performance_score: None,
            risk_penalty: None,
            metrics: None,
        }
    }

    #[test]
    fn sorts_descending_and_ranks_from_one() {
        let scored = vec![
            result("low", dec!(40), true),
            result("high", dec!(90), true),
            result("mid", dec!(60), true),
        ];
        let snapshot = build_snapshot(scored, 90, dec!(0), 10);
        assert_eq!(snapshot.traders[0].wallet, "high");
        assert_eq!(snapshot.traders[0].rank, 1);
        assert_eq!(snapshot.traders[2].wallet, "low");
    }

    #[test]
    fn filters_ineligible_and_below_threshold() {
        let scored = vec![
            result("ineligible", dec!(95), false),
            result("below", dec!(10), true),
            result("keeper", dec!(80), true),
        ];
        let snapshot = build_snapshot(scored, 90, dec!(50), 10);
        assert_eq!(snapshot.traders.len(), 1);
        assert_eq!(snapshot.traders[0].wallet, "keeper");
    }

    #[test]
    fn truncates_to_limit() {
        let scored = (0..5)
            .map(|i| result(&format!("w{i}"), Decimal::from(100 - i), true))
            .collect();
        let snapshot = build_snapshot(scored, 90, dec!(0), 2);
        assert_eq!(snapshot.traders.len(), 2);
    }
}
