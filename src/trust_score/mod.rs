//! Trust-Score engine (spec §4.6): eligibility gating, cross-wallet normalization, and the
//! fixed weighted scoring formula. Treat the formula constants as core IP — do not expose
//! them as configuration.

use rayon::prelude::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::metrics::daily_roi_buckets;
use crate::types::{Eligibility, NormalizedTriple, PerformanceMetrics, Swap, Trade, TrustScoreResult};

const SHARPE_WEIGHT: Decimal = dec!(0.40);
const ROI_WEIGHT: Decimal = dec!(0.25);
const DRAWDOWN_PENALTY_WEIGHT: Decimal = dec!(0.35);
const MIN_RANGE: Decimal = dec!(0.001);

const MIN_HISTORY_DAYS: i64 = 90;
const MIN_TRADE_COUNT: u32 = 50;
const MAX_DAILY_ROI_SPIKE: Decimal = dec!(0.5);

/// Per-wallet eligibility check, evaluated in spec order; first failure wins (spec §4.6).
pub fn check_eligibility(
    swaps: &[Swap],
    trades: &[Trade],
    metrics: &Option<PerformanceMetrics>,
) -> Eligibility {
    if swaps.is_empty() {
        return Eligibility::NoData {
            reason: "wallet has no recorded swaps".to_string(),
        };
    }

    let earliest = swaps.iter().map(|s| s.block_time).min().unwrap();
    let latest = swaps.iter().map(|s| s.block_time).max().unwrap();
    let span_days = (latest - earliest).num_days();
    if span_days < MIN_HISTORY_DAYS {
        return Eligibility::InsufficientHistory {
            reason: format!("trading span is {span_days} days, need >= {MIN_HISTORY_DAYS}"),
        };
    }

    if (swaps.len() as u32) < MIN_TRADE_COUNT {
        return Eligibility::InsufficientTrades {
            reason: format!(
                "{} trades recorded, need >= {MIN_TRADE_COUNT}",
                swaps.len()
            ),
        };
    }

    for (date, profit, volume) in daily_roi_buckets(trades) {
        if volume <= Decimal::ZERO {
            continue;
        }
        let ratio = (profit / volume).abs();
        if ratio > MAX_DAILY_ROI_SPIKE {
            return Eligibility::ExtremeRoiSpike {
                reason: format!("{date} ROI magnitude {ratio} exceeds {MAX_DAILY_ROI_SPIKE}"),
            };
        }
    }

    if metrics.is_none() {
        return Eligibility::CalculationError {
            reason: "performance metrics could not be computed".to_string(),
        };
    }

    Eligibility::Eligible
}

#[derive(Debug, Clone, Copy)]
struct Range {
    min: Decimal,
    max: Decimal,
}

impl Range {
    fn span(&self) -> Decimal {
        (self.max - self.min).max(MIN_RANGE)
    }
}

struct CohortStats {
    sharpe: Range,
    roi: Range,
    drawdown: Range,
}

/// Compute min/max across the benchmark cohort for each of `{sharpe, roi, drawdown}`
/// (spec §4.6 normalization). Callers pass `[metrics]` alone for a degenerate single-wallet
/// cohort; every dimension is then zero-variance and `normalize` ties it at `1` (spec §8
/// Scenario A: single-wallet scoring yields normalized triple `(1,1,1)`).
fn cohort_stats(cohort: &[&PerformanceMetrics]) -> CohortStats {
    fn range_of(values: impl Iterator<Item = Decimal>) -> Range {
        let mut min = Decimal::MAX;
        let mut max = Decimal::MIN;
        for v in values {
            if v < min {
                min = v;
            }
            if v > max {
                max = v;
            }
        }
        if min > max {
            min = Decimal::ZERO;
            max = Decimal::ZERO;
        }
        Range { min, max }
    }

    CohortStats {
        sharpe: range_of(cohort.iter().map(|m| m.sharpe_ratio)),
        roi: range_of(cohort.iter().map(|m| m.net_roi_percent)),
        drawdown: range_of(cohort.iter().map(|m| m.maximum_drawdown_percent)),
    }
}

/// A zero-variance dimension (every wallet in the cohort tied, including the degenerate
/// single-wallet cohort) ties everyone at `1` rather than dividing by the clamped span —
/// a wallet can't be penalized for failing to beat itself.
fn normalize(value: Decimal, range: Range, invert: bool) -> Decimal {
    if range.max == range.min {
        return Decimal::ONE;
    }
    let raw = (value - range.min) / range.span();
    let raw = if invert { Decimal::ONE - raw } else { raw };
    raw.clamp(Decimal::ZERO, Decimal::ONE)
}

/// Score one eligible wallet's metrics against a precomputed cohort. Returns `(score,
/// normalized, performance_score, risk_penalty)`.
fn score_against_cohort(
    metrics: &PerformanceMetrics,
    stats: &CohortStats,
) -> (Decimal, NormalizedTriple, Decimal, Decimal) {
    let normalized_sharpe = normalize(metrics.sharpe_ratio, stats.sharpe, false);
    let normalized_roi = normalize(metrics.net_roi_percent, stats.roi, false);
    let normalized_drawdown = normalize(metrics.maximum_drawdown_percent, stats.drawdown, true);

    let performance = normalized_sharpe * SHARPE_WEIGHT + normalized_roi * ROI_WEIGHT;
    let penalty = (Decimal::ONE - normalized_drawdown) * DRAWDOWN_PENALTY_WEIGHT;
    let score_raw = (performance - penalty).max(Decimal::ZERO);
    let trust_score = score_raw * dec!(100);

    (
        trust_score,
        NormalizedTriple {
            normalized_sharpe,
            normalized_roi,
            normalized_drawdown,
        },
        performance,
        penalty,
    )
}

/// One wallet's inputs for batch scoring.
pub struct WalletScoringInput {
    pub wallet: String,
    pub swaps: Vec<Swap>,
    pub trades: Vec<Trade>,
    pub metrics: Option<PerformanceMetrics>,
}

/// Batch scoring (spec §4.6): filter-eligible, normalize once across the eligible cohort,
/// score each. Deterministic given identical cohort inputs. Eligibility and scoring are both
/// embarrassingly parallel across wallets, so a large cohort is split across `rayon`'s pool
/// rather than walked wallet-by-wallet.
pub fn batch_score(inputs: Vec<WalletScoringInput>) -> Vec<TrustScoreResult> {
    let eligibility_by_wallet: Vec<Eligibility> = inputs
        .par_iter()
        .map(|input| check_eligibility(&input.swaps, &input.trades, &input.metrics))
        .collect();

    let eligible_metrics: Vec<&PerformanceMetrics> = inputs
        .iter()
        .zip(&eligibility_by_wallet)
        .filter(|(_, e)| e.is_eligible())
        .map(|(input, _)| input.metrics.as_ref().expect("eligible implies metrics"))
        .collect();
    let stats = cohort_stats(&eligible_metrics);

    inputs
        .into_par_iter()
        .zip(eligibility_by_wallet)
        .map(|(input, eligibility)| {
            if !eligibility.is_eligible() {
                return TrustScoreResult {
                    wallet: input.wallet,
                    score: Decimal::ZERO,
                    eligibility,
                    normalized: None,
                    performance_score: None,
                    risk_penalty: None,
                    metrics: input.metrics,
                };
            }

            let metrics = input.metrics.expect("eligible implies metrics");
            let (score, normalized, performance_score, risk_penalty) =
                score_against_cohort(&metrics, &stats);

            TrustScoreResult {
                wallet: input.wallet,
                score,
                eligibility,
                normalized: Some(normalized),
                performance_score: Some(performance_score),
                risk_penalty: Some(risk_penalty),
                metrics: Some(metrics),
            }
        })
        .collect()
}

/// Single-wallet convenience wrapper: uses `[metrics]` as its own cohort per spec §4.6.
pub fn score_single(
    wallet: &str,
    swaps: Vec<Swap>,
    trades: Vec<Trade>,
    metrics: Option<PerformanceMetrics>,
) -> TrustScoreResult {
    let input = WalletScoringInput {
        wallet: wallet.to_string(),
        swaps,
        trades,
        metrics,
    };
    batch_score(vec![input]).into_iter().next().unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SwapStatus;
    use crate::types::{SwapVariant, TokenLeg};
    use chrono::Duration;

    fn swap_at(days_ago: i64) -> Swap {
        Swap {
            signature: "x".repeat(88),
            wallet: "wallet".to_string(),
            block_time: Utc::now() - Duration::days(days_ago),
            slot: 1,
            status: SwapStatus::Success,
            variant: SwapVariant::In,
            input: TokenLeg {
                mint: "mintA".to_string(),
                symbol: "USDC".to_string(),
                decimals: 6,
                amount: 10.0,
                usd_value: Some(10.0),
            },
            output: TokenLeg {
                mint: "mintB".to_string(),
                symbol: "SOL".to_string(),
                decimals: 9,
                amount: 1.0,
                usd_value: Some(10.0),
            },
            pool_id: None,
            amm_program_id: "prog".to_string(),
            fee_lamports: 5000,
            fee_usd: Some(0.01),
            parsing_source: "test".to_string(),
        }
    }

    fn sample_metrics(wallet: &str, sharpe: Decimal, roi: Decimal, drawdown: Decimal) -> PerformanceMetrics {
        PerformanceMetrics {
            wallet: wallet.to_string(),
            period_days: 90,
            net_roi_percent: roi,
            maximum_drawdown_percent: drawdown,
            sharpe_ratio: sharpe,
            win_loss_ratio: Some(dec!(2)),
            total_volume_usd: dec!(1000),
            total_fees_usd: dec!(10),
            total_profit_usd: dec!(100),
            winning_trades: 30,
            losing_trades: 20,
            avg_trade_size_usd: dec!(20),
            largest_win_usd: dec!(50),
            largest_loss_usd: dec!(-20),
            avg_holding_period_seconds: 3600,
            total_trades: 50,
            data_points: 50,
            calculation_version: "1.0.0".to_string(),
        }
    }

    #[test]
    fn insufficient_history_rejects_short_span() {
        let swaps: Vec<Swap> = (0..60).map(|i| swap_at(i)).collect();
        let eligibility = check_eligibility(&swaps, &[], &None);
        assert!(matches!(eligibility, Eligibility::InsufficientHistory { .. }));
    }

    #[test]
    fn insufficient_trades_rejects_low_count() {
        let swaps: Vec<Swap> = (0..10).map(|i| swap_at(i * 10)).collect();
        let eligibility = check_eligibility(&swaps, &[], &None);
        assert!(matches!(eligibility, Eligibility::InsufficientTrades { .. }));
    }

    #[test]
    fn no_data_on_empty_swaps() {
        let eligibility = check_eligibility(&[], &[], &None);
        assert!(matches!(eligibility, Eligibility::NoData { .. }));
    }

    #[test]
    fn batch_score_normalizes_across_cohort_and_ranks_higher_sharpe_first() {
        let inputs = vec![
            WalletScoringInput {
                wallet: "a".to_string(),
                swaps: vec![],
                trades: vec![],
                metrics: Some(sample_metrics("a", dec!(2.0), dec!(50), dec!(5))),
            },
            WalletScoringInput {
                wallet: "b".to_string(),
                swaps: vec![],
                trades: vec![],
                metrics: Some(sample_metrics("b", dec!(1.0), dec!(20), dec!(15))),
            },
        ];
        // Force both eligible for this test by constructing eligibility directly via
        // score_against_cohort instead of check_eligibility (which needs real swap history).
        let stats = cohort_stats(&[
            inputs[0].metrics.as_ref().unwrap(),
            inputs[1].metrics.as_ref().unwrap(),
        ]);
        let (score_a, _, _, _) = score_against_cohort(inputs[0].metrics.as_ref().unwrap(), &stats);
        let (score_b, _, _, _) = score_against_cohort(inputs[1].metrics.as_ref().unwrap(), &stats);
        assert!(score_a > score_b);
    }

    #[test]
    fn single_wallet_cohort_ties_normalized_triple_at_one() {
        let swaps: Vec<Swap> = (0..50).map(|i| swap_at(i * 2)).collect();
        let metrics = sample_metrics("a", dec!(1.5), dec!(30), dec!(10));
        let result = score_single("a", swaps, vec![], Some(metrics));
        assert!(matches!(result.eligibility, Eligibility::Eligible));
        let normalized = result.normalized.expect("eligible wallet carries a normalized triple");
        assert_eq!(normalized.normalized_sharpe, Decimal::ONE);
        assert_eq!(normalized.normalized_roi, Decimal::ONE);
        assert_eq!(normalized.normalized_drawdown, Decimal::ONE);
        assert_eq!(result.score, dec!(65.0));
    }
}
