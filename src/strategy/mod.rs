//! Strategy selector (spec §4.9 phase 3): picks the top-ranked eligible trader whose trust
//! score clears the user's risk-profile threshold, then derives a target portfolio from
//! that trader's actual on-chain holdings (spec §9: allocations must be driven from the
//! selected trader's real holdings, not a placeholder constant).

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

use crate::types::{Allocation, Portfolio, RankedTrader, TargetPortfolio, UserRiskProfile};

const MIN_CONFIDENCE: f64 = 60.0;

/// A trader's confidence score, separate from `trust_score` (spec §4.9: "Also enforce
/// `confidence >= 60`"). Derived from the ranking entry's normalized Sharpe component as a
/// proxy, since the wire `RankedTrader` shape carries no independent confidence field.
fn confidence(trader: &RankedTrader) -> f64 {
    trader
        .performance_breakdown
        .normalized
        .normalized_sharpe
        .to_f64()
        .unwrap_or(0.0)
        * 100.0
}

/// Pick the top-ranked eligible trader clearing `user.risk_profile`'s threshold and
/// `confidence >= 60`. Pure and side-effect free: building the resulting `TargetPortfolio`
/// needs that trader's current on-chain holdings, which the caller fetches separately (via
/// `vault_reader::VaultReader::read_vault_holdings` against the trader's own wallet) and
/// passes to `build_target_portfolio`. Returns `None` if no trader qualifies (the user is
/// skipped for this cycle).
pub fn select_candidate<'a>(
    traders: &'a [RankedTrader],
    user: &UserRiskProfile,
) -> Option<(&'a RankedTrader, Decimal)> {
    let threshold = Decimal::try_from(user.risk_profile.trust_score_threshold()).ok()?;

    let chosen = traders
        .iter()
        .filter(|t| t.eligibility.is_eligible())
        .filter(|t| t.trust_score >= threshold)
        .find(|t| confidence(t) >= MIN_CONFIDENCE)?;

    Some((chosen, threshold))
}

/// Build a `TargetPortfolio` that mirrors `holdings` 1:1, weighting each position by its
/// share of the trader's total portfolio value. Returns `None` if the trader currently holds
/// nothing priced, since there is nothing to mirror.
pub fn build_target_portfolio(
    chosen: &RankedTrader,
    threshold: Decimal,
    holdings: &Portfolio,
    user: &UserRiskProfile,
) -> Option<TargetPortfolio> {
    let total = holdings.total_value_usd();
    if total <= Decimal::ZERO {
        return None;
    }

    let mut allocations: Vec<Allocation> = holdings
        .positions
        .iter()
        .filter(|p| p.estimated_usd_value > Decimal::ZERO)
        .map(|p| Allocation {
            symbol: p.symbol.clone(),
            mint: p.mint.clone(),
            target_percent: p.estimated_usd_value / total * Decimal::from(100),
        })
        .collect();
    if allocations.is_empty() {
        return None;
    }

    // Proportional percentages can land a hair off 100 after rounding; fold the residual
    // into the largest allocation so invariant 6 (spec §8: allocations sum to 100) holds.
    let sum: Decimal = allocations.iter().map(|a| a.target_percent).sum();
    if let Some(biggest) = allocations
        .iter_mut()
        .max_by(|a, b| a.target_percent.cmp(&b.target_percent))
    {
        biggest.target_percent += Decimal::from(100) - sum;
    }

    Some(TargetPortfolio {
        selected_trader_wallet: chosen.wallet.clone(),
        rank: chosen.rank,
        trust_score: chosen.trust_score,
        trust_score_threshold: threshold,
        allocations,
        user_id: user.user_id,
        user_vault_address: user.vault_address.clone(),
        user_risk_profile: user.risk_profile,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Eligibility, HoldingPosition, NormalizedTriple, PerformanceBreakdown, RiskProfile};
    use rust_decimal_macros::dec;

    fn holdings(positions: Vec<(&str, &str, Decimal)>) -> Portfolio {
        Portfolio {
            vault_address: "trader_wallet".to_string(),
            slot: 1,
            positions: positions
                .into_iter()
                .map(|(mint, symbol, usd_value)| HoldingPosition {
                    mint: mint.to_string(),
                    symbol: symbol.to_string(),
                    amount: 1.0,
                    decimals: 9,
                    estimated_usd_value: usd_value,
                })
                .collect(),
        }
    }

    fn trader(rank: u32, trust_score: Decimal, sharpe: Decimal, eligible: bool) -> RankedTrader {
        RankedTrader {
            rank,
            wallet: format!("trader{rank}"),
            trust_score,
            performance_breakdown: PerformanceBreakdown {
                performance_score: Decimal::ZERO,
                risk_penalty: Decimal::ZERO,
                normalized: NormalizedTriple {
                    normalized_sharpe: sharpe,
                    normalized_roi: Decimal::ZERO,
                    normalized_drawdown: Decimal::ZERO,
                },
            },
            metrics_digest: String::new(),
            eligibility: if eligible {
                Eligibility::Eligible
            } else {
                Eligibility::NoData { reason: "x".to_string() }
            },
        }
    }

    fn user(risk_profile: RiskProfile) -> UserRiskProfile {
        UserRiskProfile {
            user_id: uuid::Uuid::new_v4(),
            wallet: "user_wallet".to_string(),
            vault_address: "vault1".to_string(),
            risk_profile,
            max_position_size_native: 1_000_000,
            active: true,
        }
    }

    #[test]
    fn selects_top_trader_above_threshold_and_confidence() {
        let traders = vec![trader(1, dec!(90), dec!(0.8), true)];
        let (chosen, threshold) =
            select_candidate(&traders, &user(RiskProfile::Conservative)).expect("should select");
        assert_eq!(chosen.wallet, "trader1");
        assert_eq!(threshold, dec!(85));
    }

    #[test]
    fn skips_user_when_no_trader_clears_threshold() {
        let traders = vec![trader(1, dec!(40), dec!(0.8), true)];
        assert!(select_candidate(&traders, &user(RiskProfile::Aggressive)).is_none());
    }

    #[test]
    fn skips_ineligible_traders_even_if_score_is_high() {
        let traders = vec![trader(1, dec!(95), dec!(0.8), false)];
        assert!(select_candidate(&traders, &user(RiskProfile::Conservative)).is_none());
    }

    #[test]
    fn target_portfolio_mirrors_trader_holdings_proportionally() {
        let traders = vec![trader(1, dec!(90), dec!(0.8), true)];
        let (chosen, threshold) =
            select_candidate(&traders, &user(RiskProfile::Conservative)).expect("should select");
        let trader_holdings = holdings(vec![
            ("mintA", "SOL", dec!(75)),
            ("mintB", "USDC", dec!(25)),
        ]);
        let target = build_target_portfolio(chosen, threshold, &trader_holdings, &user(RiskProfile::Conservative))
            .expect("trader has priced holdings");

        assert_eq!(target.selected_trader_wallet, "trader1");
        assert_eq!(target.allocations.len(), 2);
        let sum: Decimal = target.allocations.iter().map(|a| a.target_percent).sum();
        assert_eq!(sum, dec!(100));
        assert!(target.validate_allocation_sum().is_ok());
        let sol = target.allocations.iter().find(|a| a.symbol == "SOL").unwrap();
        assert_eq!(sol.mint, "mintA");
        assert_eq!(sol.target_percent, dec!(75));
    }

    #[test]
    fn no_target_portfolio_when_trader_holds_nothing_priced() {
        let traders = vec![trader(1, dec!(90), dec!(0.8), true)];
        let (chosen, threshold) =
            select_candidate(&traders, &user(RiskProfile::Conservative)).expect("should select");
        let empty = holdings(vec![]);
        assert!(build_target_portfolio(chosen, threshold, &empty, &user(RiskProfile::Conservative)).is_none());
    }
}
