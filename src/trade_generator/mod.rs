//! Trade generator (spec §4.11): computes the minimal ordered swap list that moves the
//! current portfolio towards a target allocation within slippage bounds. Only sizes and
//! orders trades — the executor quotes on-chain.

use chrono::Utc;
use rust_decimal::Decimal;

use crate::types::{
    deterministic_trade_id, GeneratedTrade, Portfolio, PortfolioComparison, SwapInstruction,
    TargetPortfolio, TradeStatus,
};

/// Step 1-4 of §4.11: compute per-asset discrepancies and flag whether rebalancing is
/// needed. `rebalance_required` is set when any asset's delta exceeds 1% of total value.
pub fn compare_portfolio(
    current: &Portfolio,
    target: &TargetPortfolio,
) -> PortfolioComparison {
    let total_value_usd = current.total_value_usd();
    let mut discrepancies = Vec::new();
    let mut rebalance_required = false;

    for allocation in &target.allocations {
        let current_position = current.positions.iter().find(|p| p.mint == allocation.mint);
        let current_value_usd = current_position
            .map(|p| p.estimated_usd_value)
            .unwrap_or(Decimal::ZERO);
        let current_percent = if total_value_usd > Decimal::ZERO {
            current_value_usd / total_value_usd * Decimal::from(100)
        } else {
            Decimal::ZERO
        };
        let target_value_usd = total_value_usd * allocation.target_percent / Decimal::from(100);
        let delta_value_usd = target_value_usd - current_value_usd;

        if total_value_usd > Decimal::ZERO
            && (delta_value_usd / total_value_usd).abs() > Decimal::new(1, 2)
        {
            rebalance_required = true;
        }

        discrepancies.push(crate::types::AssetDiscrepancy {
            mint: allocation.mint.clone(),
            symbol: allocation.symbol.clone(),
            current_percent,
            target_percent: allocation.target_percent,
            current_value_usd,
            target_value_usd,
            delta_value_usd,
        });
    }

    PortfolioComparison {
        user_id: target.user_id,
        vault_address: current.vault_address.clone(),
        total_value_usd,
        discrepancies,
        rebalance_required,
    }
}

/// Steps 4-6 of §4.11: partition into sources/sinks, greedily pair largest-with-largest,
/// assign monotonically increasing priority, and derive deterministic trade ids.
pub fn generate_trades(
    comparison: &PortfolioComparison,
    cycle_id: uuid::Uuid,
    vault_address: &str,
    max_slippage_percent: Decimal,
) -> Vec<GeneratedTrade> {
    let mut sources: Vec<&crate::types::AssetDiscrepancy> = comparison
        .discrepancies
        .iter()
        .filter(|d| d.delta_value_usd < Decimal::ZERO)
        .collect();
    let mut sinks: Vec<&crate::types::AssetDiscrepancy> = comparison
        .discrepancies
        .iter()
        .filter(|d| d.delta_value_usd > Decimal::ZERO)
        .collect();

    sources.sort_by(|a, b| a.delta_value_usd.cmp(&b.delta_value_usd));
    sinks.sort_by(|a, b| b.delta_value_usd.cmp(&a.delta_value_usd));

    let now = Utc::now();
    let mut trades = Vec::new();

    for (pair_index, (source, sink)) in sources.iter().zip(sinks.iter()).enumerate() {
        let from_amount = source.delta_value_usd.abs();
        let expected_to_amount = sink.delta_value_usd.min(from_amount);
        let slippage_factor = Decimal::ONE - max_slippage_percent / Decimal::from(100);
        let minimum_to_amount = expected_to_amount * slippage_factor;

        let swap_instruction = SwapInstruction {
            from_symbol: source.symbol.clone(),
            from_mint: source.mint.clone(),
            to_symbol: sink.symbol.clone(),
            to_mint: sink.mint.clone(),
            from_amount,
            expected_to_amount,
            minimum_to_amount,
            max_slippage_percent,
        };

        trades.push(GeneratedTrade {
            trade_id: deterministic_trade_id(&comparison.user_id, &cycle_id, pair_index),
            user_id: comparison.user_id,
            vault_address: vault_address.to_string(),
            cycle_id,
            swap_instruction,
            rationale: format!(
                "rebalance {} -> {} to realize target allocation",
                source.symbol, sink.symbol
            ),
            priority: pair_index as u32,
            status: TradeStatus::Pending,
            created_at: now,
            updated_at: now,
            tx_signature: None,
            block_height: None,
            execution_error: None,
            risk_score: Decimal::ZERO,
        });
    }

    trades
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Allocation, HoldingPosition, RiskProfile};
    use rust_decimal_macros::dec;

    fn portfolio() -> Portfolio {
        Portfolio {
            vault_address: "vault1".to_string(),
            slot: 1,
            positions: vec![
                HoldingPosition {
                    mint: "USDC".to_string(),
                    symbol: "USDC".to_string(),
                    amount: 1000.0,
                    decimals: 6,
                    estimated_usd_value: dec!(1000),
                },
                HoldingPosition {
                    mint: "SOL".to_string(),
                    symbol: "SOL".to_string(),
                    amount: 0.0,
                    decimals: 9,
                    estimated_usd_value: dec!(0),
                },
            ],
        }
    }

    fn target() -> TargetPortfolio {
        TargetPortfolio {
            selected_trader_wallet: "trader1".to_string(),
            rank: 1,
            trust_score: dec!(90),
            trust_score_threshold: dec!(85),
            allocations: vec![
                Allocation {
                    symbol: "USDC".to_string(),
                    mint: "USDC".to_string(),
                    target_percent: dec!(50),
                },
                Allocation {
                    symbol: "SOL".to_string(),
                    mint: "SOL".to_string(),
                    target_percent: dec!(50),
                },
            ],
            user_id: uuid::Uuid::new_v4(),
            user_vault_address: "vault1".to_string(),
            user_risk_profile: RiskProfile::Moderate,
        }
    }

    #[test]
    fn flags_rebalance_when_allocation_diverges() {
        let comparison = compare_portfolio(&portfolio(), &target());
        assert!(comparison.rebalance_required);
        assert_eq!(comparison.total_value_usd, dec!(1000));
    }

    #[test]
    fn generates_one_trade_per_source_sink_pair() {
        let comparison = compare_portfolio(&portfolio(), &target());
        let trades = generate_trades(&comparison, uuid::Uuid::new_v4(), "vault1", dec!(1));
        assert_eq!(trades.len(), 1);
        assert_eq!(trades[0].swap_instruction.from_symbol, "USDC");
        assert_eq!(trades[0].swap_instruction.to_symbol, "SOL");
        assert!(trades[0].swap_instruction.validate().is_ok());
    }

    #[test]
    fn deterministic_trade_ids_are_stable_across_identical_inputs() {
        let comparison = compare_portfolio(&portfolio(), &target());
        let cycle_id = uuid::Uuid::new_v4();
        let a = generate_trades(&comparison, cycle_id, "vault1", dec!(1));
        let b = generate_trades(&comparison, cycle_id, "vault1", dec!(1));
        assert_eq!(a[0].trade_id, b[0].trade_id);
    }
}
