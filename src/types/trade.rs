use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::swap::Swap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradeType {
    Buy,
    Sell,
    Swap,
}

const STABLECOIN_SYMBOLS: &[&str] = &["USDC", "USDT"];

/// Derived, USD-enriched trade record (spec §3). Precision is 28-digit `Decimal` throughout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trade {
    pub signature: String,
    pub wallet: String,
    pub block_time: DateTime<Utc>,
    pub input_symbol: String,
    pub output_symbol: String,
    pub token_in_usd: Decimal,
    pub token_out_usd: Decimal,
    pub net_usd_change: Decimal,
    pub fee_usd: Decimal,
    pub total_cost_usd: Decimal,
    pub net_profit_usd: Decimal,
    pub trade_type: TradeType,
}

impl Trade {
    /// Enrich a parsed swap with USD legs already resolved by the price feed (§4.4).
    pub fn enrich(
        swap: &Swap,
        token_in_usd: Decimal,
        token_out_usd: Decimal,
        fee_usd: Decimal,
    ) -> Self {
        let net_usd_change = token_out_usd - token_in_usd;
        let total_cost_usd = token_in_usd + fee_usd;
        let net_profit_usd = net_usd_change - fee_usd;
        let trade_type = classify_trade_type(&swap.input.symbol, &swap.output.symbol);

        Self {
            signature: swap.signature.clone(),
            wallet: swap.wallet.clone(),
            block_time: swap.block_time,
            input_symbol: swap.input.symbol.clone(),
            output_symbol: swap.output.symbol.clone(),
            token_in_usd,
            token_out_usd,
            net_usd_change,
            fee_usd,
            total_cost_usd,
            net_profit_usd,
            trade_type,
        }
    }
}

fn classify_trade_type(input_symbol: &str, output_symbol: &str) -> TradeType {
    let input_is_stable = STABLECOIN_SYMBOLS.contains(&input_symbol);
    let output_is_stable = STABLECOIN_SYMBOLS.contains(&output_symbol);
    match (input_is_stable, output_is_stable) {
        (true, false) => TradeType::Buy,
        (false, true) => TradeType::Sell,
        _ => TradeType::Swap,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_buy_sell_swap() {
        assert_eq!(classify_trade_type("USDC", "SOL"), TradeType::Buy);
        assert_eq!(classify_trade_type("SOL", "USDT"), TradeType::Sell);
        assert_eq!(classify_trade_type("SOL", "JUP"), TradeType::Swap);
    }
}
