//! Metrics engine (spec §4.5): Net ROI, max drawdown, Sharpe, win/loss ratio over a wallet's
//! enriched trade records. All arithmetic runs in 28-digit `Decimal`; floats never enter here.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tokio::sync::Semaphore;

use crate::decimal_ext::{mean, quantize_money, quantize_ratio, stdev};
use crate::types::{PerformanceMetrics, Trade};

pub const CALCULATION_VERSION: &str = "1.0.0";

/// Bounds concurrent per-wallet metric calculations (spec §4.5, §5: "≤ 3 concurrent metric
/// calculations").
pub fn metrics_semaphore() -> Semaphore {
    Semaphore::new(3)
}

/// Compute `PerformanceMetrics` for one wallet's trades within `[start, end)`.
/// Returns `None` if no trades fall in the window (spec: metrics require data to exist).
pub fn calculate_metrics(
    wallet: &str,
    trades: &[Trade],
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    period_days: u32,
) -> Option<PerformanceMetrics> {
    let mut windowed: Vec<&Trade> = trades
        .iter()
        .filter(|t| t.block_time >= start && t.block_time < end)
        .collect();
    windowed.sort_by_key(|t| t.block_time);

    if windowed.is_empty() {
        return None;
    }

    let total_volume_usd: Decimal = windowed.iter().map(|t| t.token_in_usd).sum();
    let total_fees_usd: Decimal = windowed.iter().map(|t| t.fee_usd).sum();
    let total_profit_usd: Decimal = windowed.iter().map(|t| t.net_profit_usd).sum();

    let net_roi_percent = if total_volume_usd > Decimal::ZERO {
        quantize_ratio(total_profit_usd / total_volume_usd * dec!(100))
    } else {
        Decimal::ZERO
    };

    let maximum_drawdown_percent = quantize_ratio(max_drawdown_percent(&windowed));

    let returns: Vec<Decimal> = windowed
        .iter()
        .filter(|t| t.token_in_usd > Decimal::ZERO)
        .map(|t| t.net_profit_usd / t.token_in_usd)
        .collect();
    let sharpe_ratio = if returns.len() < 2 {
        Decimal::ZERO
    } else {
        let sd = stdev(&returns);
        if sd == Decimal::ZERO {
            Decimal::ZERO
        } else {
            quantize_ratio(mean(&returns) / sd)
        }
    };

    let winning: Vec<&&Trade> = windowed.iter().filter(|t| t.net_profit_usd > Decimal::ZERO).collect();
    let losing: Vec<&&Trade> = windowed.iter().filter(|t| t.net_profit_usd < Decimal::ZERO).collect();

    let win_loss_ratio = if losing.is_empty() {
        None
    } else {
        Some(quantize_ratio(
            Decimal::from(winning.len() as u64) / Decimal::from(losing.len() as u64),
        ))
    };

    let largest_win_usd = winning
        .iter()
        .map(|t| t.net_profit_usd)
        .max()
        .unwrap_or(Decimal::ZERO);
    let largest_loss_usd = losing
        .iter()
        .map(|t| t.net_profit_usd)
        .min()
        .unwrap_or(Decimal::ZERO);

    let avg_trade_size_usd = if windowed.is_empty() {
        Decimal::ZERO
    } else {
        quantize_money(total_volume_usd / Decimal::from(windowed.len() as u64))
    };

    let avg_holding_period_seconds = average_gap_seconds(&windowed);

    Some(PerformanceMetrics {
        wallet: wallet.to_string(),
        period_days,
        net_roi_percent,
        maximum_drawdown_percent,
        sharpe_ratio,
        win_loss_ratio,
        total_volume_usd: quantize_money(total_volume_usd),
        total_fees_usd: quantize_money(total_fees_usd),
        total_profit_usd: quantize_money(total_profit_usd),
        winning_trades: winning.len() as u32,
        losing_trades: losing.len() as u32,
        avg_trade_size_usd,
        largest_win_usd: quantize_money(largest_win_usd),
        largest_loss_usd: quantize_money(largest_loss_usd),
        avg_holding_period_seconds,
        total_trades: windowed.len() as u32,
        data_points: windowed.len() as u32,
        calculation_version: CALCULATION_VERSION.to_string(),
    })
}

/// Walk the cumulative-profit curve tracking running peak; `drawdown = peak - current`;
/// return `max(drawdowns) / peak * 100`, or 0 if peak never turns positive (spec §4.5).
fn max_drawdown_percent(trades: &[&Trade]) -> Decimal {
    let mut cumulative = Decimal::ZERO;
    let mut peak = Decimal::ZERO;
    let mut max_drawdown = Decimal::ZERO;

    for trade in trades {
        cumulative += trade.net_profit_usd;
        if cumulative > peak {
            peak = cumulative;
        }
        let drawdown = peak - cumulative;
        if drawdown > max_drawdown {
            max_drawdown = drawdown;
        }
    }

    if peak <= Decimal::ZERO {
        Decimal::ZERO
    } else {
        max_drawdown / peak * dec!(100)
    }
}

fn average_gap_seconds(trades: &[&Trade]) -> i64 {
    if trades.len() < 2 {
        return 0;
    }
    let mut total = 0i64;
    for pair in trades.windows(2) {
        total += (pair[1].block_time - pair[0].block_time).num_seconds();
    }
    total / (trades.len() as i64 - 1)
}

/// Groups enriched trades by UTC calendar date, returning `(date, profit, volume)` buckets.
/// Used by the trust-score eligibility check for the daily-ROI-spike rule (spec §4.6).
pub fn daily_roi_buckets(trades: &[Trade]) -> Vec<(chrono::NaiveDate, Decimal, Decimal)> {
    use std::collections::BTreeMap;

    let mut buckets: BTreeMap<chrono::NaiveDate, (Decimal, Decimal)> = BTreeMap::new();
    for trade in trades {
        let date = trade.block_time.date_naive();
        let entry = buckets.entry(date).or_insert((Decimal::ZERO, Decimal::ZERO));
        entry.0 += trade.net_profit_usd;
        entry.1 += trade.token_in_usd;
    }
    buckets
        .into_iter()
        .map(|(date, (profit, volume))| (date, profit, volume))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn trade_at(day: i64, profit: Decimal, volume: Decimal) -> Trade {
        Trade {
            signature: format!("sig{day}"),
            wallet: "wallet".to_string(),
            block_time: Utc.timestamp_opt(1_700_000_000 + day * 86_400, 0).unwrap(),
            input_symbol: "USDC".to_string(),
            output_symbol: "SOL".to_string(),
            token_in_usd: volume,
            token_out_usd: volume + profit,
            net_usd_change: profit,
            fee_usd: Decimal::ZERO,
            total_cost_usd: volume,
            net_profit_usd: profit,
            trade_type: crate::types::TradeType::Buy,
        }
    }

    #[test]
    fn computes_positive_roi_and_drawdown() {
        let trades = vec![
            trade_at(0, dec!(10), dec!(100)),
            trade_at(1, dec!(-5), dec!(100)),
            trade_at(2, dec!(20), dec!(100)),
        ];
        let start = Utc.timestamp_opt(1_700_000_000 - 1, 0).unwrap();
        let end = Utc.timestamp_opt(1_700_000_000 + 10 * 86_400, 0).unwrap();
        let metrics = calculate_metrics("wallet", &trades, start, end, 90).expect("metrics");
        assert_eq!(metrics.total_trades, 3);
        assert!(metrics.net_roi_percent > Decimal::ZERO);
        assert_eq!(metrics.winning_trades, 2);
        assert_eq!(metrics.losing_trades, 1);
        assert!(metrics.maximum_drawdown_percent > Decimal::ZERO);
    }

    #[test]
    fn win_loss_ratio_is_none_without_losses() {
        let trades = vec![trade_at(0, dec!(10), dec!(100)), trade_at(1, dec!(5), dec!(100))];
        let start = Utc.timestamp_opt(1_700_000_000 - 1, 0).unwrap();
        let end = Utc.timestamp_opt(1_700_000_000 + 10 * 86_400, 0).unwrap();
        let metrics = calculate_metrics("wallet", &trades, start, end, 90).expect("metrics");
        assert!(metrics.win_loss_ratio.is_none());
        assert_eq!(metrics.win_loss_ratio_or_sentinel(), crate::decimal_ext::win_loss_sentinel());
    }

    #[test]
    fn returns_none_outside_window() {
        let trades = vec![trade_at(0, dec!(10), dec!(100))];
        let start = Utc.timestamp_opt(1_900_000_000, 0).unwrap();
        let end = Utc.timestamp_opt(1_900_100_000, 0).unwrap();
        assert!(calculate_metrics("wallet", &trades, start, end, 90).is_none());
    }
}
