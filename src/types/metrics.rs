use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Performance metrics computed over a rolling window (default 90 days, spec §3/§4.5).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    pub wallet: String,
    pub period_days: u32,

    pub net_roi_percent: Decimal,
    pub maximum_drawdown_percent: Decimal,
    pub sharpe_ratio: Decimal,
    /// `None` encodes the "infinite" sentinel case (no losing trades). Callers that need a
    /// finite number for ranking/serialization should use `win_loss_ratio_or_sentinel`.
    pub win_loss_ratio: Option<Decimal>,

    pub total_volume_usd: Decimal,
    pub total_fees_usd: Decimal,
    pub total_profit_usd: Decimal,
    pub winning_trades: u32,
    pub losing_trades: u32,
    pub avg_trade_size_usd: Decimal,
    pub largest_win_usd: Decimal,
    pub largest_loss_usd: Decimal,
    pub avg_holding_period_seconds: i64,
    pub total_trades: u32,

    pub data_points: u32,
    pub calculation_version: String,
}

impl PerformanceMetrics {
    pub fn win_loss_ratio_or_sentinel(&self) -> Decimal {
        self.win_loss_ratio
            .unwrap_or_else(crate::decimal_ext::win_loss_sentinel)
    }
}
