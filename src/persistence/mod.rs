//! Analytics persistence (spec §6 database schemas): trader profiles, raw transactions,
//! and performance metrics history, backed by SQLite the way `vault_db.rs` is.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::types::{PerformanceMetrics, Swap};

#[derive(Debug, Clone)]
pub struct TraderProfile {
    pub trader_id: uuid::Uuid,
    pub wallet_address: String,
    pub first_seen: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub is_active: bool,
    pub total_trades: i64,
    pub total_volume_sol: f64,
    pub current_trust_score: f64,
    pub performance_rank: Option<i64>,
}

#[derive(Clone)]
pub struct AnalyticsDb {
    conn: Arc<Mutex<Connection>>,
}

impl AnalyticsDb {
    pub fn new(db_path: &str) -> Result<Self> {
        let conn = Connection::open(db_path).context("open analytics db")?;
        conn.pragma_update(None, "journal_mode", "WAL").ok();
        conn.pragma_update(None, "synchronous", "NORMAL").ok();

        conn.execute(
            "CREATE TABLE IF NOT EXISTS trader_profiles (
                trader_id TEXT PRIMARY KEY,
                wallet_address TEXT UNIQUE NOT NULL,
                first_seen INTEGER NOT NULL,
                last_activity INTEGER NOT NULL,
                is_active INTEGER NOT NULL,
                total_trades INTEGER NOT NULL,
                total_volume_sol REAL NOT NULL,
                current_trust_score REAL NOT NULL,
                performance_rank INTEGER,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            )",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_trader_profiles_trust_active
             ON trader_profiles(current_trust_score) WHERE is_active = 1",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_trader_profiles_activity
             ON trader_profiles(last_activity, is_active)",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS trader_transactions (
                transaction_id TEXT PRIMARY KEY,
                wallet_address TEXT NOT NULL,
                signature TEXT UNIQUE NOT NULL,
                block_time INTEGER NOT NULL,
                slot INTEGER NOT NULL,
                transaction_type TEXT NOT NULL,
                program_id TEXT NOT NULL,
                input_token_mint TEXT NOT NULL,
                output_token_mint TEXT NOT NULL,
                input_amount INTEGER NOT NULL,
                output_amount INTEGER NOT NULL,
                input_decimals INTEGER NOT NULL,
                output_decimals INTEGER NOT NULL,
                input_usd REAL,
                output_usd REAL,
                net_usd REAL,
                processed_at INTEGER NOT NULL,
                price_data_source TEXT,
                raw_transaction_data TEXT
            )",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_trader_transactions_wallet_time
             ON trader_transactions(wallet_address, block_time)",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS trader_performance_metrics (
                metrics_id TEXT PRIMARY KEY,
                wallet_address TEXT NOT NULL,
                calculation_date INTEGER NOT NULL,
                period_days INTEGER NOT NULL,
                total_trades INTEGER NOT NULL,
                total_volume_usd REAL NOT NULL,
                total_profit_usd REAL NOT NULL,
                net_roi_percent REAL NOT NULL,
                sharpe_ratio REAL NOT NULL,
                maximum_drawdown_percent REAL NOT NULL,
                volatility REAL,
                win_loss_ratio REAL,
                winning_trades INTEGER NOT NULL,
                losing_trades INTEGER NOT NULL,
                average_win_usd REAL,
                average_loss_usd REAL,
                largest_win_usd REAL,
                largest_loss_usd REAL,
                performance_score REAL,
                risk_penalty REAL,
                trust_score REAL,
                data_points INTEGER NOT NULL,
                calculation_version TEXT NOT NULL,
                created_at INTEGER NOT NULL
            )",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_trader_performance_metrics_wallet_date
             ON trader_performance_metrics(wallet_address, calculation_date)",
            [],
        )?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub async fn upsert_trader_profile(&self, wallet_address: &str, now: DateTime<Utc>) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO trader_profiles
                (trader_id, wallet_address, first_seen, last_activity, is_active,
                 total_trades, total_volume_sol, current_trust_score, performance_rank,
                 created_at, updated_at)
             VALUES (?1, ?2, ?3, ?3, 1, 0, 0.0, 0.0, NULL, ?3, ?3)
             ON CONFLICT(wallet_address) DO UPDATE SET
                last_activity = excluded.last_activity,
                updated_at = excluded.updated_at",
            params![
                uuid::Uuid::new_v4().to_string(),
                wallet_address,
                now.timestamp(),
            ],
        )?;
        Ok(())
    }

    pub async fn record_trust_score(
        &self,
        wallet_address: &str,
        trust_score: f64,
        rank: Option<i64>,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "UPDATE trader_profiles
             SET current_trust_score = ?1, performance_rank = ?2, updated_at = ?3
             WHERE wallet_address = ?4",
            params![trust_score, rank, now.timestamp(), wallet_address],
        )?;
        Ok(())
    }

    pub async fn insert_swap(&self, swap: &Swap, processed_at: DateTime<Utc>) -> Result<()> {
        let conn = self.conn.lock().await;
        let variant = serde_json::to_string(&swap.variant).unwrap_or_default();
        let net_usd = match (swap.input.usd_value, swap.output.usd_value) {
            (Some(i), Some(o)) => Some(o - i),
            _ => None,
        };
        conn.execute(
            "INSERT OR IGNORE INTO trader_transactions
                (transaction_id, wallet_address, signature, block_time, slot, transaction_type,
                 program_id, input_token_mint, output_token_mint, input_amount, output_amount,
                 input_decimals, output_decimals, input_usd, output_usd, net_usd, processed_at,
                 price_data_source, raw_transaction_data)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19)",
            params![
                uuid::Uuid::new_v4().to_string(),
                swap.wallet,
                swap.signature,
                swap.block_time.timestamp(),
                swap.slot as i64,
                variant,
                swap.amm_program_id,
                swap.input.mint,
                swap.output.mint,
                swap.input.amount as i64,
                swap.output.amount as i64,
                swap.input.decimals as i64,
                swap.output.decimals as i64,
                swap.input.usd_value,
                swap.output.usd_value,
                net_usd,
                processed_at.timestamp(),
                swap.parsing_source,
                serde_json::to_string(swap).unwrap_or_default(),
            ],
        )?;
        Ok(())
    }

    pub async fn load_swaps(&self, wallet_address: &str) -> Result<Vec<Swap>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare_cached(
            "SELECT raw_transaction_data FROM trader_transactions
             WHERE wallet_address = ?1 ORDER BY block_time ASC",
        )?;
        let rows = stmt.query_map(params![wallet_address], |row| row.get::<_, String>(0))?;
        let mut out = Vec::new();
        for row in rows.flatten() {
            if let Ok(swap) = serde_json::from_str::<Swap>(&row) {
                out.push(swap);
            }
        }
        Ok(out)
    }

    pub async fn insert_performance_metrics(
        &self,
        metrics: &PerformanceMetrics,
        trust_score: Option<f64>,
        performance_score: Option<f64>,
        risk_penalty: Option<f64>,
        now: DateTime<Utc>,
    ) -> Result<()> {
        use rust_decimal::prelude::ToPrimitive;
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO trader_performance_metrics
                (metrics_id, wallet_address, calculation_date, period_days, total_trades,
                 total_volume_usd, total_profit_usd, net_roi_percent, sharpe_ratio,
                 maximum_drawdown_percent, volatility, win_loss_ratio, winning_trades,
                 losing_trades, average_win_usd, average_loss_usd, largest_win_usd,
                 largest_loss_usd, performance_score, risk_penalty, trust_score, data_points,
                 calculation_version, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, NULL, ?11, ?12, ?13, ?14, ?15, ?16,
                     ?17, ?18, ?19, ?20, ?21, ?22, ?23)",
            params![
                uuid::Uuid::new_v4().to_string(),
                metrics.wallet,
                now.timestamp(),
                metrics.period_days as i64,
                metrics.total_trades as i64,
                metrics.total_volume_usd.to_f64(),
                metrics.total_profit_usd.to_f64(),
                metrics.net_roi_percent.to_f64(),
                metrics.sharpe_ratio.to_f64(),
                metrics.maximum_drawdown_percent.to_f64(),
                metrics.win_loss_ratio.and_then(|d| d.to_f64()),
                metrics.winning_trades as i64,
                metrics.losing_trades as i64,
                None::<f64>,
                None::<f64>,
                metrics.largest_win_usd.to_f64(),
                metrics.largest_loss_usd.to_f64(),
                performance_score,
                risk_penalty,
                trust_score,
                metrics.data_points as i64,
                metrics.calculation_version,
                now.timestamp(),
            ],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{SwapStatus, SwapVariant, TokenLeg};

    fn sample_swap() -> Swap {
        Swap {
            signature: "s".repeat(88),
            wallet: "wallet1".to_string(),
            block_time: Utc::now(),
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
                usd_value: Some(12.0),
            },
            pool_id: None,
            amm_program_id: "prog".to_string(),
            fee_lamports: 5000,
            fee_usd: Some(0.01),
            parsing_source: "test".to_string(),
        }
    }

    #[tokio::test]
    async fn round_trips_a_swap() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("analytics.db");
        let db = AnalyticsDb::new(path.to_str().unwrap()).unwrap();
        let swap = sample_swap();
        db.insert_swap(&swap, Utc::now()).await.unwrap();
        let loaded = db.load_swaps("wallet1").await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].signature, swap.signature);
    }

    #[tokio::test]
    async fn upserts_trader_profile_idempotently() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("analytics.db");
        let db = AnalyticsDb::new(path.to_str().unwrap()).unwrap();
        db.upsert_trader_profile("wallet1", Utc::now()).await.unwrap();
        db.upsert_trader_profile("wallet1", Utc::now()).await.unwrap();
    }
}
