//! Analytics background scheduler: periodically re-ingests active wallets, recomputes
//! performance metrics and trust scores, and republishes the ranking snapshot consumed by
//! the execution-bot's `/internal/ranked-traders` intelligence fetch (spec §4.9 phase 1).

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::time::interval;
use tracing::{error, info};

use crate::analytics_http::AnalyticsState;
use crate::metrics::calculate_metrics;
use crate::ranking::build_snapshot;
use crate::trust_score::WalletScoringInput;

/// Runs the recompute loop forever on the configured cadence. Intended to be spawned once
/// at startup; errors for a single wallet are logged and do not abort the cycle.
pub async fn run(state: AnalyticsState, wallets: Vec<String>, period_seconds: u64) {
    let mut ticker = interval(Duration::from_secs(period_seconds.max(1)));
    loop {
        ticker.tick().await;
        if let Err(e) = recompute_once(&state, &wallets).await {
            error!(error = %e, "scheduled recompute cycle failed");
        }
    }
}

async fn recompute_once(state: &AnalyticsState, wallets: &[String]) -> anyhow::Result<()> {
    let end = Utc::now();
    let start = end - chrono::Duration::days(state.config.metrics_rolling_period_days as i64);

    let mut inputs = Vec::with_capacity(wallets.len());
    for wallet in wallets {
        let swaps: Vec<_> = state
            .db
            .load_swaps(wallet)
            .await?
            .into_iter()
            .filter(|s| s.block_time >= start && s.block_time < end)
            .collect();

        let trades: Vec<_> = swaps
            .iter()
            .filter(|s| s.status == crate::types::SwapStatus::Success)
            .map(|s| {
                use rust_decimal::Decimal;
                let token_in_usd = Decimal::try_from(s.input.usd_value.unwrap_or(0.0)).unwrap_or_default();
                let token_out_usd = Decimal::try_from(s.output.usd_value.unwrap_or(0.0)).unwrap_or_default();
                let fee_usd = Decimal::try_from(s.fee_usd.unwrap_or(0.0)).unwrap_or_default();
                crate::types::Trade::enrich(s, token_in_usd, token_out_usd, fee_usd)
            })
            .collect();

        let metrics = calculate_metrics(wallet, &trades, start, end, state.config.metrics_rolling_period_days);

        inputs.push(WalletScoringInput {
            wallet: wallet.clone(),
            swaps,
            trades,
            metrics,
        });
    }

    let results = crate::trust_score::batch_score(inputs);
    let eligible = results.iter().filter(|r| r.eligibility.is_eligible()).count();
    let snapshot = build_snapshot(results, state.config.metrics_rolling_period_days, rust_decimal::Decimal::ZERO, 500);

    info!(eligible, traders = snapshot.traders.len(), "ranking snapshot recomputed");
    *state.latest_snapshot.write() = Some(snapshot);

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AnalyticsConfig;
    use crate::parser::KnownProgramIds;
    use crate::price_feed::{PriceFeed, PriceFeedConfig};
    use crate::rpc::{RateLimitedRpcClient, RpcClientConfig};
    use parking_lot::RwLock;

    fn test_state() -> (AnalyticsState, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let db = crate::persistence::AnalyticsDb::new(dir.path().join("a.db").to_str().unwrap()).unwrap();
        let rpc = RateLimitedRpcClient::new(
            "http://localhost:1".to_string(),
            RpcClientConfig {
                requests_per_second: 10,
                burst: 20,
                cache_ttl_seconds: 60,
                retry_base_delay_seconds: 1,
                max_retries: 0,
            },
        );
        let state = AnalyticsState {
            config: Arc::new(AnalyticsConfig {
                database_path: String::new(),
                internal_api_key: "k".to_string(),
                bind_port: 0,
                rpc_requests_per_second: 10,
                rpc_burst_limit: 20,
                rpc_cache_ttl_seconds: 60,
                rpc_retry_delay_seconds: 1,
                rpc_max_retries: 0,
                rpc_endpoint: String::new(),
                max_transactions_per_wallet: 100,
                transaction_threshold: 50,
                num_samples_per_day: 24,
                metrics_rolling_period_days: 90,
                risk_free_rate_annual: 0.0,
                metrics_precision_places: 28,
                max_concurrent_workers: 10,
                task_timeout_seconds: 90,
                min_trade_value_usd: 1.0,
                supported_tokens: vec![],
                price_historical_base_url: String::new(),
                price_realtime_base_url: String::new(),
                raydium_program_id: "r".to_string(),
                jupiter_program_id: "j".to_string(),
                orca_program_id: "o".to_string(),
                serum_program_id: "s".to_string(),
            }),
            db,
            rpc: Arc::new(rpc),
            known_programs: Arc::new(KnownProgramIds {
                raydium: "r".to_string(),
                jupiter: "j".to_string(),
                orca: "o".to_string(),
                serum: "s".to_string(),
            }),
            price_feed: Arc::new(PriceFeed::new(PriceFeedConfig {
                historical_base_url: "http://localhost:1".to_string(),
                realtime_base_url: "http://localhost:1".to_string(),
                symbol_to_id: std::collections::HashMap::new(),
            })),
            latest_snapshot: Arc::new(RwLock::new(None)),
        };
        (state, dir)
    }

    #[tokio::test]
    async fn recompute_publishes_an_empty_snapshot_for_unknown_wallets() {
        let (state, _dir) = test_state();
        recompute_once(&state, &["unknown_wallet".to_string()]).await.unwrap();
        assert!(state.latest_snapshot.read().is_some());
    }
}
