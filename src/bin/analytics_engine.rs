//! Analytics-engine entry point (Service A): boots the typed config, the rate-limited RPC
//! client, persistence, and the `/health`, `/ingestion/*`, `/calculation/*`, `/scoring/*`,
//! and `/internal/ranked-traders` HTTP boundary, plus the background ranking scheduler.

use std::sync::Arc;

use anyhow::{Context, Result};
use parking_lot::RwLock;
use tower_http::trace::TraceLayer;
use tracing::info;
use xorj_copytrade::analytics_http::{router, AnalyticsState};
use xorj_copytrade::config::AnalyticsConfig;
use xorj_copytrade::parser::KnownProgramIds;
use xorj_copytrade::persistence::AnalyticsDb;
use xorj_copytrade::price_feed::{PriceFeed, PriceFeedConfig};
use xorj_copytrade::rpc::{RateLimitedRpcClient, RpcClientConfig};
use xorj_copytrade::scheduler;
use xorj_copytrade::token_registry::symbol_to_id_map;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = AnalyticsConfig::from_env().context("loading analytics configuration")?;
    info!(port = config.bind_port, "starting analytics engine");

    let db = AnalyticsDb::new(&config.database_path).context("opening analytics database")?;
    let rpc = Arc::new(RateLimitedRpcClient::new(
        config.rpc_endpoint.clone(),
        RpcClientConfig {
            requests_per_second: config.rpc_requests_per_second,
            burst: config.rpc_burst_limit,
            cache_ttl_seconds: config.rpc_cache_ttl_seconds,
            retry_base_delay_seconds: config.rpc_retry_delay_seconds,
            max_retries: config.rpc_max_retries,
        },
    ));
    let known_programs = Arc::new(KnownProgramIds {
        raydium: config.raydium_program_id.clone(),
        jupiter: config.jupiter_program_id.clone(),
        orca: config.orca_program_id.clone(),
        serum: config.serum_program_id.clone(),
    });
    let price_feed = Arc::new(PriceFeed::new(PriceFeedConfig {
        historical_base_url: config.price_historical_base_url.clone(),
        realtime_base_url: config.price_realtime_base_url.clone(),
        symbol_to_id: symbol_to_id_map(),
    }));

    let state = AnalyticsState {
        config: Arc::new(config.clone()),
        db: db.clone(),
        rpc: Arc::clone(&rpc),
        known_programs,
        price_feed,
        latest_snapshot: Arc::new(RwLock::new(None)),
    };

    let tracked_wallets = load_tracked_wallets();
    let scheduler_state = state.clone();
    let scheduler_wallets = tracked_wallets.clone();
    tokio::spawn(async move {
        scheduler::run(scheduler_state, scheduler_wallets, 900).await;
    });

    let app = router(state).layer(TraceLayer::new_for_http());
    let addr = format!("0.0.0.0:{}", config.bind_port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding analytics engine to {addr}"))?;
    info!(%addr, "analytics engine listening");
    axum::serve(listener, app).await.context("analytics engine server error")?;

    Ok(())
}

/// Tracked wallets are sourced from an allowlist env var rather than a dedicated table: the
/// active-trader universe is managed out of band until a registration endpoint exists.
fn load_tracked_wallets() -> Vec<String> {
    std::env::var("TRACKED_WALLETS")
        .map(|v| v.split(',').map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect())
        .unwrap_or_default()
}
