//! Execution-bot entry point (Service B): boots the HSM signer, router client, idempotency
//! store, audit log, and circuit breakers, then runs the confirmation monitor and the
//! orchestrator cycle loop alongside the gateway HTTP boundary.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use parking_lot::RwLock;
use rust_decimal_macros::dec;
use tower_http::trace::TraceLayer;
use tracing::{error, info};
use xorj_copytrade::audit::AuditLog;
use xorj_copytrade::circuit_breaker::BreakerRegistry;
use xorj_copytrade::confirmation_monitor::MonitorRegistry;
use xorj_copytrade::config::ExecutionConfig;
use xorj_copytrade::executor::Executor;
use xorj_copytrade::gateway::{router, GatewayState};
use xorj_copytrade::hsm::build_signer;
use xorj_copytrade::idempotency::IdempotencyStore;
use xorj_copytrade::orchestrator::Orchestrator;
use xorj_copytrade::price_feed::{PriceFeed, PriceFeedConfig};
use xorj_copytrade::router_client::RouterClient;
use xorj_copytrade::rpc::{RateLimitedRpcClient, RpcClientConfig};
use xorj_copytrade::token_registry::symbol_to_id_map;
use xorj_copytrade::types::UserRiskProfile;
use xorj_copytrade::vault_reader::VaultReader;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = ExecutionConfig::from_env().context("loading execution-bot configuration")?;
    config.validate_production().context("production configuration check failed")?;
    info!(port = config.bind_port, production = config.production, "starting execution bot");

    let rpc = Arc::new(RateLimitedRpcClient::new(
        config.rpc_endpoint.clone(),
        RpcClientConfig {
            requests_per_second: 10,
            burst: 20,
            cache_ttl_seconds: 60,
            retry_base_delay_seconds: 1,
            max_retries: 5,
        },
    ));
    let breakers = Arc::new(BreakerRegistry::new());
    let audit = AuditLog::new(&config.audit_database_path).context("opening audit log")?;
    xorj_copytrade::audit::assert_chain_intact(&audit)
        .await
        .context("audit chain integrity check failed at startup")?;
    let idempotency = IdempotencyStore::new(&config.database_path).context("opening idempotency store")?;
    let monitor = Arc::new(MonitorRegistry::new(Arc::clone(&rpc), Arc::clone(&breakers)));

    let price_feed = Arc::new(PriceFeed::new(PriceFeedConfig {
        historical_base_url: std::env::var("PRICE_HISTORICAL_BASE_URL")
            .unwrap_or_else(|_| "https://api.coingecko.com/api/v3".to_string()),
        realtime_base_url: std::env::var("PRICE_REALTIME_BASE_URL")
            .unwrap_or_else(|_| "https://price.jup.ag/v4".to_string()),
        symbol_to_id: symbol_to_id_map(),
    }));
    let vault_reader = Arc::new(VaultReader::new(Arc::clone(&rpc), Arc::clone(&price_feed)));

    let hsm = build_signer(config.hsm_provider);
    let router_client = RouterClient::new(config.router_base_url.clone());

    let executor = Arc::new(Executor::new(
        idempotency.clone(),
        Arc::clone(&breakers),
        audit.clone(),
        hsm,
        router_client,
        Arc::clone(&rpc),
        Arc::clone(&monitor),
        config.vault_program_id.clone(),
    ));

    tokio::spawn({
        let monitor = Arc::clone(&monitor);
        async move { monitor.run().await }
    });

    let orchestrator = Arc::new(Orchestrator::new(
        config.analytics_base_url.clone(),
        config.analytics_bearer_token.clone(),
        Arc::clone(&vault_reader),
        Arc::clone(&executor),
        audit.clone(),
        dec!(1.0),
    ));

    let enabled = Arc::new(RwLock::new(!config.emergency_stop_enabled));
    let emergency_stopped = Arc::new(RwLock::new(config.emergency_stop_enabled));

    tokio::spawn({
        let orchestrator = Arc::clone(&orchestrator);
        let enabled = Arc::clone(&enabled);
        let interval_seconds = config.execution_interval_seconds;
        async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(interval_seconds.max(1)));
            loop {
                ticker.tick().await;
                if !*enabled.read() {
                    continue;
                }
                let users = load_active_users();
                if users.is_empty() {
                    continue;
                }
                orchestrator.run_cycle(users).await;
            }
        }
    });

    let gateway_state = GatewayState {
        jwt_secret: Arc::new(config.jwt_secret.clone()),
        enabled,
        emergency_stopped,
        breakers,
        monitor,
        known_wallets: Arc::new(Vec::new()),
    };

    let app = router(gateway_state).layer(TraceLayer::new_for_http());
    let addr = format!("0.0.0.0:{}", config.bind_port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding execution bot gateway to {addr}"))?;
    info!(%addr, "execution bot gateway listening");
    axum::serve(listener, app).await.context("execution bot gateway server error")?;

    Ok(())
}

/// Active users are sourced from an allowlist env var until a dedicated registration
/// endpoint and table exist; each entry is `wallet:vault:risk_profile`.
fn load_active_users() -> Vec<UserRiskProfile> {
    std::env::var("ACTIVE_USERS")
        .map(|v| {
            v.split(',')
                .filter_map(|entry| {
                    let mut parts = entry.trim().splitn(3, ':');
                    let wallet = parts.next()?.to_string();
                    let vault_address = parts.next()?.to_string();
                    let risk_profile = match parts.next()?.to_lowercase().as_str() {
                        "conservative" => xorj_copytrade::types::RiskProfile::Conservative,
                        "aggressive" => xorj_copytrade::types::RiskProfile::Aggressive,
                        _ => xorj_copytrade::types::RiskProfile::Moderate,
                    };
                    Some(UserRiskProfile {
                        user_id: uuid::Uuid::new_v4(),
                        wallet,
                        vault_address,
                        risk_profile,
                        max_position_size_native: 0,
                        active: true,
                    })
                })
                .collect()
        })
        .unwrap_or_default()
}
