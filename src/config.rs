//! Typed configuration, loaded once at startup (spec §6 Configuration table, §9 "Global
//! singletons": a single context replaces module-level globals and is injected into
//! whatever needs it, rather than each component reading the environment itself).

use anyhow::{bail, Context, Result};
use std::env;

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_string(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HsmProvider {
    AwsKms,
    AzureKeyvault,
    GoogleKms,
    HardwareHsm,
}

impl std::str::FromStr for HsmProvider {
    type Err = anyhow::Error;
    fn from_str(s: &str) -> Result<Self> {
        match s {
            "aws_kms" => Ok(Self::AwsKms),
            "azure_keyvault" => Ok(Self::AzureKeyvault),
            "google_kms" => Ok(Self::GoogleKms),
            "hardware_hsm" => Ok(Self::HardwareHsm),
            other => bail!("unknown hsm_provider '{other}'"),
        }
    }
}

/// Analytics-engine configuration (Service A).
#[derive(Debug, Clone)]
pub struct AnalyticsConfig {
    pub database_path: String,
    pub internal_api_key: String,
    pub bind_port: u16,

    pub rpc_requests_per_second: u32,
    pub rpc_burst_limit: u32,
    pub rpc_cache_ttl_seconds: u64,
    pub rpc_retry_delay_seconds: u64,
    pub rpc_max_retries: u32,
    pub rpc_endpoint: String,

    pub max_transactions_per_wallet: u32,
    pub transaction_threshold: u32,
    pub num_samples_per_day: u32,

    pub metrics_rolling_period_days: u32,
    pub risk_free_rate_annual: f64,
    pub metrics_precision_places: u32,

    pub max_concurrent_workers: usize,
    pub task_timeout_seconds: u64,

    pub min_trade_value_usd: f64,
    pub supported_tokens: Vec<String>,

    pub price_historical_base_url: String,
    pub price_realtime_base_url: String,

    pub raydium_program_id: String,
    pub jupiter_program_id: String,
    pub orca_program_id: String,
    pub serum_program_id: String,
}

impl AnalyticsConfig {
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();

        Ok(Self {
            database_path: env_string("ANALYTICS_DATABASE_PATH", "./analytics.db"),
            internal_api_key: env::var("ANALYTICS_INTERNAL_API_KEY")
                .unwrap_or_else(|_| "dev-internal-key".to_string()),
            bind_port: env_or("ANALYTICS_PORT", 8081u16),

            rpc_requests_per_second: env_or("RPC_REQUESTS_PER_SECOND", 10u32),
            rpc_burst_limit: env_or("RPC_BURST_LIMIT", 20u32),
            rpc_cache_ttl_seconds: env_or("RPC_CACHE_TTL_SECONDS", 60u64),
            rpc_retry_delay_seconds: env_or("RPC_RETRY_DELAY_SECONDS", 1u64),
            rpc_max_retries: env_or("RPC_MAX_RETRIES", 5u32),
            rpc_endpoint: env_string("RPC_ENDPOINT", "https://api.mainnet-beta.solana.com"),

            max_transactions_per_wallet: env_or("MAX_TRANSACTIONS_PER_WALLET", 5000u32),
            transaction_threshold: env_or("TRANSACTION_THRESHOLD", 50u32),
            num_samples_per_day: env_or("NUM_SAMPLES_PER_DAY", 24u32),

            metrics_rolling_period_days: env_or("METRICS_ROLLING_PERIOD_DAYS", 90u32),
            risk_free_rate_annual: env_or("RISK_FREE_RATE_ANNUAL", 0.0f64),
            metrics_precision_places: env_or("METRICS_PRECISION_PLACES", 28u32),

            max_concurrent_workers: env_or("MAX_CONCURRENT_WORKERS", 10usize),
            task_timeout_seconds: env_or("TASK_TIMEOUT_SECONDS", 90u64),

            min_trade_value_usd: env_or("MIN_TRADE_VALUE_USD", 1.0f64),
            supported_tokens: env::var("SUPPORTED_TOKENS")
                .map(|v| v.split(',').map(|s| s.trim().to_string()).collect())
                .unwrap_or_default(),

            price_historical_base_url: env_string(
                "PRICE_HISTORICAL_BASE_URL",
                "https://api.coingecko.com/api/v3",
            ),
            price_realtime_base_url: env_string("PRICE_REALTIME_BASE_URL", "https://price.jup.ag/v4"),

            raydium_program_id: env_string(
                "RAYDIUM_PROGRAM_ID",
                "675kPX9MHTjS2zt1qfr1NYHuzeLXfQM9H24wFSUt1Mp8",
            ),
            jupiter_program_id: env_string(
                "JUPITER_PROGRAM_ID",
                "JUP6LkbZbjS1jKKwapdHNy74zcZ3tLUZoi5QNyVTaV4",
            ),
            orca_program_id: env_string(
                "ORCA_PROGRAM_ID",
                "whirLbMiicVdio4qvUfM5KAg6Ct8VwpYzGff3uctyCc",
            ),
            serum_program_id: env_string(
                "SERUM_PROGRAM_ID",
                "9xQeWvG816bUx9EPjHmaT23yvVM2ZWbrrpZb9PusVFin",
            ),
        })
    }
}

/// Execution-bot configuration (Service B).
#[derive(Debug, Clone)]
pub struct ExecutionConfig {
    pub database_path: String,
    pub audit_database_path: String,
    pub analytics_base_url: String,
    pub analytics_bearer_token: String,
    pub router_base_url: String,
    pub rpc_endpoint: String,
    pub bind_port: u16,
    pub jwt_secret: String,

    pub max_trade_amount_sol: f64,
    pub max_concurrent_trades: usize,
    pub emergency_stop_enabled: bool,

    pub execution_interval_seconds: u64,
    pub hsm_provider: HsmProvider,
    pub vault_program_id: String,

    pub production: bool,
}

impl ExecutionConfig {
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();

        let hsm_provider_str = env_string("HSM_PROVIDER", "hardware_hsm");
        let hsm_provider = hsm_provider_str
            .parse()
            .context("invalid hsm_provider configuration")?;

        Ok(Self {
            database_path: env_string("EXECUTION_DATABASE_PATH", "./execution.db"),
            audit_database_path: env_string("AUDIT_DATABASE_PATH", "./audit.db"),
            analytics_base_url: env_string("ANALYTICS_BASE_URL", "http://localhost:8081"),
            analytics_bearer_token: env::var("ANALYTICS_BEARER_TOKEN")
                .unwrap_or_else(|_| "dev-internal-key".to_string()),
            router_base_url: env_string("ROUTER_BASE_URL", "http://localhost:8082"),
            rpc_endpoint: env_string("RPC_ENDPOINT", "https://api.mainnet-beta.solana.com"),
            bind_port: env_or("EXECUTION_PORT", 8090u16),
            jwt_secret: env::var("GATEWAY_JWT_SECRET")
                .unwrap_or_else(|_| "dev-gateway-secret".to_string()),

            max_trade_amount_sol: env_or("MAX_TRADE_AMOUNT_SOL", 100.0f64),
            max_concurrent_trades: env_or("MAX_CONCURRENT_TRADES", 3usize),
            emergency_stop_enabled: env_or("EMERGENCY_STOP_ENABLED", false),

            execution_interval_seconds: env_or("EXECUTION_INTERVAL_SECONDS", 300u64),
            hsm_provider,
            vault_program_id: env_string(
                "VAULT_PROGRAM_ID",
                "VauLt11111111111111111111111111111111111",
            ),

            production: env_or("PRODUCTION", false),
        })
    }

    /// Fatal-path check (spec §6 exit code 3): production must not run with placeholder secrets.
    pub fn validate_production(&self) -> Result<()> {
        if !self.production {
            return Ok(());
        }
        if self.jwt_secret == "dev-gateway-secret" {
            bail!("production config missing: GATEWAY_JWT_SECRET must be set");
        }
        if self.vault_program_id.is_empty() {
            bail!("production config missing: VAULT_PROGRAM_ID must be set");
        }
        Ok(())
    }
}
