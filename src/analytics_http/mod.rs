//! Analytics service HTTP boundary (spec §6). Endpoints are internal, bearer-authenticated
//! (constant-time compare against the configured key), and speak typed JSON in and out —
//! no passthrough of untyped maps past this boundary (spec §9).

use std::sync::Arc;
use std::time::Instant;

use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::AnalyticsConfig;
use crate::ingestion::ingest_wallet;
use crate::metrics::calculate_metrics;
use crate::parser::KnownProgramIds;
use crate::persistence::AnalyticsDb;
use crate::price_feed::PriceFeed;
use crate::ranking::build_snapshot;
use crate::rpc::RateLimitedRpcClient;
use crate::trust_score::score_single;
use crate::trust_score::WalletScoringInput;
use crate::types::{PerformanceMetrics, RankingSnapshot, Trade, TrustScoreResult};

#[derive(Clone)]
pub struct AnalyticsState {
    pub config: Arc<AnalyticsConfig>,
    pub db: AnalyticsDb,
    pub rpc: Arc<RateLimitedRpcClient>,
    pub known_programs: Arc<KnownProgramIds>,
    pub price_feed: Arc<PriceFeed>,
    /// Latest published ranking snapshot, refreshed by the scheduler (spec §4.7, §4.9 phase 1).
    pub latest_snapshot: Arc<RwLock<Option<RankingSnapshot>>>,
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("unauthorized")]
    Unauthorized,
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}

/// Constant-time byte comparison, independent of the stdlib's `Eq` short-circuiting, for
/// the bearer-key check (spec §6 "constant-time comparison against the configured key").
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

fn require_bearer(headers: &HeaderMap, expected: &str) -> Result<(), ApiError> {
    let header = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or(ApiError::Unauthorized)?;
    let token = header.strip_prefix("Bearer ").ok_or(ApiError::Unauthorized)?;
    if constant_time_eq(token.as_bytes(), expected.as_bytes()) {
        Ok(())
    } else {
        Err(ApiError::Unauthorized)
    }
}

pub fn router(state: AnalyticsState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/ingestion/manual", post(ingestion_manual))
        .route("/calculation/performance", post(calculation_performance))
        .route("/calculation/portfolio", post(calculation_portfolio))
        .route("/scoring/trust-score", post(scoring_trust_score))
        .route("/scoring/batch", post(scoring_batch))
        .route("/scoring/leaderboard", post(scoring_leaderboard))
        .route("/internal/ranked-traders", get(internal_ranked_traders))
        .with_state(state)
}

#[derive(Serialize)]
struct HealthResponse {
    healthy: bool,
    components: serde_json::Value,
    details: serde_json::Value,
    response_time_seconds: f64,
}

async fn health(State(state): State<AnalyticsState>) -> impl IntoResponse {
    let started = Instant::now();
    let db_ok = state.db.load_swaps("__healthcheck__").await.is_ok();
    Json(HealthResponse {
        healthy: db_ok,
        components: serde_json::json!({ "database": db_ok, "rpc_configured": true }),
        details: serde_json::json!({}),
        response_time_seconds: started.elapsed().as_secs_f64(),
    })
}

#[derive(Deserialize)]
struct IngestionManualRequest {
    wallet_addresses: Vec<String>,
    lookback_hours: Option<i64>,
}

#[derive(Serialize)]
struct IngestionManualResponse {
    success: bool,
    processed_wallets: u32,
    results: Vec<crate::ingestion::WalletIngestionStatus>,
}

async fn ingestion_manual(
    State(state): State<AnalyticsState>,
    headers: HeaderMap,
    Json(req): Json<IngestionManualRequest>,
) -> Result<Json<IngestionManualResponse>, ApiError> {
    require_bearer(&headers, &state.config.internal_api_key)?;
    if req.wallet_addresses.is_empty() {
        return Err(ApiError::BadRequest("wallet_addresses must not be empty".to_string()));
    }

    let end = Utc::now();
    let start = end - chrono::Duration::hours(req.lookback_hours.unwrap_or(24));

    // Bounded-concurrency batch over wallets (spec §4.3 "at most max_concurrent_wallets
    // wallets in flight", §4.8 fault-tolerant batch processor).
    let rpc = Arc::clone(&state.rpc);
    let known_programs = Arc::clone(&state.known_programs);
    let price_feed = Arc::clone(&state.price_feed);
    let db = state.db.clone();
    let min_trade_value_usd = state.config.min_trade_value_usd;
    let supported_tokens = state.config.supported_tokens.clone();
    let max_txs = state.config.max_transactions_per_wallet;

    let batch = crate::processor::run_batch(
        req.wallet_addresses.clone(),
        crate::processor::ProcessorConfig {
            max_concurrent: state.config.max_concurrent_workers,
            continue_on_failure: true,
            ..Default::default()
        },
        move |wallet: String| {
            let rpc = Arc::clone(&rpc);
            let known_programs = Arc::clone(&known_programs);
            let price_feed = Arc::clone(&price_feed);
            let db = db.clone();
            let supported_tokens = supported_tokens.clone();
            async move {
                let (status, swaps) = ingest_wallet(
                    &rpc,
                    &known_programs,
                    &price_feed,
                    min_trade_value_usd,
                    &supported_tokens,
                    &wallet,
                    start,
                    end,
                    max_txs,
                )
                .await;
                for swap in &swaps {
                    db.insert_swap(swap, Utc::now())
                        .await
                        .map_err(|e| format!("persisting swap {}: {e}", swap.signature))?;
                }
                info!(wallet, valid = status.valid_extracted, "manual ingestion complete");
                Ok::<_, String>(status)
            }
        },
    )
    .await;

    let results: Vec<_> = batch
        .outcomes
        .into_iter()
        .filter_map(|o| match o {
            crate::processor::ItemOutcome::Success(s) | crate::processor::ItemOutcome::Retried(s, _) => Some(s),
            _ => None,
        })
        .collect();

    Ok(Json(IngestionManualResponse {
        success: !batch.tripped,
        processed_wallets: results.len() as u32,
        results,
    }))
}

#[derive(Deserialize)]
struct SingleWalletRequest {
    wallet_addresses: Vec<String>,
    end_date: Option<DateTime<Utc>>,
}

async fn load_trades(db: &AnalyticsDb, wallet: &str) -> Result<Vec<Trade>, ApiError> {
    let swaps = db
        .load_swaps(wallet)
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    Ok(swaps
        .iter()
        .filter(|s| s.status == crate::types::SwapStatus::Success)
        .map(|s| {
            let token_in_usd = Decimal::try_from(s.input.usd_value.unwrap_or(0.0)).unwrap_or_default();
            let token_out_usd = Decimal::try_from(s.output.usd_value.unwrap_or(0.0)).unwrap_or_default();
            let fee_usd = Decimal::try_from(s.fee_usd.unwrap_or(0.0)).unwrap_or_default();
            Trade::enrich(s, token_in_usd, token_out_usd, fee_usd)
        })
        .collect())
}

async fn calculation_performance(
    State(state): State<AnalyticsState>,
    headers: HeaderMap,
    Json(req): Json<SingleWalletRequest>,
) -> Result<Json<PerformanceMetrics>, ApiError> {
    require_bearer(&headers, &state.config.internal_api_key)?;
    let wallet = req
        .wallet_addresses
        .first()
        .ok_or_else(|| ApiError::BadRequest("wallet_addresses[0] required".to_string()))?;

    let end = req.end_date.unwrap_or_else(Utc::now);
    let start = end - chrono::Duration::days(state.config.metrics_rolling_period_days as i64);
    let trades = load_trades(&state.db, wallet).await?;

    calculate_metrics(wallet, &trades, start, end, state.config.metrics_rolling_period_days)
        .map(Json)
        .ok_or_else(|| ApiError::BadRequest("no trades in window".to_string()))
}

#[derive(Deserialize)]
struct MultiWalletRequest {
    wallet_addresses: Vec<String>,
    end_date: Option<DateTime<Utc>>,
}

#[derive(Serialize)]
struct PortfolioSummaryEntry {
    wallet: String,
    total_volume_usd: Decimal,
    total_profit_usd: Decimal,
    total_trades: u32,
}

async fn calculation_portfolio(
    State(state): State<AnalyticsState>,
    headers: HeaderMap,
    Json(req): Json<MultiWalletRequest>,
) -> Result<Json<Vec<PortfolioSummaryEntry>>, ApiError> {
    require_bearer(&headers, &state.config.internal_api_key)?;
    if req.wallet_addresses.len() > 50 {
        return Err(ApiError::BadRequest("at most 50 wallet_addresses".to_string()));
    }

    let end = req.end_date.unwrap_or_else(Utc::now);
    let start = end - chrono::Duration::days(state.config.metrics_rolling_period_days as i64);
    let mut out = Vec::with_capacity(req.wallet_addresses.len());

    for wallet in &req.wallet_addresses {
        let trades = load_trades(&state.db, wallet).await?;
        if let Some(metrics) =
            calculate_metrics(wallet, &trades, start, end, state.config.metrics_rolling_period_days)
        {
            out.push(PortfolioSummaryEntry {
                wallet: wallet.clone(),
                total_volume_usd: metrics.total_volume_usd,
                total_profit_usd: metrics.total_profit_usd,
                total_trades: metrics.total_trades,
            });
        }
    }

    Ok(Json(out))
}

#[derive(Deserialize)]
struct TrustScoreRequest {
    wallet_addresses: Vec<String>,
    benchmark_wallets: Option<Vec<String>>,
    end_date: Option<DateTime<Utc>>,
}

async fn build_scoring_input(
    state: &AnalyticsState,
    wallet: &str,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Result<WalletScoringInput, ApiError> {
    let swaps: Vec<_> = state
        .db
        .load_swaps(wallet)
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?
        .into_iter()
        .filter(|s| s.block_time >= start && s.block_time < end)
        .collect();
    let trades = load_trades(&state.db, wallet).await?;
    let metrics = calculate_metrics(wallet, &trades, start, end, state.config.metrics_rolling_period_days);
    Ok(WalletScoringInput {
        wallet: wallet.to_string(),
        swaps,
        trades,
        metrics,
    })
}

async fn scoring_trust_score(
    State(state): State<AnalyticsState>,
    headers: HeaderMap,
    Json(req): Json<TrustScoreRequest>,
) -> Result<Json<TrustScoreResult>, ApiError> {
    require_bearer(&headers, &state.config.internal_api_key)?;
    let wallet = req
        .wallet_addresses
        .first()
        .ok_or_else(|| ApiError::BadRequest("wallet_addresses[0] required".to_string()))?;

    let end = req.end_date.unwrap_or_else(Utc::now);
    let start = end - chrono::Duration::days(state.config.metrics_rolling_period_days as i64);

    if let Some(benchmarks) = &req.benchmark_wallets {
        let mut inputs = Vec::with_capacity(benchmarks.len() + 1);
        inputs.push(build_scoring_input(&state, wallet, start, end).await?);
        for bench in benchmarks {
            inputs.push(build_scoring_input(&state, bench, start, end).await?);
        }
        let results = crate::trust_score::batch_score(inputs);
        return Ok(Json(results.into_iter().next().unwrap()));
    }

    let input = build_scoring_input(&state, wallet, start, end).await?;
    Ok(Json(score_single(wallet, input.swaps, input.trades, input.metrics)))
}

#[derive(Serialize)]
struct BatchScoringResponse {
    results: Vec<TrustScoreResult>,
    summary: BatchScoringSummary,
}

#[derive(Serialize)]
struct BatchScoringSummary {
    total: u32,
    eligible: u32,
}

async fn scoring_batch(
    State(state): State<AnalyticsState>,
    headers: HeaderMap,
    Json(req): Json<MultiWalletRequest>,
) -> Result<Json<BatchScoringResponse>, ApiError> {
    require_bearer(&headers, &state.config.internal_api_key)?;
    if req.wallet_addresses.len() > 50 {
        return Err(ApiError::BadRequest("at most 50 wallet_addresses".to_string()));
    }

    let end = req.end_date.unwrap_or_else(Utc::now);
    let start = end - chrono::Duration::days(state.config.metrics_rolling_period_days as i64);

    let mut inputs = Vec::with_capacity(req.wallet_addresses.len());
    for wallet in &req.wallet_addresses {
        inputs.push(build_scoring_input(&state, wallet, start, end).await?);
    }

    let results = crate::trust_score::batch_score(inputs);
    let eligible = results.iter().filter(|r| r.eligibility.is_eligible()).count() as u32;

    Ok(Json(BatchScoringResponse {
        summary: BatchScoringSummary {
            total: results.len() as u32,
            eligible,
        },
        results,
    }))
}

#[derive(Deserialize)]
struct LeaderboardRequest {
    wallet_addresses: Vec<String>,
    #[serde(default)]
    limit: Option<u32>,
    #[serde(default)]
    min_trust_score: Option<Decimal>,
    end_date: Option<DateTime<Utc>>,
}

async fn scoring_leaderboard(
    State(state): State<AnalyticsState>,
    headers: HeaderMap,
    Json(req): Json<LeaderboardRequest>,
) -> Result<Json<crate::types::RankingSnapshot>, ApiError> {
    require_bearer(&headers, &state.config.internal_api_key)?;
    if req.wallet_addresses.len() > 500 {
        return Err(ApiError::BadRequest("at most 500 wallet_addresses".to_string()));
    }
    let limit = req.limit.unwrap_or(100).min(500) as usize;
    let min_trust_score = req.min_trust_score.unwrap_or(Decimal::ZERO);

    let end = req.end_date.unwrap_or_else(Utc::now);
    let start = end - chrono::Duration::days(state.config.metrics_rolling_period_days as i64);

    let mut inputs = Vec::with_capacity(req.wallet_addresses.len());
    for wallet in &req.wallet_addresses {
        inputs.push(build_scoring_input(&state, wallet, start, end).await?);
    }

    let results = crate::trust_score::batch_score(inputs);
    let snapshot = build_snapshot(results, state.config.metrics_rolling_period_days, min_trust_score, limit);
    Ok(Json(snapshot))
}

#[derive(Deserialize)]
struct RankedTradersQuery {
    limit: Option<u32>,
    min_trust_score: Option<Decimal>,
}

#[derive(Serialize)]
struct RankedTradersResponse {
    status: &'static str,
    data: Vec<crate::types::RankedTrader>,
    meta: serde_json::Value,
}

async fn internal_ranked_traders(
    State(state): State<AnalyticsState>,
    headers: HeaderMap,
    Query(query): Query<RankedTradersQuery>,
) -> Result<Json<RankedTradersResponse>, ApiError> {
    require_bearer(&headers, &state.config.internal_api_key)?;
    let limit = query.limit.unwrap_or(100) as usize;
    let min_trust_score = query.min_trust_score.unwrap_or(Decimal::ZERO);

    let snapshot = state.latest_snapshot.read().clone();
    let data = match snapshot {
        Some(snapshot) => snapshot
            .traders
            .into_iter()
            .filter(|t| t.trust_score >= min_trust_score)
            .take(limit)
            .collect(),
        None => Vec::new(),
    };

    Ok(Json(RankedTradersResponse {
        status: "ok",
        meta: serde_json::json!({ "count": data.len() }),
        data,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constant_time_eq_rejects_mismatched_length() {
        assert!(!constant_time_eq(b"abc", b"ab"));
    }

    #[test]
    fn constant_time_eq_accepts_equal_bytes() {
        assert!(constant_time_eq(b"secret", b"secret"));
    }
}
