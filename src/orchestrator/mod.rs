//! Execution orchestrator (spec §4.9): the execution bot's per-cycle state machine. Fetches
//! the current ranking snapshot, resolves a strategy per active user, reconciles each user's
//! vault against the target portfolio, generates trades, and executes them under the safety
//! layer. Stateless between cycles; failure at any phase is recorded and the cycle moves on
//! to the next compatible phase rather than aborting outright.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use futures::future::join_all;
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;
use tokio::sync::Semaphore;
use tracing::{error, info, warn};

use crate::audit::AuditLog;
use crate::executor::Executor;
use crate::trade_generator::{compare_portfolio, generate_trades};
use crate::strategy;
use crate::types::{DecisionContext, RankedTrader, Severity, UserRiskProfile};
use crate::vault_reader::VaultReader;

const MAX_CONCURRENT_TRADES: usize = 3;

#[derive(Debug, Deserialize)]
struct RankedTradersResponse {
    data: Vec<RankedTrader>,
}

pub struct Orchestrator {
    http: Client,
    analytics_base_url: String,
    analytics_bearer_token: String,
    vault_reader: Arc<VaultReader>,
    executor: Arc<Executor>,
    audit: AuditLog,
    max_slippage_percent: Decimal,
}

impl Orchestrator {
    pub fn new(
        analytics_base_url: String,
        analytics_bearer_token: String,
        vault_reader: Arc<VaultReader>,
        executor: Arc<Executor>,
        audit: AuditLog,
        max_slippage_percent: Decimal,
    ) -> Self {
        Self {
            http: Client::new(),
            analytics_base_url,
            analytics_bearer_token,
            vault_reader,
            executor,
            audit,
            max_slippage_percent,
        }
    }

    /// Run one full cycle. Returns the number of trades successfully submitted.
    pub async fn run_cycle(&self, users: Vec<UserRiskProfile>) -> usize {
        let cycle_id = uuid::Uuid::new_v4();
        info!(cycle_id = %cycle_id, users = users.len(), "orchestrator cycle starting");

        // Phase 1: fetch intelligence.
        let traders = match self.fetch_ranked_traders(cycle_id).await {
            Ok(traders) => traders,
            Err(e) => {
                error!(cycle_id = %cycle_id, error = %e, "failed to fetch ranked traders, aborting cycle");
                return 0;
            }
        };

        // Phase 2 is the `users` parameter (already loaded by the caller from the active-user table).
        // Phase 3: strategy selection, per user. The chosen trader's own on-chain holdings
        // drive the target allocation (spec §9) rather than a placeholder constant.
        let mut targets = Vec::new();
        for user in &users {
            let Some((chosen, threshold)) = strategy::select_candidate(&traders, user) else {
                self.audit
                    .append(
                        "strategy_skip",
                        Severity::Info,
                        Some(user.user_id),
                        Some(user.vault_address.clone()),
                        None,
                        serde_json::json!({"reason": "no trader cleared threshold/confidence"}),
                        None,
                        None,
                        None,
                        DecisionContext::default(),
                        Utc::now(),
                    )
                    .await
                    .ok();
                continue;
            };

            let trader_holdings = match self.vault_reader.read_vault_holdings(&chosen.wallet, user.user_id).await {
                Ok(portfolio) => portfolio,
                Err(e) => {
                    warn!(user_id = %user.user_id, trader = %chosen.wallet, error = %e, "failed to read trader holdings, skipping user this cycle");
                    continue;
                }
            };

            match strategy::build_target_portfolio(chosen, threshold, &trader_holdings, user) {
                Some(target) => targets.push(target),
                None => {
                    self.audit
                        .append(
                            "strategy_skip",
                            Severity::Info,
                            Some(user.user_id),
                            Some(user.vault_address.clone()),
                            None,
                            serde_json::json!({"reason": "selected trader holds nothing priced to mirror"}),
                            None,
                            None,
                            None,
                            DecisionContext::default(),
                            Utc::now(),
                        )
                        .await
                        .ok();
                }
            }
        }

        // Phase 4 + 5: reconciliation and trade generation, per user.
        let mut all_trades = Vec::new();
        for target in &targets {
            match self
                .vault_reader
                .read_vault_holdings(&target.user_vault_address, target.user_id)
                .await
            {
                Ok(portfolio) => {
                    let comparison = compare_portfolio(&portfolio, target);
                    if !comparison.rebalance_required {
                        continue;
                    }
                    let trades = generate_trades(&comparison, cycle_id, &target.user_vault_address, self.max_slippage_percent);
                    all_trades.extend(trades);
                }
                Err(e) => {
                    warn!(user_id = %target.user_id, error = %e, "vault read failed, skipping user this cycle");
                }
            }
        }

        // Phase 6: trade execution, bounded concurrency.
        let semaphore = Arc::new(Semaphore::new(MAX_CONCURRENT_TRADES));
        let executor = Arc::clone(&self.executor);
        let futures = all_trades.into_iter().map(|mut trade| {
            let semaphore = Arc::clone(&semaphore);
            let executor = Arc::clone(&executor);
            async move {
                let _permit = semaphore.acquire().await.ok()?;
                let user_public_key = trade.vault_address.clone();
                match executor.execute(&mut trade, &user_public_key).await {
                    Ok(sig) => Some(sig),
                    Err(e) => {
                        error!(trade_id = %trade.trade_id, error = %e, "trade execution failed");
                        None
                    }
                }
            }
        });

        let results = join_all(futures).await;
        let submitted = results.into_iter().flatten().count();
        info!(cycle_id = %cycle_id, submitted, "orchestrator cycle complete");
        submitted
    }

    async fn fetch_ranked_traders(&self, cycle_id: uuid::Uuid) -> anyhow::Result<Vec<RankedTrader>> {
        let started = Instant::now();
        let response = self
            .http
            .get(format!("{}/internal/ranked-traders", self.analytics_base_url))
            .bearer_auth(&self.analytics_bearer_token)
            .query(&[("limit", "500"), ("min_trust_score", "0")])
            .send()
            .await?
            .error_for_status()?;
        let parsed: RankedTradersResponse = response.json().await?;
        let latency = started.elapsed();

        self.audit
            .append(
                "intelligence_fetch",
                Severity::Info,
                None,
                None,
                None,
                serde_json::json!({
                    "cycle_id": cycle_id,
                    "count": parsed.data.len(),
                    "latency_ms": latency.as_millis() as u64,
                }),
                None,
                None,
                None,
                DecisionContext::default(),
                Utc::now(),
            )
            .await
            .ok();

        Ok(parsed.data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn module_constants_are_sane() {
        assert_eq!(MAX_CONCURRENT_TRADES, 3);
    }
}
