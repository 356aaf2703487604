//! Confirmation monitor (spec §4.16): tracks every submitted transaction independently of the
//! orchestrator cycle that created it, polling chain status on a 10s background tick and
//! classifying failures into a retry strategy.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tokio::sync::RwLock;
use tokio::time::interval;
use tracing::{error, info, warn};

use crate::circuit_breaker::BreakerRegistry;
use crate::error::RpcError;
use crate::rpc::RateLimitedRpcClient;
use crate::types::{BreakerDomain, ConfirmationErrorKind, ConfirmationRequirement, RetryStrategy, TransactionMonitor, TxState};

const TICK_INTERVAL: Duration = Duration::from_secs(10);

#[derive(Debug, Deserialize)]
struct SignatureStatusValue {
    confirmations: Option<u32>,
    err: Option<serde_json::Value>,
    #[serde(rename = "confirmationStatus")]
    confirmation_status: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SignatureStatusResult {
    value: Vec<Option<SignatureStatusValue>>,
}

pub struct MonitorRegistry {
    monitors: RwLock<HashMap<String, TransactionMonitor>>,
    rpc: Arc<RateLimitedRpcClient>,
    breakers: Arc<BreakerRegistry>,
}

impl MonitorRegistry {
    pub fn new(rpc: Arc<RateLimitedRpcClient>, breakers: Arc<BreakerRegistry>) -> Self {
        Self {
            monitors: RwLock::new(HashMap::new()),
            rpc,
            breakers,
        }
    }

    /// Register a freshly submitted transaction for tracking (spec §4.12 step 6 handoff).
    pub async fn track(&self, trade_id: String, tx_signature: String, trade_value_usd: f64, now: DateTime<Utc>) {
        let monitor = TransactionMonitor {
            trade_id: trade_id.clone(),
            tx_signature,
            submitted_at: now,
            state: TxState::Submitted,
            confirmations: 0,
            block_height: None,
            finalized: false,
            confirmation_requirement: ConfirmationRequirement::for_trade_value(trade_value_usd),
            error_count: 0,
            retry_count: 0,
            next_retry_at: None,
        };
        self.monitors.write().await.insert(trade_id, monitor);
    }

    pub async fn get(&self, trade_id: &str) -> Option<TransactionMonitor> {
        self.monitors.read().await.get(trade_id).cloned()
    }

    pub async fn all(&self) -> Vec<TransactionMonitor> {
        self.monitors.read().await.values().cloned().collect()
    }

    /// Run the 10s polling loop forever. Spawned once at startup.
    pub async fn run(self: Arc<Self>) {
        let mut ticker = interval(TICK_INTERVAL);
        loop {
            ticker.tick().await;
            if let Err(e) = self.poll_all().await {
                error!(error = %e, "confirmation monitor poll cycle failed");
            }
        }
    }

    async fn poll_all(&self) -> Result<(), RpcError> {
        let trade_ids: Vec<String> = self.monitors.read().await.keys().cloned().collect();
        let now = Utc::now();

        for trade_id in trade_ids {
            let signature = {
                let monitors = self.monitors.read().await;
                match monitors.get(&trade_id) {
                    Some(m) if !matches!(m.state, TxState::Confirmed | TxState::Finalized | TxState::Failed | TxState::Timeout) => {
                        m.tx_signature.clone()
                    }
                    _ => continue,
                }
            };

            let status = self.fetch_status(&signature).await;
            let mut monitors = self.monitors.write().await;
            let Some(monitor) = monitors.get_mut(&trade_id) else { continue };

            match status {
                Ok(Some(value)) => self.apply_status(monitor, value, now),
                Ok(None) => self.check_stuck_or_expired(monitor, now),
                Err(e) => {
                    monitor.error_count += 1;
                    self.breakers.record(BreakerDomain::ConfirmationTimeout, false, now);
                    warn!(trade_id, error = %e, "confirmation status fetch failed");
                }
            }
        }
        Ok(())
    }

    async fn fetch_status(&self, signature: &str) -> Result<Option<SignatureStatusValue>, RpcError> {
        let result = self
            .rpc
            .rpc(
                "getSignatureStatuses",
                serde_json::json!([[signature], { "searchTransactionHistory": true }]),
            )
            .await?;
        let parsed: SignatureStatusResult = serde_json::from_value(result)
            .map_err(|e| RpcError::Fatal(format!("malformed getSignatureStatuses response: {e}")))?;
        Ok(parsed.value.into_iter().next().flatten())
    }

    fn apply_status(&self, monitor: &mut TransactionMonitor, value: SignatureStatusValue, now: DateTime<Utc>) {
        if let Some(err) = value.err {
            monitor.state = TxState::Failed;
            monitor.error_count += 1;
            error!(trade_id = %monitor.trade_id, error = %err, "transaction failed on-chain");
            self.breakers.record(BreakerDomain::ConfirmationTimeout, false, now);
            return;
        }

        monitor.confirmations = value.confirmations.unwrap_or(0);
        let finalized = value.confirmation_status.as_deref() == Some("finalized");
        monitor.finalized = finalized;

        let meets_requirement = monitor.confirmations >= monitor.confirmation_requirement.min_confirmations
            && (!monitor.confirmation_requirement.require_finalization || finalized);

        if meets_requirement {
            monitor.state = if finalized { TxState::Finalized } else { TxState::Confirmed };
            info!(trade_id = %monitor.trade_id, confirmations = monitor.confirmations, "transaction confirmed");
            self.breakers.record(BreakerDomain::ConfirmationTimeout, true, now);
        } else {
            monitor.state = TxState::Pending;
            self.check_stuck_or_expired(monitor, now);
        }
    }

    fn check_stuck_or_expired(&self, monitor: &mut TransactionMonitor, now: DateTime<Utc>) {
        if monitor.is_expired(now) {
            monitor.state = TxState::Timeout;
            self.breakers.record(BreakerDomain::ConfirmationTimeout, false, now);
            return;
        }
        if monitor.is_stuck(now) {
            monitor.state = TxState::Stuck;
        }
    }
}

/// Classify an RPC/transaction-submission failure into a retry strategy (spec §4.16 table).
pub fn classify_and_retry(kind: ConfirmationErrorKind) -> RetryStrategy {
    kind.retry_strategy()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::RpcClientConfig;

    fn registry() -> MonitorRegistry {
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
        MonitorRegistry::new(Arc::new(rpc), Arc::new(BreakerRegistry::new()))
    }

    #[tokio::test]
    async fn track_registers_a_pending_monitor() {
        let registry = registry();
        registry.track("trade1".to_string(), "sig1".to_string(), 500.0, Utc::now()).await;
        let monitor = registry.get("trade1").await.unwrap();
        assert_eq!(monitor.state, TxState::Submitted);
        assert_eq!(monitor.confirmation_requirement.min_confirmations, 1);
    }

    #[test]
    fn classifies_blockhash_expired_as_replace() {
        assert_eq!(classify_and_retry(ConfirmationErrorKind::BlockhashExpired), RetryStrategy::Replace);
    }

    #[test]
    fn classifies_insufficient_funds_as_no_retry() {
        assert_eq!(classify_and_retry(ConfirmationErrorKind::InsufficientFunds), RetryStrategy::NoRetry);
    }
}
