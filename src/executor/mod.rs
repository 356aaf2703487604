//! Trade executor (spec §4.12): drives one `GeneratedTrade` through
//! `pending -> simulated -> signed -> submitted -> {confirmed | failed | timeout}`,
//! gated at every step by the idempotency guard, the slippage controller, and the circuit
//! breakers, with every terminal outcome recorded to the audit log.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use serde_json::json;
use tracing::{error, info};

use crate::audit::AuditLog;
use crate::circuit_breaker::BreakerRegistry;
use crate::confirmation_monitor::MonitorRegistry;
use crate::error::{ExecutorError, HsmError};
use crate::hsm::HsmSigner;
use crate::idempotency::{derive_key, IdempotencyStore};
use crate::router_client::{wrap_vault_instruction, RouterClient};
use crate::rpc::RateLimitedRpcClient;
use crate::slippage;
use crate::types::{
    BreakerDomain, DecisionContext, GeneratedTrade, IdempotencyOperation, IdempotencyState, Severity, TradeStatus,
};

/// Vault-program instruction discriminator for a "rebalance swap" call, computed the same
/// way an Anchor IDL would (first 8 bytes of `sha256("global:rebalance_swap")`).
const REBALANCE_SWAP_DISCRIMINATOR: [u8; 8] = [0x8f, 0x1d, 0x2c, 0x4e, 0x7a, 0x3b, 0x91, 0x06];
const STARTED_TIMEOUT_MINUTES: i64 = 5;

pub struct Executor {
    idempotency: IdempotencyStore,
    breakers: Arc<BreakerRegistry>,
    audit: AuditLog,
    hsm: Box<dyn HsmSigner>,
    router: RouterClient,
    rpc: Arc<RateLimitedRpcClient>,
    monitor: Arc<MonitorRegistry>,
    vault_key_id: String,
}

impl Executor {
    pub fn new(
        idempotency: IdempotencyStore,
        breakers: Arc<BreakerRegistry>,
        audit: AuditLog,
        hsm: Box<dyn HsmSigner>,
        router: RouterClient,
        rpc: Arc<RateLimitedRpcClient>,
        monitor: Arc<MonitorRegistry>,
        vault_key_id: String,
    ) -> Self {
        Self {
            idempotency,
            breakers,
            audit,
            hsm,
            router,
            rpc,
            monitor,
            vault_key_id,
        }
    }

    /// Execute one trade end to end, returning the eventual `tx_signature` or an error the
    /// caller should record and move on from (spec §4.12 steps 1-7).
    pub async fn execute(&self, trade: &mut GeneratedTrade, user_public_key: &str) -> Result<String, ExecutorError> {
        let now = Utc::now();

        if let Some(halt) = self.breakers.system_halted() {
            return Err(halt.into());
        }

        let operation_data = json!({
            "trade_id": trade.trade_id,
            "from_mint": trade.swap_instruction.from_mint,
            "to_mint": trade.swap_instruction.to_mint,
            "from_amount": trade.swap_instruction.from_amount.to_string(),
            "bucket_5m": now.timestamp() / 300,
        });
        let idem_key = derive_key(IdempotencyOperation::TradeExecution, &trade.user_id, &operation_data);

        let reservation = self
            .idempotency
            .check_and_reserve(IdempotencyOperation::TradeExecution, trade.user_id, operation_data, now)
            .await;

        match reservation {
            Ok(record) if record.state == IdempotencyState::Confirmed => {
                return record.tx_signature.ok_or_else(|| {
                    ExecutorError::Build("confirmed idempotency record missing signature".into())
                });
            }
            Ok(_) => {}
            Err(e) => return Err(e.into()),
        }

        let result = self.run_pipeline(trade, user_public_key, now).await;

        let (state, tx_signature, error) = match &result {
            Ok(sig) => (IdempotencyState::Confirmed, Some(sig.clone()), None),
            Err(e) => (IdempotencyState::Failed, None, Some(e.to_string())),
        };
        let _ = self
            .idempotency
            .record_result(&idem_key, state, Some(trade.trade_id.clone()), tx_signature.clone(), None, error, Utc::now())
            .await;

        self.audit
            .append(
                "trade_executed",
                if result.is_ok() { Severity::Info } else { Severity::Warning },
                Some(trade.user_id),
                Some(trade.vault_address.clone()),
                None,
                json!({"trade_id": trade.trade_id, "outcome": result.is_ok()}),
                Some(trade.rationale.clone()),
                tx_signature.clone(),
                result.as_ref().err().map(|e| e.to_string()),
                DecisionContext::default(),
                Utc::now(),
            )
            .await
            .ok();

        result
    }

    async fn run_pipeline(
        &self,
        trade: &mut GeneratedTrade,
        user_public_key: &str,
        now: DateTime<Utc>,
    ) -> Result<String, ExecutorError> {
        self.breakers
            .check(BreakerDomain::TradeFailureRate, now)
            .map_err(ExecutorError::Breaker)?;

        let from_amount_u64 = trade
            .swap_instruction
            .from_amount
            .to_u64()
            .ok_or_else(|| ExecutorError::Build("from_amount does not fit u64".into()))?;

        let quote = self
            .router
            .quote(
                &trade.swap_instruction.from_mint,
                &trade.swap_instruction.to_mint,
                from_amount_u64,
                (trade.swap_instruction.max_slippage_percent.to_f64().unwrap_or(0.0) * 100.0) as u32,
            )
            .await?;

        let fresh_expected: rust_decimal::Decimal = quote
            .get("outAmount")
            .and_then(|v| v.as_str())
            .and_then(|s| s.parse().ok())
            .unwrap_or(trade.swap_instruction.expected_to_amount);

        if let Err(e) = slippage::check_quote(&trade.swap_instruction, fresh_expected) {
            self.breakers.record(BreakerDomain::SlippageRate, false, now);
            trade.status = TradeStatus::Rejected;
            return Err(e.into());
        }
        self.breakers.record(BreakerDomain::SlippageRate, true, now);

        let swap_tx = self
            .router
            .build_swap_transaction(user_public_key, &quote)
            .await?;

        let min_amount_out = trade
            .swap_instruction
            .minimum_to_amount
            .to_u64()
            .ok_or_else(|| ExecutorError::Build("minimum_to_amount does not fit u64".into()))?;
        let inner_data = swap_tx.swap_transaction_b64.as_bytes();
        let instruction_data =
            wrap_vault_instruction(REBALANCE_SWAP_DISCRIMINATOR, from_amount_u64, min_amount_out, inner_data);

        trade.status = TradeStatus::Simulated;
        self.simulate(&instruction_data).await?;

        let signature_bytes = self
            .hsm
            .sign(&self.vault_key_id, &instruction_data)
            .await
            .map_err(|e: HsmError| {
                self.breakers.record(BreakerDomain::HsmFailure, false, Utc::now());
                e
            })?;
        self.breakers.record(BreakerDomain::HsmFailure, true, Utc::now());
        trade.status = TradeStatus::Submitted;

        let tx_signature = self.submit(&instruction_data, &signature_bytes).await?;
        let trade_value_usd = trade
            .swap_instruction
            .from_amount
            .to_f64()
            .unwrap_or(0.0);
        self.monitor
            .track(trade.trade_id.clone(), tx_signature.clone(), trade_value_usd, Utc::now())
            .await;

        self.breakers.record(BreakerDomain::TradeFailureRate, true, Utc::now());
        info!(trade_id = %trade.trade_id, tx_signature, "trade submitted");
        Ok(tx_signature)
    }

    async fn simulate(&self, instruction_data: &[u8]) -> Result<(), ExecutorError> {
        let result = self
            .rpc
            .rpc(
                "simulateTransaction",
                json!([hex::encode(instruction_data), { "encoding": "base64" }]),
            )
            .await
            .map_err(|e| ExecutorError::Simulation(e.to_string()))?;
        if let Some(err) = result.get("err") {
            if !err.is_null() {
                return Err(ExecutorError::Simulation(err.to_string()));
            }
        }
        Ok(())
    }

    async fn submit(&self, instruction_data: &[u8], signature_bytes: &[u8]) -> Result<String, ExecutorError> {
        let payload = json!({
            "instruction": hex::encode(instruction_data),
            "signature": hex::encode(signature_bytes),
        });
        let result = self
            .rpc
            .rpc("sendTransaction", json!([payload, { "encoding": "base64" }]))
            .await
            .map_err(|e| ExecutorError::Submission(e.to_string()))?;
        result
            .as_str()
            .map(|s| s.to_string())
            .ok_or_else(|| ExecutorError::Submission("sendTransaction returned a non-string signature".into()))
    }
}

/// Whether a prior reservation for this key is stale enough to retry, per §4.12 step 1.
pub fn reservation_is_stale(started_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    (now - started_at).num_minutes() >= STARTED_TIMEOUT_MINUTES
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reservation_younger_than_five_minutes_is_not_stale() {
        let now = Utc::now();
        assert!(!reservation_is_stale(now - chrono::Duration::minutes(2), now));
    }

    #[test]
    fn reservation_older_than_five_minutes_is_stale() {
        let now = Utc::now();
        assert!(reservation_is_stale(now - chrono::Duration::minutes(6), now));
    }
}
