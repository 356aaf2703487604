//! Vault reader (spec §4.10): read-only on-chain snapshot of a vault's current holdings.
//! Never mutates chain state; caches briefly per `(vault, slot_bucket)`.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::Deserialize;

use crate::error::RpcError;
use crate::price_feed::PriceFeed;
use crate::rpc::RateLimitedRpcClient;
use crate::token_registry::symbol_for_mint;
use crate::types::{HoldingPosition, Portfolio};

const SLOT_BUCKET_SIZE: u64 = 10;
const CACHE_TTL: Duration = Duration::from_secs(5);

#[derive(Debug, Deserialize)]
struct ParsedTokenAccount {
    account: ParsedAccountInfo,
}

#[derive(Debug, Deserialize)]
struct ParsedAccountInfo {
    data: ParsedAccountData,
}

#[derive(Debug, Deserialize)]
struct ParsedAccountData {
    parsed: ParsedAccountInner,
}

#[derive(Debug, Deserialize)]
struct ParsedAccountInner {
    info: ParsedTokenInfo,
}

#[derive(Debug, Deserialize)]
struct ParsedTokenInfo {
    mint: String,
    #[serde(rename = "tokenAmount")]
    token_amount: ParsedTokenAmount,
}

#[derive(Debug, Deserialize)]
struct ParsedTokenAmount {
    #[serde(rename = "uiAmount")]
    ui_amount: Option<f64>,
    decimals: u8,
}

struct CacheEntry {
    portfolio: Portfolio,
    inserted_at: Instant,
}

pub struct VaultReader {
    rpc: std::sync::Arc<RateLimitedRpcClient>,
    price_feed: std::sync::Arc<PriceFeed>,
    cache: Mutex<HashMap<(String, u64), CacheEntry>>,
}

impl VaultReader {
    pub fn new(rpc: std::sync::Arc<RateLimitedRpcClient>, price_feed: std::sync::Arc<PriceFeed>) -> Self {
        Self {
            rpc,
            price_feed,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// `readVaultHoldings(vault_address, user_id) -> Portfolio` (spec §4.10). `user_id` is
    /// accepted for audit correlation by callers but does not affect the on-chain read.
    pub async fn read_vault_holdings(
        &self,
        vault_address: &str,
        _user_id: uuid::Uuid,
    ) -> Result<Portfolio, RpcError> {
        let slot = self.current_slot().await?;
        let bucket = slot / SLOT_BUCKET_SIZE;
        let key = (vault_address.to_string(), bucket);

        if let Some(entry) = self.cache.lock().get(&key) {
            if entry.inserted_at.elapsed() < CACHE_TTL {
                return Ok(entry.portfolio.clone());
            }
        }

        let params = serde_json::json!([
            vault_address,
            { "encoding": "jsonParsed", "programId": "TokenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA" }
        ]);
        let result = self.rpc.rpc("getProgramAccounts", params).await?;
        let accounts: Vec<ParsedTokenAccount> = serde_json::from_value(result).unwrap_or_default();

        let mut positions = Vec::with_capacity(accounts.len());
        for account in accounts {
            let info = account.account.data.parsed.info;
            let amount = info.token_amount.ui_amount.unwrap_or(0.0);
            if amount <= 0.0 {
                continue;
            }
            let symbol = symbol_for_mint(&info.mint);
            let quote = self
                .price_feed
                .price(&info.mint, chrono::Utc::now(), Some(symbol.as_str()))
                .await;
            let estimated_usd_value = quote
                .map(|q| rust_decimal::Decimal::try_from(q.price_usd * amount).unwrap_or_default())
                .unwrap_or_default();

            positions.push(HoldingPosition {
                mint: info.mint,
                symbol,
                amount,
                decimals: info.token_amount.decimals,
                estimated_usd_value,
            });
        }

        let portfolio = Portfolio {
            vault_address: vault_address.to_string(),
            slot,
            positions,
        };

        self.cache.lock().insert(
            key,
            CacheEntry {
                portfolio: portfolio.clone(),
                inserted_at: Instant::now(),
            },
        );

        Ok(portfolio)
    }

    async fn current_slot(&self) -> Result<u64, RpcError> {
        let result = self.rpc.rpc("getSlot", serde_json::json!([])).await?;
        result
            .as_u64()
            .ok_or_else(|| RpcError::Fatal("getSlot returned a non-integer".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn portfolio_total_value_sums_positions() {
        let portfolio = Portfolio {
            vault_address: "v1".to_string(),
            slot: 100,
            positions: vec![
                HoldingPosition {
                    mint: "a".to_string(),
                    symbol: "SOL".to_string(),
                    amount: 1.0,
                    decimals: 9,
                    estimated_usd_value: rust_decimal::Decimal::from(100),
                },
                HoldingPosition {
                    mint: "b".to_string(),
                    symbol: "USDC".to_string(),
                    amount: 50.0,
                    decimals: 6,
                    estimated_usd_value: rust_decimal::Decimal::from(50),
                },
            ],
        };
        assert_eq!(portfolio.total_value_usd(), rust_decimal::Decimal::from(150));
    }
}
