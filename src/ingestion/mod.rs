//! Per-wallet ingestion worker (spec §4.3): paginate signatures, batch-fetch transactions,
//! parse and validate, report a per-wallet status.

use std::time::Instant;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::error::RpcError;
use crate::parser::{parse_swap, KnownProgramIds, RawTransaction};
use crate::price_feed::PriceFeed;
use crate::rpc::RateLimitedRpcClient;
use crate::token_registry::{symbol_for_mint, NATIVE_SOL_MINT};
use crate::types::Swap;

const PAGE_LIMIT: u32 = 1000;
const BATCH_SIZE: usize = 100;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletIngestionStatus {
    pub wallet: String,
    pub total_found: u32,
    pub raydium_found: u32,
    pub valid_extracted: u32,
    pub invalid: u32,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub duration_ms: u64,
    pub success: bool,
}

#[derive(Debug, Deserialize)]
struct SignatureInfo {
    signature: String,
    #[serde(rename = "blockTime")]
    block_time: Option<i64>,
}

/// Ingest one wallet's swap history in `[start, end)` (spec §4.3, §8 boundary behaviors:
/// the oldest signature at exactly `start` is included; signatures at exactly `end` are
/// excluded via strict `<`). Each structurally-valid swap is enriched with USD legs via
/// `price_feed` (§4.4) before `validateSwap`'s business-rule gate (§4.2) is applied, since
/// that gate's minimum-trade-value check only fires once USD is known.
pub async fn ingest_wallet(
    rpc: &RateLimitedRpcClient,
    known_programs: &KnownProgramIds,
    price_feed: &PriceFeed,
    min_trade_value_usd: f64,
    supported_mints: &[String],
    wallet: &str,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    max_txs: u32,
) -> (WalletIngestionStatus, Vec<Swap>) {
    let started = Instant::now();
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    let signatures = match paginate_signatures(rpc, wallet, start, end, max_txs, &mut warnings).await {
        Ok(sigs) => sigs,
        Err(e) => {
            errors.push(e.to_string());
            return (
                WalletIngestionStatus {
                    wallet: wallet.to_string(),
                    total_found: 0,
                    raydium_found: 0,
                    valid_extracted: 0,
                    invalid: 0,
                    errors,
                    warnings,
                    duration_ms: started.elapsed().as_millis() as u64,
                    success: false,
                },
                Vec::new(),
            );
        }
    };

    let total_found = signatures.len() as u32;
    let mut valid_swaps: Vec<Swap> = Vec::new();
    let mut invalid = 0u32;

    for batch in signatures.chunks(BATCH_SIZE) {
        let fetches = batch.iter().map(|sig| fetch_transaction(rpc, sig));
        let results = join_all(fetches).await;
        for (sig, raw) in batch.iter().zip(results) {
            match raw {
                Some(tx) => match parse_swap(&tx, sig, wallet, known_programs) {
                    Some(mut swap) => match swap.validate_invariants() {
                        Ok(()) => {
                            enrich_with_usd(&mut swap, price_feed).await;
                            match swap.validate_business_rules(min_trade_value_usd, supported_mints) {
                                Ok(()) => valid_swaps.push(swap),
                                Err(e) => {
                                    invalid += 1;
                                    warnings.push(format!("{sig}: {e}"));
                                }
                            }
                        }
                        Err(e) => {
                            invalid += 1;
                            warnings.push(format!("{sig}: {e}"));
                        }
                    },
                    None => invalid += 1,
                },
                None => {
                    warnings.push(format!("{sig}: transaction fetch failed"));
                }
            }
        }
    }

    let status = WalletIngestionStatus {
        wallet: wallet.to_string(),
        total_found,
        raydium_found: valid_swaps
            .iter()
            .filter(|s| s.amm_program_id == known_programs.raydium)
            .count() as u32,
        valid_extracted: valid_swaps.len() as u32,
        invalid,
        errors,
        warnings,
        duration_ms: started.elapsed().as_millis() as u64,
        success: true,
    };
    (status, valid_swaps)
}

/// Resolves symbols for both legs and fills `usd_value`/`fee_usd` from the price feed
/// (spec §4.4). Missing quotes leave the corresponding field `None` rather than zeroing it,
/// so downstream enrichment can tell "priced at zero" apart from "unpriced".
async fn enrich_with_usd(swap: &mut Swap, price_feed: &PriceFeed) {
    swap.input.symbol = symbol_for_mint(&swap.input.mint);
    swap.output.symbol = symbol_for_mint(&swap.output.mint);

    let input_quote = price_feed
        .price(&swap.input.mint, swap.block_time, Some(swap.input.symbol.as_str()))
        .await;
    let output_quote = price_feed
        .price(&swap.output.mint, swap.block_time, Some(swap.output.symbol.as_str()))
        .await;

    swap.input.usd_value = input_quote.map(|q| q.price_usd * swap.input.amount);
    swap.output.usd_value = output_quote.map(|q| q.price_usd * swap.output.amount);

    let sol_quote = price_feed
        .price(NATIVE_SOL_MINT, swap.block_time, Some("SOL"))
        .await;
    swap.fee_usd = sol_quote.map(|q| q.price_usd * (swap.fee_lamports as f64 / 1_000_000_000.0));
}

async fn paginate_signatures(
    rpc: &RateLimitedRpcClient,
    wallet: &str,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    max_txs: u32,
    warnings: &mut Vec<String>,
) -> Result<Vec<String>, RpcError> {
    let mut before: Option<String> = None;
    let mut collected: Vec<String> = Vec::new();

    loop {
        let remaining = max_txs.saturating_sub(collected.len() as u32);
        if remaining == 0 {
            break;
        }
        let limit = PAGE_LIMIT.min(remaining.max(1));

        let mut params = serde_json::json!([wallet, { "limit": limit }]);
        if let Some(cursor) = &before {
            params[1]["before"] = Value::String(cursor.clone());
        }

        let result = rpc.rpc("getSignaturesForAddress", params).await?;
        let page: Vec<SignatureInfo> = serde_json::from_value(result).unwrap_or_default();
        let page_len = page.len();
        if page_len == 0 {
            break;
        }

        let mut reached_start_boundary = false;
        for info in &page {
            let block_time = info
                .block_time
                .and_then(|t| DateTime::<Utc>::from_timestamp(t, 0));
            let Some(bt) = block_time else {
                warnings.push(format!("{}: missing blockTime", info.signature));
                continue;
            };
            if bt >= end {
                continue; // strictly exclude the upper bound
            }
            if bt < start {
                reached_start_boundary = true;
                continue;
            }
            collected.push(info.signature.clone());
            if collected.len() as u32 >= max_txs {
                break;
            }
        }

        before = page.last().map(|s| s.signature.clone());
        if (page_len as u32) < limit || reached_start_boundary || collected.len() as u32 >= max_txs
        {
            break;
        }
    }

    Ok(collected)
}

async fn fetch_transaction(rpc: &RateLimitedRpcClient, signature: &str) -> Option<RawTransaction> {
    let params = serde_json::json!([
        signature,
        { "encoding": "jsonParsed", "maxSupportedTransactionVersion": 0 }
    ]);
    match rpc.rpc("getTransaction", params).await {
        Ok(value) if !value.is_null() => serde_json::from_value(value).ok(),
        Ok(_) => None,
        Err(e) => {
            warn!(signature, error = %e, "transaction fetch failed");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::price_feed::PriceFeedConfig;
    use crate::types::{SwapStatus, SwapVariant, TokenLeg};

    fn feed() -> PriceFeed {
        PriceFeed::new(PriceFeedConfig {
            historical_base_url: "http://localhost:1".to_string(),
            realtime_base_url: "http://localhost:1".to_string(),
            symbol_to_id: std::collections::HashMap::new(),
        })
    }

    fn swap() -> Swap {
        Swap {
            signature: "s".repeat(64),
            wallet: "w".repeat(32),
            block_time: Utc::now(),
            slot: 1,
            status: SwapStatus::Success,
            variant: SwapVariant::Generic,
            input: TokenLeg {
                mint: "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v".to_string(),
                symbol: String::new(),
                decimals: 6,
                amount: 100.0,
                usd_value: None,
            },
            output: TokenLeg {
                mint: "So11111111111111111111111111111111111111112".to_string(),
                symbol: String::new(),
                decimals: 9,
                amount: 2.0,
                usd_value: None,
            },
            pool_id: None,
            amm_program_id: "prog".to_string(),
            fee_lamports: 5000,
            fee_usd: None,
            parsing_source: "test".to_string(),
        }
    }

    #[tokio::test]
    async fn enrich_resolves_symbol_and_stablecoin_usd_value_without_network() {
        let mut s = swap();
        enrich_with_usd(&mut s, &feed()).await;
        assert_eq!(s.input.symbol, "USDC");
        assert_eq!(s.output.symbol, "SOL");
        assert_eq!(s.input.usd_value, Some(100.0));
    }
}
