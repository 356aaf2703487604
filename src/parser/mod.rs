//! Swap parser (spec §4.2): extracts swap semantics from a raw `getTransaction` payload via
//! pre/post token-balance diffing, the way `original_source/.../raydium_parser.py` does it.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::warn;

use crate::types::{Swap, SwapStatus, SwapVariant, TokenLeg};

/// Typed view of the subset of `getTransaction(..., {"encoding": "jsonParsed"})` the parser
/// needs (spec §9: parse untyped wire payloads into strict structural types at the boundary).
#[derive(Debug, Clone, Deserialize)]
pub struct RawTransaction {
    #[serde(rename = "blockTime")]
    pub block_time: Option<i64>,
    pub slot: u64,
    pub meta: Option<RawMeta>,
    pub transaction: RawTxBody,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawMeta {
    pub err: Option<serde_json::Value>,
    pub fee: u64,
    #[serde(rename = "preTokenBalances", default)]
    pub pre_token_balances: Vec<RawTokenBalance>,
    #[serde(rename = "postTokenBalances", default)]
    pub post_token_balances: Vec<RawTokenBalance>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawTokenBalance {
    #[serde(rename = "accountIndex")]
    pub account_index: u32,
    pub owner: Option<String>,
    pub mint: String,
    #[serde(rename = "uiTokenAmount")]
    pub ui_token_amount: RawUiTokenAmount,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawUiTokenAmount {
    pub amount: String,
    pub decimals: u8,
    #[serde(rename = "uiAmount")]
    pub ui_amount: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawTxBody {
    pub message: RawMessage,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawMessage {
    #[serde(default)]
    pub instructions: Vec<RawInstruction>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawInstruction {
    #[serde(rename = "programId")]
    pub program_id: String,
    pub parsed: Option<serde_json::Value>,
    #[serde(default)]
    pub accounts: Vec<String>,
}

pub struct KnownProgramIds {
    pub raydium: String,
    pub jupiter: String,
    pub orca: String,
    pub serum: String,
}

impl KnownProgramIds {
    fn contains(&self, id: &str) -> bool {
        id == self.raydium || id == self.jupiter || id == self.orca || id == self.serum
    }
}

struct NetDelta {
    mint: String,
    decimals: u8,
    delta: f64,
}

/// Parse a raw transaction into a `Swap`, or `None` if it isn't a recognizable AMM swap for
/// `expected_wallet` (spec §4.2 algorithm steps 1-6).
pub fn parse_swap(
    tx: &RawTransaction,
    signature: &str,
    expected_wallet: &str,
    known_programs: &KnownProgramIds,
) -> Option<Swap> {
    let amm_instruction = tx
        .transaction
        .message
        .instructions
        .iter()
        .find(|ix| known_programs.contains(&ix.program_id))?;

    let meta = match &tx.meta {
        Some(m) => m,
        None => {
            warn!(signature, "missing tx meta, skipping parse");
            return None;
        }
    };

    let deltas = match diff_balances(meta, expected_wallet) {
        Some(d) if d.len() >= 2 => d,
        _ => {
            warn!(signature, "fewer than 2 non-zero balance deltas for wallet");
            return None;
        }
    };

    let mut input_leg: Option<NetDelta> = None;
    let mut output_leg: Option<NetDelta> = None;
    for delta in deltas {
        if delta.delta < 0.0 {
            if input_leg.is_none() {
                input_leg = Some(delta);
            }
        } else if output_leg.is_none() {
            output_leg = Some(delta);
        }
    }

    let (input, output) = match (input_leg, output_leg) {
        (Some(i), Some(o)) => (i, o),
        _ => {
            warn!(signature, "could not resolve distinct in/out legs");
            return None;
        }
    };

    if input.mint == output.mint {
        warn!(signature, "identical in/out mint, skipping parse");
        return None;
    }

    let status = if meta.err.is_some() {
        SwapStatus::Failed
    } else {
        SwapStatus::Success
    };

    let variant = classify_instruction(amm_instruction);
    let pool_id = amm_instruction.accounts.first().cloned();

    let block_time = tx
        .block_time
        .and_then(|t| DateTime::<Utc>::from_timestamp(t, 0))
        .unwrap_or_else(Utc::now);

    Some(Swap {
        signature: signature.to_string(),
        wallet: expected_wallet.to_string(),
        block_time,
        slot: tx.slot,
        status,
        variant,
        input: TokenLeg {
            mint: input.mint,
            symbol: String::new(),
            decimals: input.decimals,
            amount: input.delta.abs(),
            usd_value: None,
        },
        output: TokenLeg {
            mint: output.mint,
            symbol: String::new(),
            decimals: output.decimals,
            amount: output.delta,
            usd_value: None,
        },
        pool_id,
        amm_program_id: amm_instruction.program_id.clone(),
        fee_lamports: meta.fee,
        fee_usd: None,
        parsing_source: "pre_post_balance_diff".to_string(),
    })
}

/// Group pre/post token balances by owner, returning one net delta per mint held by
/// `wallet` that actually moved (spec §4.2 step 2).
fn diff_balances(meta: &RawMeta, wallet: &str) -> Option<Vec<NetDelta>> {
    use std::collections::HashMap;

    let mut pre: HashMap<(u32, String), f64> = HashMap::new();
    for bal in &meta.pre_token_balances {
        if bal.owner.as_deref() == Some(wallet) {
            pre.insert(
                (bal.account_index, bal.mint.clone()),
                bal.ui_token_amount.ui_amount.unwrap_or(0.0),
            );
        }
    }

    let mut deltas = Vec::new();
    let mut seen_post = std::collections::HashSet::new();
    for bal in &meta.post_token_balances {
        if bal.owner.as_deref() != Some(wallet) {
            continue;
        }
        let key = (bal.account_index, bal.mint.clone());
        seen_post.insert(key.clone());
        let before = pre.get(&key).copied().unwrap_or(0.0);
        let after = bal.ui_token_amount.ui_amount.unwrap_or(0.0);
        let delta = after - before;
        if delta.abs() > f64::EPSILON {
            deltas.push(NetDelta {
                mint: bal.mint.clone(),
                decimals: bal.ui_token_amount.decimals,
                delta,
            });
        }
    }

    // A balance that disappeared entirely post-tx (closed account) is a full negative delta.
    for (key, before) in pre.iter() {
        if !seen_post.contains(key) && *before > 0.0 {
            deltas.push(NetDelta {
                mint: key.1.clone(),
                decimals: 0,
                delta: -before,
            });
        }
    }

    if deltas.is_empty() {
        None
    } else {
        Some(deltas)
    }
}

fn classify_instruction(ix: &RawInstruction) -> SwapVariant {
    let ty = ix
        .parsed
        .as_ref()
        .and_then(|p| p.get("type"))
        .and_then(|t| t.as_str())
        .unwrap_or("");
    match ty {
        "swapBaseIn" => SwapVariant::In,
        "swapBaseOut" => SwapVariant::Out,
        "swap" => SwapVariant::Generic,
        _ => SwapVariant::Unknown,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn programs() -> KnownProgramIds {
        KnownProgramIds {
            raydium: "675kPX9MHTjS2zt1qfr1NYHuzeLXfQM9H24wFSUt1Mp8".to_string(),
            jupiter: "JUP6LkbZbjS1jKKwapdHNy74zcZ3tLUZoi5QNyVTaV4".to_string(),
            orca: "whirLbMiicVdio4qvUfM5KAg6Ct8VwpYzGff3uctyCc".to_string(),
            serum: "9xQeWvG816bUx9EPjHmaT23yvVM2ZWbrrpZb9PusVFin".to_string(),
        }
    }

    fn balance(account_index: u32, owner: &str, mint: &str, ui_amount: f64, decimals: u8) -> RawTokenBalance {
        RawTokenBalance {
            account_index,
            owner: Some(owner.to_string()),
            mint: mint.to_string(),
            ui_token_amount: RawUiTokenAmount {
                amount: (ui_amount * 10f64.powi(decimals as i32)).to_string(),
                decimals,
                ui_amount: Some(ui_amount),
            },
        }
    }

    #[test]
    fn parses_a_simple_swap() {
        let wallet = "Wa11etAddress000000000000000000000000000000";
        let tx = RawTransaction {
            block_time: Some(1_700_000_000),
            slot: 123,
            meta: Some(RawMeta {
                err: None,
                fee: 5000,
                pre_token_balances: vec![balance(0, wallet, "So11111111111111111111111111111111111111112", 10.0, 9)],
                post_token_balances: vec![
                    balance(0, wallet, "So11111111111111111111111111111111111111112", 8.0, 9),
                    balance(1, wallet, "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v", 20.0, 6),
                ],
            }),
            transaction: RawTxBody {
                message: RawMessage {
                    instructions: vec![RawInstruction {
                        program_id: "675kPX9MHTjS2zt1qfr1NYHuzeLXfQM9H24wFSUt1Mp8".to_string(),
                        parsed: Some(serde_json::json!({"type": "swapBaseIn"})),
                        accounts: vec!["Poo1Address00000000000000000000000000000000".to_string()],
                    }],
                },
            },
        };

        let sig = "a".repeat(88);
        let swap = parse_swap(&tx, &sig, wallet, &programs()).expect("should parse");
        assert_eq!(swap.input.mint, "So11111111111111111111111111111111111111112");
        assert_eq!(swap.output.mint, "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v");
        assert!((swap.input.amount - 2.0).abs() < 1e-9);
        assert!((swap.output.amount - 20.0).abs() < 1e-9);
        assert_eq!(swap.fee_lamports, 5000);
        assert!(swap.validate_invariants().is_ok());
    }

    #[test]
    fn rejects_unknown_program() {
        let wallet = "Wa11etAddress000000000000000000000000000000";
        let tx = RawTransaction {
            block_time: Some(1_700_000_000),
            slot: 1,
            meta: Some(RawMeta {
                err: None,
                fee: 0,
                pre_token_balances: vec![],
                post_token_balances: vec![],
            }),
            transaction: RawTxBody {
                message: RawMessage {
                    instructions: vec![RawInstruction {
                        program_id: "Unrelated1111111111111111111111111111111111".to_string(),
                        parsed: None,
                        accounts: vec![],
                    }],
                },
            },
        };
        assert!(parse_swap(&tx, &"b".repeat(88), wallet, &programs()).is_none());
    }
}
