use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Which side of a diffed balance a leg represents, or the instruction's classified shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SwapVariant {
    In,
    Out,
    Generic,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SwapStatus {
    Success,
    Failed,
}

/// One side of a swap (input or output token leg).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenLeg {
    pub mint: String,
    pub symbol: String,
    pub decimals: u8,
    /// Raw on-chain amount, already adjusted for decimals (i.e. a human-readable float-free
    /// integer count is avoided; this is the decoded token amount).
    pub amount: f64,
    pub usd_value: Option<f64>,
}

/// Immutable, post-parse swap record. Identity is `(signature, wallet)` (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Swap {
    pub signature: String,
    pub wallet: String,
    pub block_time: DateTime<Utc>,
    pub slot: u64,
    pub status: SwapStatus,
    pub variant: SwapVariant,
    pub input: TokenLeg,
    pub output: TokenLeg,
    pub pool_id: Option<String>,
    pub amm_program_id: String,
    /// Fee in native lamports.
    pub fee_lamports: u64,
    pub fee_usd: Option<f64>,
    pub parsing_source: String,
}

impl Swap {
    /// Structural invariants from spec §3: distinct mints, positive amounts, id-length floors.
    pub fn validate_invariants(&self) -> Result<(), ValidationError> {
        if self.input.mint == self.output.mint {
            return Err(ValidationError::IdenticalMint);
        }
        if self.input.amount <= 0.0 || self.output.amount <= 0.0 {
            return Err(ValidationError::AmountOutOfRange(
                "input/output amount must be > 0".into(),
            ));
        }
        if self.signature.len() < 64 {
            return Err(ValidationError::AmountOutOfRange(
                "signature shorter than 64 chars".into(),
            ));
        }
        if self.wallet.len() < 32 {
            return Err(ValidationError::AmountOutOfRange(
                "wallet shorter than 32 chars".into(),
            ));
        }
        Ok(())
    }

    /// Extra gating applied by `validateSwap` (§4.2): minimum USD value, amount ceiling,
    /// unsupported-mint filter. `supported_mints` is empty means "no filter configured".
    pub fn validate_business_rules(
        &self,
        min_trade_value_usd: f64,
        supported_mints: &[String],
    ) -> Result<(), ValidationError> {
        const MAX_TOKEN_AMOUNT: f64 = 1_000_000_000.0;
        if self.input.amount > MAX_TOKEN_AMOUNT || self.output.amount > MAX_TOKEN_AMOUNT {
            return Err(ValidationError::AmountOutOfRange(format!(
                "amount exceeds 10^9 token ceiling (in={}, out={})",
                self.input.amount, self.output.amount
            )));
        }
        if let Some(usd) = self.input.usd_value {
            if usd < min_trade_value_usd {
                return Err(ValidationError::BelowMinimumValue(format!(
                    "trade value {usd} below minimum {min_trade_value_usd}"
                )));
            }
        }
        if !supported_mints.is_empty() {
            if !supported_mints.contains(&self.input.mint) {
                return Err(ValidationError::UnsupportedMint(self.input.mint.clone()));
            }
            if !supported_mints.contains(&self.output.mint) {
                return Err(ValidationError::UnsupportedMint(self.output.mint.clone()));
            }
        }
        Ok(())
    }
}
