use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::user::RiskProfile;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Allocation {
    pub symbol: String,
    pub mint: String,
    pub target_percent: Decimal,
}

/// `(selected_trader_wallet, rank, trust_score, trust_score_threshold, allocations, ...)` (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetPortfolio {
    pub selected_trader_wallet: String,
    pub rank: u32,
    pub trust_score: Decimal,
    pub trust_score_threshold: Decimal,
    pub allocations: Vec<Allocation>,
    pub user_id: uuid::Uuid,
    pub user_vault_address: String,
    pub user_risk_profile: RiskProfile,
}

impl TargetPortfolio {
    /// Invariant 6 (spec §8): target-allocation percentages sum to 100.
    pub fn validate_allocation_sum(&self) -> Result<(), crate::error::ValidationError> {
        let sum: Decimal = self.allocations.iter().map(|a| a.target_percent).sum();
        let delta = (sum - Decimal::from(100)).abs();
        if delta > Decimal::new(1, 2) {
            return Err(crate::error::ValidationError::AllocationSumMismatch {
                sum: sum.to_f64().unwrap_or(0.0),
            });
        }
        Ok(())
    }
}

/// Current on-chain vault composition (spec §4.10).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HoldingPosition {
    pub mint: String,
    pub symbol: String,
    pub amount: f64,
    pub decimals: u8,
    pub estimated_usd_value: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Portfolio {
    pub vault_address: String,
    pub slot: u64,
    pub positions: Vec<HoldingPosition>,
}

impl Portfolio {
    pub fn total_value_usd(&self) -> Decimal {
        self.positions.iter().map(|p| p.estimated_usd_value).sum()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetDiscrepancy {
    pub mint: String,
    pub symbol: String,
    pub current_percent: Decimal,
    pub target_percent: Decimal,
    pub current_value_usd: Decimal,
    pub target_value_usd: Decimal,
    pub delta_value_usd: Decimal,
}

/// Per-asset discrepancies plus a rebalance flag (spec §4.9 step 4).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortfolioComparison {
    pub user_id: uuid::Uuid,
    pub vault_address: String,
    pub total_value_usd: Decimal,
    pub discrepancies: Vec<AssetDiscrepancy>,
    pub rebalance_required: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradeStatus {
    Pending,
    Simulated,
    Submitted,
    Confirmed,
    Failed,
    Rejected,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwapInstruction {
    pub from_symbol: String,
    pub from_mint: String,
    pub to_symbol: String,
    pub to_mint: String,
    pub from_amount: Decimal,
    pub expected_to_amount: Decimal,
    pub minimum_to_amount: Decimal,
    pub max_slippage_percent: Decimal,
}

impl SwapInstruction {
    /// Invariant 5 (spec §8).
    pub fn validate(&self) -> Result<(), crate::error::ValidationError> {
        if self.minimum_to_amount > self.expected_to_amount {
            return Err(crate::error::ValidationError::AmountOutOfRange(
                "minimum_to_amount must not exceed expected_to_amount".into(),
            ));
        }
        if self.max_slippage_percent < Decimal::ZERO || self.max_slippage_percent > Decimal::from(50)
        {
            return Err(crate::error::ValidationError::AmountOutOfRange(
                "max_slippage_percent must be within [0, 50]".into(),
            ));
        }
        Ok(())
    }
}

/// `(trade_id, user_id, vault_address, type, swap_instruction, rationale, ...)` (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratedTrade {
    pub trade_id: String,
    pub user_id: uuid::Uuid,
    pub vault_address: String,
    pub cycle_id: uuid::Uuid,
    pub swap_instruction: SwapInstruction,
    pub rationale: String,
    pub priority: u32,
    pub status: TradeStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub tx_signature: Option<String>,
    pub block_height: Option<u64>,
    pub execution_error: Option<String>,
    pub risk_score: Decimal,
}

/// Deterministic trade id derivation used by the generator (spec §4.11 step 6).
pub fn deterministic_trade_id(user_id: &uuid::Uuid, cycle_id: &uuid::Uuid, pair_index: usize) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(user_id.as_bytes());
    hasher.update(cycle_id.as_bytes());
    hasher.update(pair_index.to_le_bytes());
    hex::encode(hasher.finalize())[..32].to_string()
}
