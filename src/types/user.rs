use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskProfile {
    Conservative,
    Moderate,
    Aggressive,
}

impl RiskProfile {
    /// Trust-score threshold for strategy selection (spec §4.9).
    pub fn trust_score_threshold(&self) -> f64 {
        match self {
            RiskProfile::Conservative => 85.0,
            RiskProfile::Moderate => 70.0,
            RiskProfile::Aggressive => 55.0,
        }
    }
}

/// `(user_id, wallet, vault_address, risk_profile, max_position_size_native, active)` (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRiskProfile {
    pub user_id: uuid::Uuid,
    pub wallet: String,
    pub vault_address: String,
    pub risk_profile: RiskProfile,
    pub max_position_size_native: u64,
    pub active: bool,
}
