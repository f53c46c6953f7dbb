//! Per-account vault state as reported by the core vault and its extension.

use crate::domain::{Decimal, RiskTier};
use serde::{Deserialize, Serialize};

/// Core-vault view of an account. Replaced wholesale on every fetch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountPosition {
    pub share_balance: Decimal,
    /// Unix seconds of the last deposit or withdrawal.
    pub last_mutation_time: u64,
    pub withdrawal_requested: bool,
    /// Unix seconds at which a requested withdrawal unlocks.
    pub withdrawal_available_at: u64,
    pub risk_tier: RiskTier,
    pub total_deposited: Decimal,
}

impl AccountPosition {
    pub fn has_active_deposit(&self) -> bool {
        self.share_balance.is_positive()
    }
}

/// Deposit-history summary, derived server-side by the vault extension.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountDeposit {
    pub total_deposited: Decimal,
    pub current_balance: Decimal,
    pub first_deposit_epoch: u64,
    pub last_deposit_epoch: u64,
    pub risk_tier: RiskTier,
    pub time_weighted_balance: Decimal,
}
