//! Epoch-level values: the live epoch, per-epoch reward info, vault metrics.

use crate::domain::Decimal;
use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize, Serializer};

/// Length of one epoch on chain.
pub const EPOCH_DURATION_SECS: u64 = 7 * 24 * 60 * 60;

/// The live epoch. Epoch numbers never go backwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EpochStatus {
    pub epoch_number: u64,
    /// Seconds until the epoch ends; 0 means a new epoch is due.
    pub time_remaining: u64,
    pub yield_pool: Decimal,
    pub participant_count: u64,
}

/// Reply of `calculateRewardParameters(account, epoch)`. Opaque contract values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RewardParameters {
    pub base_weight: Decimal,
    pub time_weight: Decimal,
    pub risk_multiplier: u64,
    pub total_weight: Decimal,
    pub win_probability: u64,
    pub potential_payout: Decimal,
}

/// Reward standing of one account in one epoch.
///
/// `can_claim` is never stored: it is derived from `is_eligible` and
/// `has_claimed` every time it is read or serialized.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EpochRewardInfo {
    pub epoch_number: u64,
    pub is_eligible: bool,
    pub has_claimed: bool,
    pub win_probability: u64,
    pub potential_payout: Decimal,
    pub base_weight: Decimal,
    pub time_weight: Decimal,
    pub risk_multiplier: u64,
}

impl EpochRewardInfo {
    pub fn new(
        epoch_number: u64,
        params: &RewardParameters,
        is_eligible: bool,
        has_claimed: bool,
    ) -> Self {
        Self {
            epoch_number,
            is_eligible,
            has_claimed,
            win_probability: params.win_probability,
            potential_payout: params.potential_payout,
            base_weight: params.base_weight,
            time_weight: params.time_weight,
            risk_multiplier: params.risk_multiplier,
        }
    }

    pub fn can_claim(&self) -> bool {
        self.is_eligible && !self.has_claimed
    }
}

impl Serialize for EpochRewardInfo {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut s = serializer.serialize_struct("EpochRewardInfo", 9)?;
        s.serialize_field("epochNumber", &self.epoch_number)?;
        s.serialize_field("isEligible", &self.is_eligible)?;
        s.serialize_field("hasClaimed", &self.has_claimed)?;
        s.serialize_field("canClaim", &self.can_claim())?;
        s.serialize_field("winProbability", &self.win_probability)?;
        s.serialize_field("potentialPayout", &self.potential_payout)?;
        s.serialize_field("baseWeight", &self.base_weight)?;
        s.serialize_field("timeWeight", &self.time_weight)?;
        s.serialize_field("riskMultiplier", &self.risk_multiplier)?;
        s.end()
    }
}

/// Global vault aggregate from the core vault.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VaultMetrics {
    pub total_value_locked: Decimal,
    pub total_users: u64,
    pub total_supply: Decimal,
    pub management_fee: u64,
    pub performance_fee: u64,
    pub assets_count: u64,
    pub total_principal: Decimal,
    pub total_yield_generated: Decimal,
    pub total_yield_distributed: Decimal,
}
