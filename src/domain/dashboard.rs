//! The per-account dashboard aggregate.

use crate::domain::{AccountPosition, Decimal, EpochRewardInfo, EpochStatus, RiskTier};
use serde::{Deserialize, Serialize};

/// Aggregate over position, live epoch and the reward window.
///
/// `total_claimable_rewards` and `eligible_epochs_count` are derived from
/// `recent_epochs_info`; call [`UserDashboard::recompute_totals`] after
/// editing the list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserDashboard {
    pub claimable_epochs: Vec<u64>,
    pub current_epoch: u64,
    pub time_until_next_epoch: u64,
    pub has_active_deposit: bool,
    pub risk_tier: RiskTier,
    pub total_deposited: Decimal,
    pub eligible_epochs_count: usize,
    pub recent_epochs_info: Vec<EpochRewardInfo>,
    pub total_claimable_rewards: Decimal,
    pub estimated_next_epoch_reward: Decimal,
}

impl UserDashboard {
    pub fn aggregate(
        epoch: Option<&EpochStatus>,
        position: Option<&AccountPosition>,
        claimable_epochs: Vec<u64>,
        recent_epochs_info: Vec<EpochRewardInfo>,
        estimated_next_epoch_reward: Decimal,
    ) -> Self {
        let mut dashboard = Self {
            claimable_epochs,
            current_epoch: epoch.map(|e| e.epoch_number).unwrap_or(0),
            time_until_next_epoch: epoch.map(|e| e.time_remaining).unwrap_or(0),
            has_active_deposit: position.map(|p| p.has_active_deposit()).unwrap_or(false),
            risk_tier: position.map(|p| p.risk_tier).unwrap_or_default(),
            total_deposited: position.map(|p| p.total_deposited).unwrap_or_default(),
            eligible_epochs_count: 0,
            recent_epochs_info,
            total_claimable_rewards: Decimal::zero(),
            estimated_next_epoch_reward,
        };
        dashboard.recompute_totals();
        dashboard
    }

    pub fn recompute_totals(&mut self) {
        self.eligible_epochs_count = self
            .recent_epochs_info
            .iter()
            .filter(|e| e.is_eligible)
            .count();
        self.total_claimable_rewards = self
            .recent_epochs_info
            .iter()
            .filter(|e| e.can_claim())
            .map(|e| e.potential_payout)
            .sum();
    }

    pub fn has_claimable_epochs(&self) -> bool {
        !self.claimable_epochs.is_empty()
    }
}
