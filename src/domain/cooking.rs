//! "Cooking": how far a deposit is from reward eligibility.
//!
//! A deposit becomes eligible once it has aged `COOKING_EPOCHS` full epochs.

use crate::domain::epoch::EPOCH_DURATION_SECS;
use crate::domain::{AccountDeposit, Decimal};
use serde::Serialize;

pub const COOKING_EPOCHS: u64 = 2;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CookingStatus {
    pub epochs_cooked: u64,
    /// 0, 25, 75 or 100.
    pub progress_percent: u8,
    pub is_eligible: bool,
    /// Share of the current epoch already elapsed, 0..=100.
    pub epoch_progress_percent: Decimal,
}

impl CookingStatus {
    /// `None` when there is nothing cooking.
    pub fn compute(
        current_epoch: u64,
        deposit: Option<&AccountDeposit>,
        time_remaining: u64,
    ) -> Option<Self> {
        let deposit = deposit.filter(|d| d.total_deposited.is_positive())?;

        let (epochs_cooked, progress_percent) = match current_epoch
            .checked_sub(deposit.first_deposit_epoch)
        {
            None => (0, 0),
            Some(n) if n >= COOKING_EPOCHS => (n, 100),
            Some(1) => (1, 75),
            Some(n) => (n, 25),
        };

        Some(Self {
            epochs_cooked,
            progress_percent,
            is_eligible: progress_percent == 100,
            epoch_progress_percent: epoch_progress_percent(time_remaining),
        })
    }
}

fn epoch_progress_percent(time_remaining: u64) -> Decimal {
    if time_remaining == 0 {
        return Decimal::zero();
    }
    let remaining = time_remaining.min(EPOCH_DURATION_SECS);
    let elapsed = Decimal::from(EPOCH_DURATION_SECS - remaining);
    let duration = Decimal::from(EPOCH_DURATION_SECS);
    Decimal::new((elapsed * Decimal::hundred() / duration).inner().round_dp(2))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::RiskTier;

    fn deposit(total: &str, first_epoch: u64) -> AccountDeposit {
        AccountDeposit {
            total_deposited: Decimal::from_str_canonical(total).unwrap(),
            current_balance: Decimal::from_str_canonical(total).unwrap(),
            first_deposit_epoch: first_epoch,
            last_deposit_epoch: first_epoch,
            risk_tier: RiskTier::Low,
            time_weighted_balance: Decimal::zero(),
        }
    }

    #[test]
    fn test_nothing_cooking_without_a_deposit() {
        assert_eq!(CookingStatus::compute(5, None, 100), None);
        assert_eq!(CookingStatus::compute(5, Some(&deposit("0", 1)), 100), None);
    }

    #[test]
    fn test_progress_steps_by_epoch_age() {
        let d = deposit("100", 10);
        assert_eq!(CookingStatus::compute(10, Some(&d), 0).unwrap().progress_percent, 25);
        assert_eq!(CookingStatus::compute(11, Some(&d), 0).unwrap().progress_percent, 75);
        let ready = CookingStatus::compute(14, Some(&d), 0).unwrap();
        assert_eq!(ready.progress_percent, 100);
        assert_eq!(ready.epochs_cooked, 4);
        assert!(ready.is_eligible);
    }

    #[test]
    fn test_first_deposit_epoch_ahead_of_current_is_zero() {
        let status = CookingStatus::compute(3, Some(&deposit("1", 4)), 0).unwrap();
        assert_eq!(status.progress_percent, 0);
        assert!(!status.is_eligible);
    }

    #[test]
    fn test_epoch_progress_is_elapsed_share() {
        let half = EPOCH_DURATION_SECS / 2;
        let status = CookingStatus::compute(2, Some(&deposit("1", 0)), half).unwrap();
        assert_eq!(status.epoch_progress_percent, Decimal::from(50u64));
        let done = CookingStatus::compute(2, Some(&deposit("1", 0)), 0).unwrap();
        assert_eq!(done.epoch_progress_percent, Decimal::zero());
    }
}
