//! Typed accessors over the vault data source.
//!
//! Every function returns a fully populated value or a [`FetchError`]
//! naming the query that failed. Falling back to cached values is the
//! caller's decision.

use crate::datasource::{DataSourceError, VaultDataSource};
use crate::domain::{
    AccountDeposit, AccountPosition, Address, Decimal, EpochRewardInfo, EpochStatus,
    UserDashboard, VaultMetrics,
};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

pub const DEFAULT_MAX_REWARD_EPOCHS: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchTarget {
    EpochStatus,
    VaultMetrics,
    Position,
    Deposit,
    ClaimableEpochs,
    RewardInfo(u64),
}

impl fmt::Display for FetchTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchTarget::EpochStatus => write!(f, "epoch status"),
            FetchTarget::VaultMetrics => write!(f, "vault metrics"),
            FetchTarget::Position => write!(f, "account position"),
            FetchTarget::Deposit => write!(f, "account deposit"),
            FetchTarget::ClaimableEpochs => write!(f, "claimable epochs"),
            FetchTarget::RewardInfo(epoch) => write!(f, "reward info for epoch {}", epoch),
        }
    }
}

#[derive(Debug, Clone, Error)]
#[error("failed to fetch {target}: {source}")]
pub struct FetchError {
    pub target: FetchTarget,
    pub source: DataSourceError,
}

impl FetchError {
    fn new(target: FetchTarget) -> impl FnOnce(DataSourceError) -> Self {
        move |source| Self { target, source }
    }
}

#[derive(Debug, Clone)]
pub struct Fetcher {
    source: Arc<dyn VaultDataSource>,
    max_reward_epochs: usize,
}

impl Fetcher {
    pub fn new(source: Arc<dyn VaultDataSource>, max_reward_epochs: usize) -> Self {
        Self {
            source,
            max_reward_epochs: max_reward_epochs.max(1),
        }
    }

    pub fn source(&self) -> &Arc<dyn VaultDataSource> {
        &self.source
    }

    pub fn max_reward_epochs(&self) -> usize {
        self.max_reward_epochs
    }

    pub async fn fetch_epoch_status(&self) -> Result<EpochStatus, FetchError> {
        self.source
            .get_epoch_status()
            .await
            .map_err(FetchError::new(FetchTarget::EpochStatus))
    }

    pub async fn fetch_vault_metrics(&self) -> Result<VaultMetrics, FetchError> {
        self.source
            .get_vault_metrics()
            .await
            .map_err(FetchError::new(FetchTarget::VaultMetrics))
    }

    pub async fn fetch_position(&self, account: &Address) -> Result<AccountPosition, FetchError> {
        self.source
            .get_account_position(account)
            .await
            .map_err(FetchError::new(FetchTarget::Position))
    }

    pub async fn fetch_deposit(&self, account: &Address) -> Result<AccountDeposit, FetchError> {
        self.source
            .get_account_deposit(account)
            .await
            .map_err(FetchError::new(FetchTarget::Deposit))
    }

    pub async fn fetch_claimable_epochs(&self, account: &Address) -> Result<Vec<u64>, FetchError> {
        self.source
            .get_claimable_epochs(account)
            .await
            .map_err(FetchError::new(FetchTarget::ClaimableEpochs))
    }

    /// Reward parameters plus eligibility and claim flags for one epoch.
    pub async fn fetch_reward_info(
        &self,
        account: &Address,
        epoch: u64,
    ) -> Result<EpochRewardInfo, FetchError> {
        let (params, eligible, claimed) = futures::try_join!(
            self.source.get_reward_parameters(account, epoch),
            self.source.is_eligible_for_epoch(account, epoch),
            self.source.has_claimed_epoch(account, epoch),
        )
        .map_err(FetchError::new(FetchTarget::RewardInfo(epoch)))?;
        Ok(EpochRewardInfo::new(epoch, &params, eligible, claimed))
    }

    /// Build the dashboard aggregate for `account`.
    ///
    /// Only the first `max_reward_epochs` claimable epochs get reward info;
    /// the rest stay listed in `claimable_epochs` but are absent from
    /// `recent_epochs_info`. A failing epoch is skipped.
    pub async fn fetch_dashboard(
        &self,
        account: &Address,
        epoch: Option<&EpochStatus>,
        position: Option<&AccountPosition>,
    ) -> Result<UserDashboard, FetchError> {
        let claimable = self.fetch_claimable_epochs(account).await?;
        if claimable.len() > self.max_reward_epochs {
            debug!(
                "Processing {} of {} claimable epochs for {}",
                self.max_reward_epochs,
                claimable.len(),
                account
            );
        }

        let mut recent = Vec::with_capacity(claimable.len().min(self.max_reward_epochs));
        for &epoch_number in claimable.iter().take(self.max_reward_epochs) {
            match self.fetch_reward_info(account, epoch_number).await {
                Ok(info) => recent.push(info),
                Err(e) => warn!("Skipping epoch {} for {}: {}", epoch_number, account, e),
            }
        }

        let estimated = self.estimate_next_reward(account, epoch, position).await;
        Ok(UserDashboard::aggregate(
            epoch, position, claimable, recent, estimated,
        ))
    }

    async fn estimate_next_reward(
        &self,
        account: &Address,
        epoch: Option<&EpochStatus>,
        position: Option<&AccountPosition>,
    ) -> Decimal {
        let (Some(epoch), Some(position)) = (epoch, position) else {
            return Decimal::zero();
        };
        if !position.total_deposited.is_positive() {
            return Decimal::zero();
        }

        let current = epoch.epoch_number;
        let result = async {
            if !self.source.is_eligible_for_epoch(account, current).await? {
                return Ok(Decimal::zero());
            }
            let params = self.source.get_reward_parameters(account, current).await?;
            Ok::<_, DataSourceError>(params.potential_payout)
        }
        .await;

        result.unwrap_or_else(|e| {
            warn!("Failed to estimate next epoch reward for {}: {}", account, e);
            Decimal::zero()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datasource::{MockDataSource, ReadKind};
    use crate::domain::{RewardParameters, RiskTier};

    fn account() -> Address {
        Address::new("0x2222222222222222222222222222222222222222".to_string())
    }

    fn d(s: &str) -> Decimal {
        Decimal::from_str_canonical(s).unwrap()
    }

    fn params(payout: &str) -> RewardParameters {
        RewardParameters {
            base_weight: d("1"),
            time_weight: d("1"),
            risk_multiplier: 100,
            total_weight: d("2"),
            win_probability: 5000,
            potential_payout: d(payout),
        }
    }

    fn epoch(n: u64) -> EpochStatus {
        EpochStatus {
            epoch_number: n,
            time_remaining: 60,
            yield_pool: d("10"),
            participant_count: 2,
        }
    }

    fn position(total: &str) -> AccountPosition {
        AccountPosition {
            share_balance: d(total),
            last_mutation_time: 0,
            withdrawal_requested: false,
            withdrawal_available_at: 0,
            risk_tier: RiskTier::Low,
            total_deposited: d(total),
        }
    }

    #[tokio::test]
    async fn test_fetch_error_names_the_query() {
        let mock = Arc::new(MockDataSource::new());
        mock.fail_reads(ReadKind::Position);
        let fetcher = Fetcher::new(mock, 10);

        let err = fetcher.fetch_position(&account()).await.unwrap_err();
        assert_eq!(err.target, FetchTarget::Position);
        assert!(err.to_string().starts_with("failed to fetch account position"));
    }

    #[tokio::test]
    async fn test_dashboard_caps_reward_fan_out() {
        let mock = Arc::new(MockDataSource::new());
        let epochs: Vec<u64> = (1..=15).collect();
        mock.set_claimable_epochs(&account(), epochs.clone());
        for e in &epochs {
            mock.set_reward(&account(), *e, params("1"), true, false);
        }
        let fetcher = Fetcher::new(mock.clone(), 10);

        let dashboard = fetcher
            .fetch_dashboard(&account(), Some(&epoch(20)), None)
            .await
            .unwrap();

        assert_eq!(dashboard.claimable_epochs.len(), 15);
        assert_eq!(dashboard.recent_epochs_info.len(), 10);
        assert_eq!(dashboard.recent_epochs_info[9].epoch_number, 10);
        assert_eq!(dashboard.total_claimable_rewards, d("10"));
        assert_eq!(mock.calls(ReadKind::RewardParameters), 10);
    }

    #[tokio::test]
    async fn test_dashboard_skips_failing_epochs() {
        let mock = Arc::new(MockDataSource::new());
        mock.set_claimable_epochs(&account(), vec![1, 2, 3]);
        for e in 1..=3 {
            mock.set_reward(&account(), e, params("2"), true, false);
        }
        mock.fail_reward_epoch(2);
        let fetcher = Fetcher::new(mock, 10);

        let dashboard = fetcher
            .fetch_dashboard(&account(), Some(&epoch(4)), None)
            .await
            .unwrap();
        let numbers: Vec<u64> = dashboard
            .recent_epochs_info
            .iter()
            .map(|e| e.epoch_number)
            .collect();
        assert_eq!(numbers, vec![1, 3]);
        assert_eq!(dashboard.total_claimable_rewards, d("4"));
    }

    #[tokio::test]
    async fn test_dashboard_fails_when_claimable_list_fails() {
        let mock = Arc::new(MockDataSource::new());
        mock.fail_reads(ReadKind::ClaimableEpochs);
        let fetcher = Fetcher::new(mock, 10);

        let err = fetcher
            .fetch_dashboard(&account(), None, None)
            .await
            .unwrap_err();
        assert_eq!(err.target, FetchTarget::ClaimableEpochs);
    }

    #[tokio::test]
    async fn test_estimated_next_reward_requires_eligibility() {
        let mock = Arc::new(MockDataSource::new());
        mock.set_reward(&account(), 7, params("3.5"), true, false);
        let fetcher = Fetcher::new(mock.clone(), 10);

        let dashboard = fetcher
            .fetch_dashboard(&account(), Some(&epoch(7)), Some(&position("100")))
            .await
            .unwrap();
        assert_eq!(dashboard.estimated_next_epoch_reward, d("3.5"));

        mock.set_reward(&account(), 7, params("3.5"), false, false);
        let dashboard = fetcher
            .fetch_dashboard(&account(), Some(&epoch(7)), Some(&position("100")))
            .await
            .unwrap();
        assert_eq!(dashboard.estimated_next_epoch_reward, Decimal::zero());

        let dashboard = fetcher
            .fetch_dashboard(&account(), Some(&epoch(7)), Some(&position("0")))
            .await
            .unwrap();
        assert_eq!(dashboard.estimated_next_epoch_reward, Decimal::zero());
    }
}
