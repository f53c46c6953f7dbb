//! Mock data source for testing without network calls.

use super::{DataSourceError, MutationRequest, Settlement, TxHandle, VaultDataSource};
use crate::domain::{
    AccountDeposit, AccountPosition, Address, Decimal, EpochStatus, RewardParameters, RiskTier,
    VaultMetrics,
};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};
use tokio::sync::watch;

/// Read operations, for call counting and failure injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReadKind {
    EpochStatus,
    VaultMetrics,
    Position,
    Deposit,
    ClaimableEpochs,
    RewardParameters,
    Eligibility,
    ClaimStatus,
}

#[derive(Debug)]
struct MockState {
    epoch_status: Option<EpochStatus>,
    vault_metrics: Option<VaultMetrics>,
    positions: HashMap<Address, AccountPosition>,
    deposits: HashMap<Address, AccountDeposit>,
    claimable: HashMap<Address, Vec<u64>>,
    rewards: HashMap<(Address, u64), RewardParameters>,
    eligible: HashSet<(Address, u64)>,
    claimed: HashSet<(Address, u64)>,
    failing_reads: HashSet<ReadKind>,
    failing_reward_epochs: HashSet<u64>,
    submission_error: Option<DataSourceError>,
    settlement: Result<Settlement, DataSourceError>,
    calls: HashMap<ReadKind, usize>,
    submitted: Vec<MutationRequest>,
    next_tx: u64,
}

impl Default for MockState {
    fn default() -> Self {
        Self {
            epoch_status: None,
            vault_metrics: None,
            positions: HashMap::new(),
            deposits: HashMap::new(),
            claimable: HashMap::new(),
            rewards: HashMap::new(),
            eligible: HashSet::new(),
            claimed: HashSet::new(),
            failing_reads: HashSet::new(),
            failing_reward_epochs: HashSet::new(),
            submission_error: None,
            settlement: Ok(Settlement::Confirmed {
                block_number: Some(1),
            }),
            calls: HashMap::new(),
            submitted: Vec::new(),
            next_tx: 1,
        }
    }
}

/// In-memory vault with scripted replies.
///
/// Every setter works through `&self` so a test can keep changing the
/// remote state after handing the mock to the engine. Reads and settlements
/// can be held at a gate to simulate slow network calls.
#[derive(Debug)]
pub struct MockDataSource {
    state: Mutex<MockState>,
    read_gate: watch::Sender<bool>,
    settlement_gate: watch::Sender<bool>,
}

impl MockDataSource {
    pub fn new() -> Self {
        let (read_gate, _) = watch::channel(true);
        let (settlement_gate, _) = watch::channel(true);
        Self {
            state: Mutex::new(MockState::default()),
            read_gate,
            settlement_gate,
        }
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn with_epoch_status(self, status: EpochStatus) -> Self {
        self.set_epoch_status(status);
        self
    }

    pub fn with_vault_metrics(self, metrics: VaultMetrics) -> Self {
        self.set_vault_metrics(metrics);
        self
    }

    pub fn with_position(self, account: &Address, position: AccountPosition) -> Self {
        self.set_position(account, position);
        self
    }

    pub fn with_deposit(self, account: &Address, deposit: AccountDeposit) -> Self {
        self.set_deposit(account, deposit);
        self
    }

    pub fn set_epoch_status(&self, status: EpochStatus) {
        self.state().epoch_status = Some(status);
    }

    pub fn set_vault_metrics(&self, metrics: VaultMetrics) {
        self.state().vault_metrics = Some(metrics);
    }

    pub fn set_position(&self, account: &Address, position: AccountPosition) {
        self.state().positions.insert(account.clone(), position);
    }

    pub fn set_deposit(&self, account: &Address, deposit: AccountDeposit) {
        self.state().deposits.insert(account.clone(), deposit);
    }

    pub fn set_claimable_epochs(&self, account: &Address, epochs: Vec<u64>) {
        self.state().claimable.insert(account.clone(), epochs);
    }

    /// Reward parameters plus eligibility/claim flags for one epoch.
    pub fn set_reward(
        &self,
        account: &Address,
        epoch: u64,
        params: RewardParameters,
        eligible: bool,
        claimed: bool,
    ) {
        let mut state = self.state();
        let key = (account.clone(), epoch);
        state.rewards.insert(key.clone(), params);
        if eligible {
            state.eligible.insert(key.clone());
        } else {
            state.eligible.remove(&key);
        }
        if claimed {
            state.claimed.insert(key);
        } else {
            state.claimed.remove(&key);
        }
    }

    /// Make every read of `kind` fail until cleared.
    pub fn fail_reads(&self, kind: ReadKind) {
        self.state().failing_reads.insert(kind);
    }

    pub fn clear_read_failures(&self) {
        self.state().failing_reads.clear();
    }

    /// Make the reward parameter read for one epoch fail.
    pub fn fail_reward_epoch(&self, epoch: u64) {
        self.state().failing_reward_epochs.insert(epoch);
    }

    pub fn fail_submissions(&self, error: DataSourceError) {
        self.state().submission_error = Some(error);
    }

    pub fn settle_with(&self, outcome: Result<Settlement, DataSourceError>) {
        self.state().settlement = outcome;
    }

    /// Block reads at their start until [`release_reads`](Self::release_reads).
    pub fn hold_reads(&self) {
        self.read_gate.send_replace(false);
    }

    pub fn release_reads(&self) {
        self.read_gate.send_replace(true);
    }

    pub fn hold_settlements(&self) {
        self.settlement_gate.send_replace(false);
    }

    pub fn release_settlements(&self) {
        self.settlement_gate.send_replace(true);
    }

    /// Number of reads of `kind` started so far.
    pub fn calls(&self, kind: ReadKind) -> usize {
        self.state().calls.get(&kind).copied().unwrap_or(0)
    }

    pub fn total_reads(&self) -> usize {
        self.state().calls.values().sum()
    }

    pub fn submitted(&self) -> Vec<MutationRequest> {
        self.state().submitted.clone()
    }

    async fn begin_read(&self, kind: ReadKind) -> Result<(), DataSourceError> {
        *self.state().calls.entry(kind).or_insert(0) += 1;
        let mut gate = self.read_gate.subscribe();
        let _ = gate.wait_for(|open| *open).await;
        if self.state().failing_reads.contains(&kind) {
            return Err(DataSourceError::NetworkError(format!(
                "injected {:?} failure",
                kind
            )));
        }
        Ok(())
    }
}

impl Default for MockDataSource {
    fn default() -> Self {
        Self::new()
    }
}

fn empty_position() -> AccountPosition {
    AccountPosition {
        share_balance: Decimal::zero(),
        last_mutation_time: 0,
        withdrawal_requested: false,
        withdrawal_available_at: 0,
        risk_tier: RiskTier::Low,
        total_deposited: Decimal::zero(),
    }
}

fn empty_deposit() -> AccountDeposit {
    AccountDeposit {
        total_deposited: Decimal::zero(),
        current_balance: Decimal::zero(),
        first_deposit_epoch: 0,
        last_deposit_epoch: 0,
        risk_tier: RiskTier::Low,
        time_weighted_balance: Decimal::zero(),
    }
}

#[async_trait]
impl VaultDataSource for MockDataSource {
    async fn get_epoch_status(&self) -> Result<EpochStatus, DataSourceError> {
        self.begin_read(ReadKind::EpochStatus).await?;
        self.state()
            .epoch_status
            .clone()
            .ok_or_else(|| DataSourceError::Other("epoch status not set".to_string()))
    }

    async fn get_vault_metrics(&self) -> Result<VaultMetrics, DataSourceError> {
        self.begin_read(ReadKind::VaultMetrics).await?;
        self.state()
            .vault_metrics
            .clone()
            .ok_or_else(|| DataSourceError::Other("vault metrics not set".to_string()))
    }

    async fn get_account_position(
        &self,
        account: &Address,
    ) -> Result<AccountPosition, DataSourceError> {
        self.begin_read(ReadKind::Position).await?;
        Ok(self
            .state()
            .positions
            .get(account)
            .cloned()
            .unwrap_or_else(empty_position))
    }

    async fn get_account_deposit(
        &self,
        account: &Address,
    ) -> Result<AccountDeposit, DataSourceError> {
        self.begin_read(ReadKind::Deposit).await?;
        Ok(self
            .state()
            .deposits
            .get(account)
            .cloned()
            .unwrap_or_else(empty_deposit))
    }

    async fn get_claimable_epochs(&self, account: &Address) -> Result<Vec<u64>, DataSourceError> {
        self.begin_read(ReadKind::ClaimableEpochs).await?;
        Ok(self
            .state()
            .claimable
            .get(account)
            .cloned()
            .unwrap_or_default())
    }

    async fn get_reward_parameters(
        &self,
        account: &Address,
        epoch: u64,
    ) -> Result<RewardParameters, DataSourceError> {
        self.begin_read(ReadKind::RewardParameters).await?;
        let state = self.state();
        if state.failing_reward_epochs.contains(&epoch) {
            return Err(DataSourceError::RpcError {
                code: 3,
                message: format!("execution reverted for epoch {}", epoch),
            });
        }
        state
            .rewards
            .get(&(account.clone(), epoch))
            .cloned()
            .ok_or_else(|| DataSourceError::Other(format!("no reward parameters for {}", epoch)))
    }

    async fn is_eligible_for_epoch(
        &self,
        account: &Address,
        epoch: u64,
    ) -> Result<bool, DataSourceError> {
        self.begin_read(ReadKind::Eligibility).await?;
        Ok(self.state().eligible.contains(&(account.clone(), epoch)))
    }

    async fn has_claimed_epoch(
        &self,
        account: &Address,
        epoch: u64,
    ) -> Result<bool, DataSourceError> {
        self.begin_read(ReadKind::ClaimStatus).await?;
        Ok(self.state().claimed.contains(&(account.clone(), epoch)))
    }

    async fn submit(&self, request: &MutationRequest) -> Result<TxHandle, DataSourceError> {
        let mut state = self.state();
        if let Some(err) = state.submission_error.clone() {
            return Err(err);
        }
        state.submitted.push(request.clone());
        let hash = format!("0x{:064x}", state.next_tx);
        state.next_tx += 1;
        Ok(TxHandle { hash })
    }

    async fn await_settlement(&self, _handle: &TxHandle) -> Result<Settlement, DataSourceError> {
        let mut gate = self.settlement_gate.subscribe();
        let _ = gate.wait_for(|open| *open).await;
        self.state().settlement.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn account() -> Address {
        Address::new("0x1111111111111111111111111111111111111111".to_string())
    }

    fn status(epoch: u64) -> EpochStatus {
        EpochStatus {
            epoch_number: epoch,
            time_remaining: 100,
            yield_pool: Decimal::zero(),
            participant_count: 0,
        }
    }

    #[tokio::test]
    async fn test_mock_counts_reads_and_injects_failures() {
        let mock = MockDataSource::new().with_epoch_status(status(3));
        assert_eq!(mock.get_epoch_status().await.unwrap().epoch_number, 3);

        mock.fail_reads(ReadKind::EpochStatus);
        assert!(matches!(
            mock.get_epoch_status().await,
            Err(DataSourceError::NetworkError(_))
        ));
        assert_eq!(mock.calls(ReadKind::EpochStatus), 2);
        assert_eq!(mock.calls(ReadKind::VaultMetrics), 0);
    }

    #[tokio::test]
    async fn test_mock_unknown_account_reads_as_empty() {
        let mock = MockDataSource::new();
        let position = mock.get_account_position(&account()).await.unwrap();
        assert!(!position.has_active_deposit());
        assert!(mock.get_claimable_epochs(&account()).await.unwrap().is_empty());
        assert!(!mock.is_eligible_for_epoch(&account(), 1).await.unwrap());
    }

    #[tokio::test]
    async fn test_mock_submission_records_request() {
        let mock = MockDataSource::new();
        let req = MutationRequest::RequestWithdrawal { account: account() };
        let first = mock.submit(&req).await.unwrap();
        let second = mock.submit(&req).await.unwrap();
        assert_ne!(first, second);
        assert_eq!(mock.submitted().len(), 2);

        mock.fail_submissions(DataSourceError::Rejected("user denied".to_string()));
        assert!(mock.submit(&req).await.is_err());
        assert_eq!(mock.submitted().len(), 2);
    }

    #[tokio::test]
    async fn test_mock_read_gate_holds_until_released() {
        let mock = Arc::new(MockDataSource::new().with_epoch_status(status(1)));
        mock.hold_reads();

        let reader = {
            let mock = Arc::clone(&mock);
            tokio::spawn(async move { mock.get_epoch_status().await })
        };
        while mock.calls(ReadKind::EpochStatus) == 0 {
            tokio::task::yield_now().await;
        }
        assert!(!reader.is_finished());

        mock.release_reads();
        assert_eq!(reader.await.unwrap().unwrap().epoch_number, 1);
    }
}
