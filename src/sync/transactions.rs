//! Mutations with optimistic bookkeeping.
//!
//! Each operation records a pending entry, submits the call and returns as
//! soon as a transaction hash exists. Settlement is awaited on a spawned
//! task that resolves the entry, raises a notification on failure and
//! forces a refresh.

use super::engine::SyncEngine;
use crate::datasource::{
    DataSourceError, MutationRequest, Settlement, TxHandle, VaultDataSource,
};
use crate::domain::{Address, Decimal, RiskTier};
use crate::ledger::{MutationId, MutationKind};
use std::sync::Arc;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum TransactionError {
    #[error("no account connected")]
    NotConnected,
    #[error("transaction rejected: {0}")]
    Rejected(#[source] DataSourceError),
}

/// A transaction accepted by the data source.
#[derive(Debug)]
pub struct SubmittedTransaction {
    pub tx_hash: String,
    pub pending_id: MutationId,
    /// Completes after the entry is resolved and the follow-up refresh ran.
    pub settlement: JoinHandle<Result<Settlement, DataSourceError>>,
}

#[derive(Debug, Clone)]
pub struct TransactionService {
    engine: Arc<SyncEngine>,
    source: Arc<dyn VaultDataSource>,
    native_asset: String,
}

impl TransactionService {
    pub fn new(
        engine: Arc<SyncEngine>,
        source: Arc<dyn VaultDataSource>,
        native_asset: impl Into<String>,
    ) -> Self {
        Self {
            engine,
            source,
            native_asset: native_asset.into(),
        }
    }

    /// Deposit an ERC-20 `asset` that uses `decimals` fractional digits.
    pub async fn deposit(
        &self,
        asset: Address,
        amount: Decimal,
        decimals: u32,
        risk_tier: RiskTier,
    ) -> Result<SubmittedTransaction, TransactionError> {
        let kind = MutationKind::Deposit {
            amount,
            asset: asset.to_string(),
            risk_tier,
        };
        self.execute(kind, |account| MutationRequest::Deposit {
            account,
            asset,
            amount,
            decimals,
            risk_tier,
        })
        .await
    }

    pub async fn deposit_native(
        &self,
        amount: Decimal,
        risk_tier: RiskTier,
    ) -> Result<SubmittedTransaction, TransactionError> {
        let kind = MutationKind::Deposit {
            amount,
            asset: self.native_asset.clone(),
            risk_tier,
        };
        self.execute(kind, |account| MutationRequest::DepositNative {
            account,
            amount,
            risk_tier,
        })
        .await
    }

    pub async fn request_withdrawal(&self) -> Result<SubmittedTransaction, TransactionError> {
        self.execute(MutationKind::WithdrawalRequest, |account| {
            MutationRequest::RequestWithdrawal { account }
        })
        .await
    }

    pub async fn claim_epoch_reward(
        &self,
        epoch: u64,
    ) -> Result<SubmittedTransaction, TransactionError> {
        self.execute(
            MutationKind::Claim {
                epoch_number: epoch,
            },
            |account| MutationRequest::ClaimEpochReward { account, epoch },
        )
        .await
    }

    pub async fn update_risk_tier(
        &self,
        risk_tier: RiskTier,
    ) -> Result<SubmittedTransaction, TransactionError> {
        self.execute(MutationKind::RiskUpdate { risk_tier }, |account| {
            MutationRequest::UpdateRiskTier { account, risk_tier }
        })
        .await
    }

    async fn execute<F>(
        &self,
        kind: MutationKind,
        build: F,
    ) -> Result<SubmittedTransaction, TransactionError>
    where
        F: FnOnce(Address) -> MutationRequest,
    {
        let (account, pending_id) = self
            .engine
            .record_mutation(kind)
            .map_err(|_| TransactionError::NotConnected)?;
        let request = build(account);

        let handle = match self.source.submit(&request).await {
            Ok(handle) => handle,
            Err(e) => {
                self.engine.resolve_optimistic_update(pending_id);
                warn!("{} rejected: {}", request.label(), e);
                return Err(TransactionError::Rejected(e));
            }
        };
        info!(
            "{} pending as {} (optimistic {})",
            request.label(),
            handle.hash,
            pending_id
        );

        let settlement = tokio::spawn(watch_settlement(
            Arc::clone(&self.engine),
            Arc::clone(&self.source),
            handle.clone(),
            pending_id,
            request.label(),
        ));

        Ok(SubmittedTransaction {
            tx_hash: handle.hash,
            pending_id,
            settlement,
        })
    }
}

async fn watch_settlement(
    engine: Arc<SyncEngine>,
    source: Arc<dyn VaultDataSource>,
    handle: TxHandle,
    pending_id: MutationId,
    label: &'static str,
) -> Result<Settlement, DataSourceError> {
    let outcome = source.await_settlement(&handle).await;
    engine.resolve_optimistic_update(pending_id);

    match &outcome {
        Ok(Settlement::Confirmed { block_number }) => {
            info!("{} {} confirmed in block {:?}", label, handle.hash, block_number);
        }
        Ok(Settlement::Failed { reason }) => {
            warn!("{} {} failed: {}", label, handle.hash, reason);
            engine.notify(format!("Transaction failed: {} ({})", label, reason));
        }
        Err(e) => {
            warn!("Could not confirm {} {}: {}", label, handle.hash, e);
            engine.notify(format!("Could not confirm {}: {}", label, e));
        }
    }

    if let Err(e) = engine.force_refresh().await {
        debug!("Refresh after {} settlement failed: {}", label, e);
    }
    outcome
}
