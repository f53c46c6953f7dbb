//! Remote data source abstraction: vault reads and mutating transactions.

use crate::domain::{
    AccountDeposit, AccountPosition, Address, Decimal, EpochStatus, RewardParameters, RiskTier,
    VaultMetrics,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

pub mod abi;
pub mod mock;
pub mod rpc;

pub use mock::{MockDataSource, ReadKind};
pub use rpc::{JsonRpcDataSource, RpcSettings};

/// The vault contracts, seen from the client.
///
/// Reads are idempotent and may be retried. Mutations are split in two:
/// [`submit`](VaultDataSource::submit) returns as soon as the transaction is
/// accepted into the pending state, and
/// [`await_settlement`](VaultDataSource::await_settlement) waits for it to be
/// confirmed or to fail.
#[async_trait]
pub trait VaultDataSource: Send + Sync + fmt::Debug {
    async fn get_epoch_status(&self) -> Result<EpochStatus, DataSourceError>;

    async fn get_vault_metrics(&self) -> Result<VaultMetrics, DataSourceError>;

    async fn get_account_position(
        &self,
        account: &Address,
    ) -> Result<AccountPosition, DataSourceError>;

    async fn get_account_deposit(
        &self,
        account: &Address,
    ) -> Result<AccountDeposit, DataSourceError>;

    /// Epoch numbers the account may still claim, in contract order.
    async fn get_claimable_epochs(&self, account: &Address) -> Result<Vec<u64>, DataSourceError>;

    async fn get_reward_parameters(
        &self,
        account: &Address,
        epoch: u64,
    ) -> Result<RewardParameters, DataSourceError>;

    async fn is_eligible_for_epoch(
        &self,
        account: &Address,
        epoch: u64,
    ) -> Result<bool, DataSourceError>;

    async fn has_claimed_epoch(&self, account: &Address, epoch: u64)
        -> Result<bool, DataSourceError>;

    /// Submit a mutating call. Never retried.
    async fn submit(&self, request: &MutationRequest) -> Result<TxHandle, DataSourceError>;

    async fn await_settlement(&self, handle: &TxHandle) -> Result<Settlement, DataSourceError>;
}

/// A mutating vault call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum MutationRequest {
    /// ERC-20 deposit; the token allowance is granted first. `amount` is
    /// scaled by the token's own `decimals`.
    #[serde(rename_all = "camelCase")]
    Deposit {
        account: Address,
        asset: Address,
        amount: Decimal,
        decimals: u32,
        risk_tier: RiskTier,
    },
    /// Deposit of the chain's native asset.
    #[serde(rename_all = "camelCase")]
    DepositNative {
        account: Address,
        amount: Decimal,
        risk_tier: RiskTier,
    },
    RequestWithdrawal {
        account: Address,
    },
    ClaimEpochReward {
        account: Address,
        epoch: u64,
    },
    #[serde(rename_all = "camelCase")]
    UpdateRiskTier {
        account: Address,
        risk_tier: RiskTier,
    },
}

impl MutationRequest {
    pub fn account(&self) -> &Address {
        match self {
            MutationRequest::Deposit { account, .. }
            | MutationRequest::DepositNative { account, .. }
            | MutationRequest::RequestWithdrawal { account }
            | MutationRequest::ClaimEpochReward { account, .. }
            | MutationRequest::UpdateRiskTier { account, .. } => account,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            MutationRequest::Deposit { .. } => "token deposit",
            MutationRequest::DepositNative { .. } => "native deposit",
            MutationRequest::RequestWithdrawal { .. } => "withdrawal request",
            MutationRequest::ClaimEpochReward { .. } => "epoch reward claim",
            MutationRequest::UpdateRiskTier { .. } => "risk tier update",
        }
    }
}

/// Pending-transaction handle.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TxHandle {
    pub hash: String,
}

/// How a submitted transaction ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum Settlement {
    #[serde(rename_all = "camelCase")]
    Confirmed { block_number: Option<u64> },
    Failed { reason: String },
}

impl Settlement {
    pub fn is_confirmed(&self) -> bool {
        matches!(self, Settlement::Confirmed { .. })
    }
}

/// Error type for data source operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataSourceError {
    /// Network error (e.g., connection timeout, DNS failure)
    NetworkError(String),
    /// HTTP error (e.g., 5xx from the RPC gateway)
    HttpError { status: u16, message: String },
    /// JSON-RPC error object (reverted call, unknown method, ...)
    RpcError { code: i64, message: String },
    /// Parsing error (invalid JSON, malformed ABI words, out-of-range value)
    ParseError(String),
    /// Rate limit exceeded
    RateLimited,
    /// Mutation refused before a transaction handle existed
    Rejected(String),
    /// Gave up waiting
    Timeout(String),
    /// Other error
    Other(String),
}

impl fmt::Display for DataSourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataSourceError::NetworkError(msg) => write!(f, "Network error: {}", msg),
            DataSourceError::HttpError { status, message } => {
                write!(f, "HTTP error {}: {}", status, message)
            }
            DataSourceError::RpcError { code, message } => {
                write!(f, "RPC error {}: {}", code, message)
            }
            DataSourceError::ParseError(msg) => write!(f, "Parse error: {}", msg),
            DataSourceError::RateLimited => write!(f, "Rate limited"),
            DataSourceError::Rejected(msg) => write!(f, "Rejected: {}", msg),
            DataSourceError::Timeout(msg) => write!(f, "Timed out: {}", msg),
            DataSourceError::Other(msg) => write!(f, "Error: {}", msg),
        }
    }
}

impl std::error::Error for DataSourceError {}

impl From<abi::AbiError> for DataSourceError {
    fn from(err: abi::AbiError) -> Self {
        DataSourceError::ParseError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_datasource_error_display() {
        let err = DataSourceError::NetworkError("connection timeout".to_string());
        assert_eq!(err.to_string(), "Network error: connection timeout");

        let err = DataSourceError::HttpError {
            status: 502,
            message: "Bad gateway".to_string(),
        };
        assert_eq!(err.to_string(), "HTTP error 502: Bad gateway");

        let err = DataSourceError::RpcError {
            code: 3,
            message: "execution reverted".to_string(),
        };
        assert_eq!(err.to_string(), "RPC error 3: execution reverted");

        let err = DataSourceError::Rejected("user denied".to_string());
        assert_eq!(err.to_string(), "Rejected: user denied");

        assert_eq!(DataSourceError::RateLimited.to_string(), "Rate limited");
    }

    #[test]
    fn test_mutation_request_account_and_label() {
        let account = Address::new("0x1111111111111111111111111111111111111111".to_string());
        let req = MutationRequest::ClaimEpochReward {
            account: account.clone(),
            epoch: 4,
        };
        assert_eq!(req.account(), &account);
        assert_eq!(req.label(), "epoch reward claim");
    }
}
