//! EVM JSON-RPC implementation of the vault data source.

use super::abi::{self, Token, Words};
use super::{DataSourceError, MutationRequest, Settlement, TxHandle, VaultDataSource};
use crate::domain::{
    AccountDeposit, AccountPosition, Address, EpochStatus, RewardParameters, VaultMetrics,
    TOKEN_DECIMALS,
};
use async_trait::async_trait;
use backoff::future::retry;
use backoff::ExponentialBackoff;
use reqwest::Client;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

const DEPOSIT_GAS: u64 = 500_000;
const WITHDRAWAL_GAS: u64 = 300_000;
const CLAIM_GAS: u64 = 400_000;
const RISK_UPDATE_GAS: u64 = 200_000;
const APPROVE_GAS: u64 = 100_000;

/// Endpoint and contract wiring for [`JsonRpcDataSource`].
#[derive(Debug, Clone)]
pub struct RpcSettings {
    pub rpc_url: String,
    pub core_vault: Address,
    pub vault_extension: Address,
    pub poll_interval: Duration,
    pub settlement_timeout: Duration,
}

/// Vault data source speaking JSON-RPC to an EVM node or wallet gateway.
///
/// Signing is left to the endpoint: writes go out as `eth_sendTransaction`
/// from the connected account.
#[derive(Debug)]
pub struct JsonRpcDataSource {
    client: Client,
    settings: RpcSettings,
    next_id: AtomicU64,
}

impl JsonRpcDataSource {
    pub fn new(settings: RpcSettings) -> Self {
        Self {
            client: Client::new(),
            settings,
            next_id: AtomicU64::new(1),
        }
    }

    fn envelope(&self, method: &str, params: &Value) -> Value {
        json!({
            "jsonrpc": "2.0",
            "id": self.next_id.fetch_add(1, Ordering::Relaxed),
            "method": method,
            "params": params,
        })
    }

    async fn send_once(
        &self,
        method: &str,
        params: &Value,
    ) -> Result<Value, backoff::Error<DataSourceError>> {
        let response = self
            .client
            .post(&self.settings.rpc_url)
            .json(&self.envelope(method, params))
            .send()
            .await
            .map_err(|e| backoff::Error::transient(DataSourceError::NetworkError(e.to_string())))?;

        let status = response.status();
        if status == 429 {
            return Err(backoff::Error::transient(DataSourceError::RateLimited));
        }
        if status.is_server_error() {
            return Err(backoff::Error::transient(DataSourceError::HttpError {
                status: status.as_u16(),
                message: "Server error".to_string(),
            }));
        }
        if !status.is_success() {
            return Err(backoff::Error::permanent(DataSourceError::HttpError {
                status: status.as_u16(),
                message: "Client error".to_string(),
            }));
        }

        let body = response
            .json::<Value>()
            .await
            .map_err(|e| backoff::Error::permanent(DataSourceError::ParseError(e.to_string())))?;
        parse_rpc_result(body).map_err(backoff::Error::permanent)
    }

    /// Idempotent request, retried with exponential backoff.
    async fn request(&self, method: &str, params: Value) -> Result<Value, DataSourceError> {
        let backoff = ExponentialBackoff {
            max_elapsed_time: Some(Duration::from_secs(30)),
            ..Default::default()
        };
        retry(backoff, || async { self.send_once(method, &params).await }).await
    }

    /// Non-idempotent request: a single attempt.
    async fn request_no_retry(
        &self,
        method: &str,
        params: Value,
    ) -> Result<Value, DataSourceError> {
        self.send_once(method, &params).await.map_err(|e| match e {
            backoff::Error::Permanent(err) => err,
            backoff::Error::Transient { err, .. } => err,
        })
    }

    async fn eth_call(&self, to: &Address, data: String) -> Result<String, DataSourceError> {
        let result = self
            .request("eth_call", json!([{ "to": to.as_str(), "data": data }, "latest"]))
            .await?;
        result
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| DataSourceError::ParseError("eth_call result is not a string".into()))
    }

    async fn send_transaction(
        &self,
        from: &Address,
        to: &Address,
        data: String,
        value: Option<u128>,
        gas: u64,
    ) -> Result<TxHandle, DataSourceError> {
        let mut tx = json!({
            "from": from.as_str(),
            "to": to.as_str(),
            "data": data,
            "gas": quantity(gas as u128),
        });
        if let Some(value) = value {
            tx["value"] = Value::String(quantity(value));
        }

        let result = self
            .request_no_retry("eth_sendTransaction", json!([tx]))
            .await
            .map_err(|e| match e {
                DataSourceError::RpcError { message, .. } => DataSourceError::Rejected(message),
                other => other,
            })?;

        let hash = result
            .as_str()
            .ok_or_else(|| DataSourceError::ParseError("transaction hash is not a string".into()))?;
        Ok(TxHandle {
            hash: hash.to_string(),
        })
    }

    fn core(&self) -> &Address {
        &self.settings.core_vault
    }

    fn extension(&self) -> &Address {
        &self.settings.vault_extension
    }
}

#[async_trait]
impl VaultDataSource for JsonRpcDataSource {
    async fn get_epoch_status(&self) -> Result<EpochStatus, DataSourceError> {
        debug!("Fetching epoch status");
        let data = abi::encode_call(abi::GET_CURRENT_EPOCH_STATUS, &[])?;
        let reply = self.eth_call(self.extension(), data).await?;
        parse_epoch_status(&reply)
    }

    async fn get_vault_metrics(&self) -> Result<VaultMetrics, DataSourceError> {
        debug!("Fetching vault metrics");
        let data = abi::encode_call(abi::GET_VAULT_METRICS, &[])?;
        let reply = self.eth_call(self.core(), data).await?;
        parse_vault_metrics(&reply)
    }

    async fn get_account_position(
        &self,
        account: &Address,
    ) -> Result<AccountPosition, DataSourceError> {
        debug!("Fetching position for account={}", account);
        let data = abi::encode_call(abi::GET_USER_POSITION, &[Token::Address(account.clone())])?;
        let reply = self.eth_call(self.core(), data).await?;
        parse_account_position(&reply)
    }

    async fn get_account_deposit(
        &self,
        account: &Address,
    ) -> Result<AccountDeposit, DataSourceError> {
        debug!("Fetching deposit summary for account={}", account);
        let data = abi::encode_call(abi::GET_USER_DEPOSIT, &[Token::Address(account.clone())])?;
        let reply = self.eth_call(self.extension(), data).await?;
        parse_account_deposit(&reply)
    }

    async fn get_claimable_epochs(&self, account: &Address) -> Result<Vec<u64>, DataSourceError> {
        debug!("Fetching claimable epochs for account={}", account);
        let data =
            abi::encode_call(abi::GET_CLAIMABLE_EPOCHS, &[Token::Address(account.clone())])?;
        let reply = self.eth_call(self.extension(), data).await?;
        Ok(Words::parse(&reply, 2)?.uint64_array(0)?)
    }

    async fn get_reward_parameters(
        &self,
        account: &Address,
        epoch: u64,
    ) -> Result<RewardParameters, DataSourceError> {
        let data = abi::encode_call(
            abi::CALCULATE_REWARD_PARAMETERS,
            &[Token::Address(account.clone()), Token::Uint(epoch as u128)],
        )?;
        let reply = self.eth_call(self.extension(), data).await?;
        parse_reward_parameters(&reply)
    }

    async fn is_eligible_for_epoch(
        &self,
        account: &Address,
        epoch: u64,
    ) -> Result<bool, DataSourceError> {
        let data = abi::encode_call(
            abi::IS_ELIGIBLE_FOR_EPOCH,
            &[Token::Address(account.clone()), Token::Uint(epoch as u128)],
        )?;
        let reply = self.eth_call(self.extension(), data).await?;
        Ok(Words::parse(&reply, 1)?.boolean(0)?)
    }

    async fn has_claimed_epoch(
        &self,
        account: &Address,
        epoch: u64,
    ) -> Result<bool, DataSourceError> {
        let data = abi::encode_call(
            abi::HAS_CLAIMED_EPOCH,
            &[Token::Address(account.clone()), Token::Uint(epoch as u128)],
        )?;
        let reply = self.eth_call(self.extension(), data).await?;
        Ok(Words::parse(&reply, 1)?.boolean(0)?)
    }

    async fn submit(&self, request: &MutationRequest) -> Result<TxHandle, DataSourceError> {
        let core = self.core().clone();
        let handle = match request {
            MutationRequest::Deposit {
                account,
                asset,
                amount,
                decimals,
                risk_tier,
            } => {
                let base_units = to_base_units(amount, *decimals)?;
                let approve = abi::encode_call(
                    abi::APPROVE,
                    &[Token::Address(core.clone()), Token::Uint(base_units)],
                )?;
                info!("Approving {} of {} for the core vault", amount, asset);
                let approval = self
                    .send_transaction(account, asset, approve, None, APPROVE_GAS)
                    .await?;
                if let Settlement::Failed { reason } = self.await_settlement(&approval).await? {
                    return Err(DataSourceError::Rejected(format!(
                        "token approval failed: {}",
                        reason
                    )));
                }

                let data = abi::encode_call(
                    abi::DEPOSIT,
                    &[
                        Token::Address(asset.clone()),
                        Token::Uint(base_units),
                        Token::Address(account.clone()),
                        Token::Uint(risk_tier.as_u8() as u128),
                    ],
                )?;
                self.send_transaction(account, &core, data, None, DEPOSIT_GAS)
                    .await?
            }
            MutationRequest::DepositNative {
                account,
                amount,
                risk_tier,
            } => {
                let wei = to_base_units(amount, TOKEN_DECIMALS)?;
                let data = abi::encode_call(
                    abi::DEPOSIT_NATIVE,
                    &[
                        Token::Address(account.clone()),
                        Token::Uint(risk_tier.as_u8() as u128),
                    ],
                )?;
                self.send_transaction(account, &core, data, Some(wei), DEPOSIT_GAS)
                    .await?
            }
            MutationRequest::RequestWithdrawal { account } => {
                let data = abi::encode_call(abi::REQUEST_WITHDRAWAL, &[])?;
                self.send_transaction(account, &core, data, None, WITHDRAWAL_GAS)
                    .await?
            }
            MutationRequest::ClaimEpochReward { account, epoch } => {
                let data =
                    abi::encode_call(abi::CLAIM_EPOCH_REWARD, &[Token::Uint(u128::from(*epoch))])?;
                self.send_transaction(account, &core, data, None, CLAIM_GAS)
                    .await?
            }
            MutationRequest::UpdateRiskTier { account, risk_tier } => {
                let data = abi::encode_call(
                    abi::UPDATE_RISK_LEVEL,
                    &[Token::Uint(risk_tier.as_u8() as u128)],
                )?;
                self.send_transaction(account, &core, data, None, RISK_UPDATE_GAS)
                    .await?
            }
        };

        info!("{} submitted: {}", request.label(), handle.hash);
        Ok(handle)
    }

    async fn await_settlement(&self, handle: &TxHandle) -> Result<Settlement, DataSourceError> {
        let started = Instant::now();
        loop {
            let receipt = self
                .request("eth_getTransactionReceipt", json!([handle.hash]))
                .await?;
            if let Some(settlement) = parse_receipt(&receipt)? {
                return Ok(settlement);
            }
            if started.elapsed() >= self.settings.settlement_timeout {
                warn!("No receipt for {} after {:?}", handle.hash, started.elapsed());
                return Err(DataSourceError::Timeout(format!(
                    "no receipt for {}",
                    handle.hash
                )));
            }
            tokio::time::sleep(self.settings.poll_interval).await;
        }
    }
}

fn quantity(value: u128) -> String {
    format!("0x{:x}", value)
}

fn parse_quantity(value: &Value) -> Option<u64> {
    let s = value.as_str()?;
    u64::from_str_radix(s.strip_prefix("0x").unwrap_or(s), 16).ok()
}

fn to_base_units(
    amount: &crate::domain::Decimal,
    decimals: u32,
) -> Result<u128, DataSourceError> {
    amount
        .to_fixed_point(decimals)
        .map_err(|e| DataSourceError::Rejected(e.to_string()))
}

/// Unwrap a JSON-RPC response envelope.
fn parse_rpc_result(body: Value) -> Result<Value, DataSourceError> {
    if let Some(err) = body.get("error") {
        return Err(DataSourceError::RpcError {
            code: err.get("code").and_then(Value::as_i64).unwrap_or(0),
            message: err
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("unknown error")
                .to_string(),
        });
    }
    body.get("result")
        .cloned()
        .ok_or_else(|| DataSourceError::ParseError("Missing result field".to_string()))
}

/// `None` while the transaction is still pending.
fn parse_receipt(receipt: &Value) -> Result<Option<Settlement>, DataSourceError> {
    if receipt.is_null() {
        return Ok(None);
    }
    let block_number = receipt.get("blockNumber").and_then(parse_quantity);
    match receipt.get("status").and_then(Value::as_str) {
        Some("0x1") => Ok(Some(Settlement::Confirmed { block_number })),
        Some("0x0") => Ok(Some(Settlement::Failed {
            reason: "transaction reverted".to_string(),
        })),
        other => Err(DataSourceError::ParseError(format!(
            "unexpected receipt status: {:?}",
            other
        ))),
    }
}

fn parse_epoch_status(reply: &str) -> Result<EpochStatus, DataSourceError> {
    let w = Words::parse(reply, 4)?;
    Ok(EpochStatus {
        epoch_number: w.uint64(0)?,
        time_remaining: w.uint64(1)?,
        yield_pool: w.amount(2)?,
        participant_count: w.uint64(3)?,
    })
}

fn parse_vault_metrics(reply: &str) -> Result<VaultMetrics, DataSourceError> {
    let w = Words::parse(reply, 9)?;
    Ok(VaultMetrics {
        total_value_locked: w.amount(0)?,
        total_users: w.uint64(1)?,
        total_supply: w.amount(2)?,
        management_fee: w.uint64(3)?,
        performance_fee: w.uint64(4)?,
        assets_count: w.uint64(5)?,
        total_principal: w.amount(6)?,
        total_yield_generated: w.amount(7)?,
        total_yield_distributed: w.amount(8)?,
    })
}

fn parse_account_position(reply: &str) -> Result<AccountPosition, DataSourceError> {
    let w = Words::parse(reply, 6)?;
    Ok(AccountPosition {
        share_balance: w.amount(0)?,
        last_mutation_time: w.uint64(1)?,
        withdrawal_requested: w.boolean(2)?,
        withdrawal_available_at: w.uint64(3)?,
        risk_tier: w.risk_tier(4)?,
        total_deposited: w.amount(5)?,
    })
}

fn parse_account_deposit(reply: &str) -> Result<AccountDeposit, DataSourceError> {
    let w = Words::parse(reply, 6)?;
    Ok(AccountDeposit {
        total_deposited: w.amount(0)?,
        current_balance: w.amount(1)?,
        first_deposit_epoch: w.uint64(2)?,
        last_deposit_epoch: w.uint64(3)?,
        risk_tier: w.risk_tier(4)?,
        time_weighted_balance: w.amount(5)?,
    })
}

fn parse_reward_parameters(reply: &str) -> Result<RewardParameters, DataSourceError> {
    let w = Words::parse(reply, 6)?;
    Ok(RewardParameters {
        base_weight: w.amount(0)?,
        time_weight: w.amount(1)?,
        risk_multiplier: w.uint64(2)?,
        total_weight: w.amount(3)?,
        win_probability: w.uint64(4)?,
        potential_payout: w.amount(5)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Decimal, RiskTier};

    const ONE: u128 = 1_000_000_000_000_000_000;

    fn reply(words: &[u128]) -> String {
        let body: String = words.iter().map(|w| format!("{:064x}", w)).collect();
        format!("0x{}", body)
    }

    fn d(s: &str) -> Decimal {
        Decimal::from_str_canonical(s).unwrap()
    }

    #[test]
    fn test_parse_account_position() {
        let position =
            parse_account_position(&reply(&[5 * ONE, 1_700_000_000, 1, 1_700_600_000, 2, 1000 * ONE]))
                .unwrap();
        assert_eq!(position.share_balance, d("5"));
        assert_eq!(position.last_mutation_time, 1_700_000_000);
        assert!(position.withdrawal_requested);
        assert_eq!(position.withdrawal_available_at, 1_700_600_000);
        assert_eq!(position.risk_tier, RiskTier::Aggressive);
        assert_eq!(position.total_deposited, d("1000"));
    }

    #[test]
    fn test_parse_epoch_status() {
        let status = parse_epoch_status(&reply(&[42, 3600, ONE / 2, 17])).unwrap();
        assert_eq!(status.epoch_number, 42);
        assert_eq!(status.time_remaining, 3600);
        assert_eq!(status.yield_pool, d("0.5"));
        assert_eq!(status.participant_count, 17);
    }

    #[test]
    fn test_parse_vault_metrics_requires_nine_words() {
        let err = parse_vault_metrics(&reply(&[1, 2, 3])).unwrap_err();
        assert!(matches!(err, DataSourceError::ParseError(_)));

        let metrics =
            parse_vault_metrics(&reply(&[10 * ONE, 3, 9 * ONE, 200, 1000, 7, 8 * ONE, ONE, 0]))
                .unwrap();
        assert_eq!(metrics.total_value_locked, d("10"));
        assert_eq!(metrics.total_users, 3);
        assert_eq!(metrics.management_fee, 200);
        assert_eq!(metrics.total_yield_distributed, Decimal::zero());
    }

    #[test]
    fn test_parse_invalid_risk_tier_is_parse_error() {
        let err = parse_account_deposit(&reply(&[ONE, ONE, 1, 2, 9, 0])).unwrap_err();
        assert!(matches!(err, DataSourceError::ParseError(_)));
    }

    #[test]
    fn test_parse_rpc_result() {
        let ok = parse_rpc_result(json!({"jsonrpc": "2.0", "id": 1, "result": "0x01"})).unwrap();
        assert_eq!(ok, json!("0x01"));

        let err = parse_rpc_result(json!({
            "jsonrpc": "2.0",
            "id": 1,
            "error": {"code": -32000, "message": "execution reverted"}
        }))
        .unwrap_err();
        assert_eq!(
            err,
            DataSourceError::RpcError {
                code: -32000,
                message: "execution reverted".to_string()
            }
        );
    }

    #[test]
    fn test_parse_receipt() {
        assert_eq!(parse_receipt(&Value::Null).unwrap(), None);
        assert_eq!(
            parse_receipt(&json!({"status": "0x1", "blockNumber": "0x10"})).unwrap(),
            Some(Settlement::Confirmed {
                block_number: Some(16)
            })
        );
        assert!(matches!(
            parse_receipt(&json!({"status": "0x0"})).unwrap(),
            Some(Settlement::Failed { .. })
        ));
        assert!(parse_receipt(&json!({"status": "0x2"})).is_err());
    }

    #[test]
    fn test_to_base_units_rejects_negative_amounts() {
        assert_eq!(to_base_units(&d("1.5"), TOKEN_DECIMALS).unwrap(), ONE + ONE / 2);
        assert!(matches!(
            to_base_units(&d("-1"), TOKEN_DECIMALS),
            Err(DataSourceError::Rejected(_))
        ));
    }

    #[test]
    fn test_to_base_units_uses_token_decimals() {
        assert_eq!(to_base_units(&d("1.5"), 6).unwrap(), 1_500_000);
        assert_eq!(to_base_units(&d("1"), 6).unwrap(), 1_000_000);
        // USDC cannot carry more than six fractional digits.
        assert!(matches!(
            to_base_units(&d("0.0000001"), 6),
            Err(DataSourceError::Rejected(_))
        ));
    }
}
