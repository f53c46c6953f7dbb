use crate::api::optimistic::validate_amount;
use crate::api::AppState;
use crate::domain::{Address, Decimal, RiskTier, TOKEN_DECIMALS};
use crate::error::AppError;
use crate::ledger::MutationId;
use crate::sync::SubmittedTransaction;
use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DepositRequest {
    /// ERC-20 token address; absent for the native asset.
    pub asset: Option<String>,
    pub amount: Decimal,
    /// Token decimals; ignored for the native asset.
    #[serde(default = "default_decimals")]
    pub decimals: u32,
    pub risk_tier: RiskTier,
}

fn default_decimals() -> u32 {
    TOKEN_DECIMALS
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimRequest {
    pub epoch_number: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskRequest {
    pub risk_tier: RiskTier,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmittedResponse {
    pub tx_hash: String,
    pub pending_id: MutationId,
}

type Submitted = (StatusCode, Json<SubmittedResponse>);

// Settlement keeps running on its own task after the response.
fn accepted(tx: SubmittedTransaction) -> Submitted {
    (
        StatusCode::ACCEPTED,
        Json(SubmittedResponse {
            tx_hash: tx.tx_hash,
            pending_id: tx.pending_id,
        }),
    )
}

pub async fn deposit(
    State(state): State<AppState>,
    Json(body): Json<DepositRequest>,
) -> Result<Submitted, AppError> {
    validate_amount(&body.amount)?;
    let tx = match body.asset.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        Some(raw) => {
            let asset = Address::from_str(raw)
                .map_err(|_| AppError::BadRequest("Invalid asset address".into()))?;
            state
                .transactions
                .deposit(asset, body.amount, body.decimals, body.risk_tier)
                .await?
        }
        None => {
            state
                .transactions
                .deposit_native(body.amount, body.risk_tier)
                .await?
        }
    };
    Ok(accepted(tx))
}

pub async fn request_withdrawal(State(state): State<AppState>) -> Result<Submitted, AppError> {
    Ok(accepted(state.transactions.request_withdrawal().await?))
}

pub async fn claim(
    State(state): State<AppState>,
    Json(body): Json<ClaimRequest>,
) -> Result<Submitted, AppError> {
    Ok(accepted(
        state.transactions.claim_epoch_reward(body.epoch_number).await?,
    ))
}

pub async fn update_risk(
    State(state): State<AppState>,
    Json(body): Json<RiskRequest>,
) -> Result<Submitted, AppError> {
    Ok(accepted(
        state.transactions.update_risk_tier(body.risk_tier).await?,
    ))
}
