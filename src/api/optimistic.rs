//! Direct access to the optimistic ledger, for consumers that submit
//! transactions themselves.

use crate::api::AppState;
use crate::domain::{Decimal, RiskTier};
use crate::error::AppError;
use crate::ledger::MutationId;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptimisticDepositRequest {
    pub amount: Decimal,
    pub asset: String,
    pub risk_tier: RiskTier,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptimisticClaimRequest {
    pub epoch_number: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptimisticRiskRequest {
    pub risk_tier: RiskTier,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingIdResponse {
    pub pending_id: MutationId,
}

pub(crate) fn validate_amount(amount: &Decimal) -> Result<(), AppError> {
    if amount.is_positive() {
        Ok(())
    } else {
        Err(AppError::BadRequest("amount must be positive".into()))
    }
}

pub async fn add_deposit(
    State(state): State<AppState>,
    Json(body): Json<OptimisticDepositRequest>,
) -> Result<(StatusCode, Json<PendingIdResponse>), AppError> {
    validate_amount(&body.amount)?;
    let pending_id = state
        .engine
        .add_optimistic_deposit(body.amount, body.asset, body.risk_tier)?;
    Ok((StatusCode::CREATED, Json(PendingIdResponse { pending_id })))
}

pub async fn add_withdrawal(
    State(state): State<AppState>,
) -> Result<(StatusCode, Json<PendingIdResponse>), AppError> {
    let pending_id = state.engine.add_optimistic_withdrawal()?;
    Ok((StatusCode::CREATED, Json(PendingIdResponse { pending_id })))
}

pub async fn add_claim(
    State(state): State<AppState>,
    Json(body): Json<OptimisticClaimRequest>,
) -> Result<(StatusCode, Json<PendingIdResponse>), AppError> {
    let pending_id = state.engine.add_optimistic_claim(body.epoch_number)?;
    Ok((StatusCode::CREATED, Json(PendingIdResponse { pending_id })))
}

pub async fn add_risk_update(
    State(state): State<AppState>,
    Json(body): Json<OptimisticRiskRequest>,
) -> Result<(StatusCode, Json<PendingIdResponse>), AppError> {
    let pending_id = state.engine.add_optimistic_risk_update(body.risk_tier)?;
    Ok((StatusCode::CREATED, Json(PendingIdResponse { pending_id })))
}

pub async fn resolve(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    let id = MutationId::from_str(&id)
        .map_err(|_| AppError::BadRequest("Invalid pending id".into()))?;
    if state.engine.resolve_optimistic_update(id) {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::NotFound(format!("pending mutation {}", id)))
    }
}
