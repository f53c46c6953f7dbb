use crate::api::AppState;
use crate::domain::Address;
use crate::error::AppError;
use crate::sync::{RefreshOptions, RefreshOutcome, SyncView};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use tracing::debug;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountRequest {
    pub account: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshResponse {
    pub outcome: &'static str,
}

pub async fn get_state(State(state): State<AppState>) -> Json<SyncView> {
    Json(state.engine.view())
}

/// Connect, switch or disconnect the account. A change runs a forced
/// refresh before the view is returned, and a failed refresh shows up in
/// the view. If another cycle is already in flight the forced refresh is
/// only queued, so the view still reports `initialLoading` for the new
/// account.
pub async fn put_account(
    State(state): State<AppState>,
    Json(body): Json<AccountRequest>,
) -> Result<Json<SyncView>, AppError> {
    let account = match body.account.as_deref().map(str::trim) {
        Some("") | None => None,
        Some(raw) => Some(
            Address::from_str(raw)
                .map_err(|_| AppError::BadRequest("Invalid account address".into()))?,
        ),
    };

    if state.engine.set_account(account) {
        if let Err(e) = state.engine.refresh_data(RefreshOptions::forced()).await {
            debug!("Refresh after account change failed: {}", e);
        }
    }
    Ok(Json(state.engine.view()))
}

pub async fn post_refresh(
    State(state): State<AppState>,
) -> Result<Json<RefreshResponse>, AppError> {
    let outcome = match state.engine.force_refresh().await? {
        RefreshOutcome::Completed => "completed",
        RefreshOutcome::Skipped => "skipped",
        RefreshOutcome::Queued => "queued",
    };
    Ok(Json(RefreshResponse { outcome }))
}

pub async fn dismiss_error(State(state): State<AppState>) -> StatusCode {
    state.engine.dismiss_error();
    StatusCode::NO_CONTENT
}

pub async fn dismiss_notification(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> Result<StatusCode, AppError> {
    if state.engine.dismiss_notification(id) {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::NotFound(format!("notification {}", id)))
    }
}
