//! What presentation consumers read.

use crate::domain::{
    AccountDeposit, AccountPosition, Address, CookingStatus, EpochStatus, TimeMs, UserDashboard,
    VaultMetrics,
};
use crate::ledger::PendingMutation;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// A dismissable, non-blocking message (e.g. a transaction that failed
/// after submission).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: u64,
    pub message: String,
    pub created_at: TimeMs,
}

/// Merged view of authoritative state and pending mutations.
///
/// `account_position` and `user_dashboard` are projected; every other value
/// is the last authoritative one.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncView {
    pub account: Option<Address>,
    pub epoch_info: Option<EpochStatus>,
    pub vault_metrics: Option<VaultMetrics>,
    pub account_position: Option<AccountPosition>,
    pub account_deposit: Option<AccountDeposit>,
    pub user_dashboard: Option<UserDashboard>,
    pub cooking: Option<CookingStatus>,
    pub initial_loading: bool,
    pub background_refreshing: bool,
    pub last_successful_fetch_time: Option<DateTime<Utc>>,
    pub error: Option<String>,
    pub has_pending_optimistic_updates: bool,
    pub has_user_deposits: bool,
    pub pending_mutations: Vec<PendingMutation>,
    pub notifications: Vec<Notification>,
}
