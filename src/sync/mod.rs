//! Reconciliation: refresh scheduling, the merged view, and the
//! transaction layer that drives optimistic mutations.

pub mod engine;
pub mod scheduler;
pub mod transactions;
pub mod view;

pub use engine::{RefreshOptions, RefreshOutcome, SyncEngine, SyncSettings};
pub use scheduler::{Scheduler, SchedulerHandle, SyncEvent};
pub use transactions::{SubmittedTransaction, TransactionError, TransactionService};
pub use view::{Notification, SyncView};

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyncError {
    #[error("no account connected")]
    NotConnected,
    #[error("refresh failed: {0}")]
    RefreshFailed(String),
}
