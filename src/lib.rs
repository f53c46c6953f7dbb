pub mod api;
pub mod cache;
pub mod clock;
pub mod config;
pub mod datasource;
pub mod db;
pub mod domain;
pub mod error;
pub mod fetch;
pub mod ledger;
pub mod sync;

pub use cache::{CacheKey, CacheStore, CacheValue};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::Config;
pub use datasource::{
    DataSourceError, JsonRpcDataSource, MockDataSource, MutationRequest, Settlement,
    VaultDataSource,
};
pub use db::{init_db, Repository};
pub use domain::{
    AccountDeposit, AccountPosition, Address, Decimal, EpochRewardInfo, EpochStatus, RiskTier,
    TimeMs, UserDashboard, VaultMetrics,
};
pub use error::AppError;
pub use fetch::Fetcher;
pub use ledger::{MutationId, MutationKind, OptimisticLedger};
pub use sync::{
    RefreshOptions, RefreshOutcome, Scheduler, SyncEngine, SyncError, SyncSettings, SyncView,
    TransactionService,
};
