//! Value types for the vault dashboard.
//!
//! This module provides:
//! - Lossless amounts via the Decimal wrapper and fixed-point conversion
//! - Primitives: TimeMs, Address, RiskTier
//! - Snapshots fetched from the vault: positions, deposits, epochs, metrics
//! - The dashboard aggregate and the derived cooking status

pub mod cooking;
pub mod dashboard;
pub mod decimal;
pub mod epoch;
pub mod position;
pub mod primitives;

pub use cooking::CookingStatus;
pub use dashboard::UserDashboard;
pub use decimal::{Decimal, FixedPointError, TOKEN_DECIMALS};
pub use epoch::{EpochRewardInfo, EpochStatus, RewardParameters, VaultMetrics, EPOCH_DURATION_SECS};
pub use position::{AccountDeposit, AccountPosition};
pub use primitives::{Address, AddressParseError, RiskTier, RiskTierParseError, TimeMs};
