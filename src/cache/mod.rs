//! Keyed store of the last known remote values.
//!
//! Reads never block and never touch the network. A stale entry is still
//! served; freshness only decides whether a refresh cycle may skip the
//! remote call.

use crate::clock::Clock;
use crate::domain::{
    AccountDeposit, AccountPosition, Address, EpochStatus, TimeMs, UserDashboard, VaultMetrics,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

pub const DEFAULT_FRESHNESS_MS: i64 = 60_000;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CacheError {
    #[error("epoch regression rejected: cached {cached}, fetched {fetched}")]
    EpochRegression { cached: u64, fetched: u64 },
    #[error("value kind does not match key {0}")]
    KindMismatch(String),
    #[error("invalid cache key: {0}")]
    InvalidKey(String),
}

/// Global keys plus per-account keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CacheKey {
    EpochInfo,
    VaultMetrics,
    Position(Address),
    Deposit(Address),
    Dashboard(Address),
}

impl CacheKey {
    pub fn account(&self) -> Option<&Address> {
        match self {
            CacheKey::EpochInfo | CacheKey::VaultMetrics => None,
            CacheKey::Position(a) | CacheKey::Deposit(a) | CacheKey::Dashboard(a) => Some(a),
        }
    }

    pub fn account_keys(account: &Address) -> [CacheKey; 3] {
        [
            CacheKey::Position(account.clone()),
            CacheKey::Deposit(account.clone()),
            CacheKey::Dashboard(account.clone()),
        ]
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheKey::EpochInfo => write!(f, "epochInfo"),
            CacheKey::VaultMetrics => write!(f, "vaultMetrics"),
            CacheKey::Position(a) => write!(f, "position:{}", a),
            CacheKey::Deposit(a) => write!(f, "deposit:{}", a),
            CacheKey::Dashboard(a) => write!(f, "dashboard:{}", a),
        }
    }
}

impl FromStr for CacheKey {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "epochInfo" => return Ok(CacheKey::EpochInfo),
            "vaultMetrics" => return Ok(CacheKey::VaultMetrics),
            _ => {}
        }
        let (kind, account) = s
            .split_once(':')
            .ok_or_else(|| CacheError::InvalidKey(s.to_string()))?;
        let account: Address = account
            .parse()
            .map_err(|_| CacheError::InvalidKey(s.to_string()))?;
        match kind {
            "position" => Ok(CacheKey::Position(account)),
            "deposit" => Ok(CacheKey::Deposit(account)),
            "dashboard" => Ok(CacheKey::Dashboard(account)),
            _ => Err(CacheError::InvalidKey(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "camelCase")]
pub enum CacheValue {
    EpochInfo(EpochStatus),
    VaultMetrics(VaultMetrics),
    Position(AccountPosition),
    Deposit(AccountDeposit),
    Dashboard(UserDashboard),
}

impl CacheValue {
    fn fits(&self, key: &CacheKey) -> bool {
        matches!(
            (self, key),
            (CacheValue::EpochInfo(_), CacheKey::EpochInfo)
                | (CacheValue::VaultMetrics(_), CacheKey::VaultMetrics)
                | (CacheValue::Position(_), CacheKey::Position(_))
                | (CacheValue::Deposit(_), CacheKey::Deposit(_))
                | (CacheValue::Dashboard(_), CacheKey::Dashboard(_))
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub value: CacheValue,
    pub fetched_at: TimeMs,
    /// Refresh cycle that produced the value; 0 for direct puts and
    /// restored entries.
    pub generation: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutOutcome {
    Stored,
    /// A newer cycle already wrote this key.
    DiscardedStale,
}

#[derive(Debug)]
pub struct CacheStore {
    entries: HashMap<CacheKey, CacheEntry>,
    freshness_ms: i64,
    clock: Arc<dyn Clock>,
}

impl CacheStore {
    pub fn new(clock: Arc<dyn Clock>, freshness_ms: i64) -> Self {
        Self {
            entries: HashMap::new(),
            freshness_ms,
            clock,
        }
    }

    pub fn get(&self, key: &CacheKey) -> Option<&CacheValue> {
        self.entries.get(key).map(|e| &e.value)
    }

    pub fn entry(&self, key: &CacheKey) -> Option<&CacheEntry> {
        self.entries.get(key)
    }

    pub fn is_fresh(&self, key: &CacheKey) -> bool {
        self.entries
            .get(key)
            .map(|e| self.clock.now().since(e.fetched_at) < self.freshness_ms)
            .unwrap_or(false)
    }

    /// Overwrite `key`, stamped with the current time.
    pub fn put(&mut self, key: CacheKey, value: CacheValue) -> Result<(), CacheError> {
        if !value.fits(&key) {
            return Err(CacheError::KindMismatch(key.to_string()));
        }
        let fetched_at = self.clock.now();
        self.entries.insert(
            key,
            CacheEntry {
                value,
                fetched_at,
                generation: 0,
            },
        );
        Ok(())
    }

    /// Write a value fetched by refresh cycle `generation`.
    ///
    /// Results older than what the key already holds are discarded, and an
    /// epoch number lower than the cached one is rejected.
    pub fn put_stamped(
        &mut self,
        key: CacheKey,
        value: CacheValue,
        generation: u64,
    ) -> Result<PutOutcome, CacheError> {
        if !value.fits(&key) {
            return Err(CacheError::KindMismatch(key.to_string()));
        }
        if let Some(existing) = self.entries.get(&key) {
            if existing.generation > generation {
                debug!(
                    "Discarding {} from cycle {} (cache holds cycle {})",
                    key, generation, existing.generation
                );
                return Ok(PutOutcome::DiscardedStale);
            }
            if let (CacheValue::EpochInfo(cached), CacheValue::EpochInfo(fetched)) =
                (&existing.value, &value)
            {
                if fetched.epoch_number < cached.epoch_number {
                    warn!(
                        "Rejecting epoch regression {} -> {}",
                        cached.epoch_number, fetched.epoch_number
                    );
                    return Err(CacheError::EpochRegression {
                        cached: cached.epoch_number,
                        fetched: fetched.epoch_number,
                    });
                }
            }
        }

        let fetched_at = self.clock.now();
        self.entries.insert(
            key,
            CacheEntry {
                value,
                fetched_at,
                generation,
            },
        );
        Ok(PutOutcome::Stored)
    }

    /// Remove `key`; the next read is a miss. Returns whether it existed.
    pub fn invalidate(&mut self, key: &CacheKey) -> bool {
        self.entries.remove(key).is_some()
    }

    /// Remove every per-account key of `account`.
    pub fn invalidate_account(&mut self, account: &Address) -> Vec<CacheKey> {
        CacheKey::account_keys(account)
            .into_iter()
            .filter(|key| self.invalidate(key))
            .collect()
    }

    /// Insert a persisted entry as-is.
    pub fn restore(
        &mut self,
        key: CacheKey,
        value: CacheValue,
        fetched_at: TimeMs,
    ) -> Result<(), CacheError> {
        if !value.fits(&key) {
            return Err(CacheError::KindMismatch(key.to_string()));
        }
        self.entries.insert(
            key,
            CacheEntry {
                value,
                fetched_at,
                generation: 0,
            },
        );
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn epoch_status(&self) -> Option<&EpochStatus> {
        match self.get(&CacheKey::EpochInfo) {
            Some(CacheValue::EpochInfo(v)) => Some(v),
            _ => None,
        }
    }

    pub fn vault_metrics(&self) -> Option<&VaultMetrics> {
        match self.get(&CacheKey::VaultMetrics) {
            Some(CacheValue::VaultMetrics(v)) => Some(v),
            _ => None,
        }
    }

    pub fn position(&self, account: &Address) -> Option<&AccountPosition> {
        match self.get(&CacheKey::Position(account.clone())) {
            Some(CacheValue::Position(v)) => Some(v),
            _ => None,
        }
    }

    pub fn deposit(&self, account: &Address) -> Option<&AccountDeposit> {
        match self.get(&CacheKey::Deposit(account.clone())) {
            Some(CacheValue::Deposit(v)) => Some(v),
            _ => None,
        }
    }

    pub fn dashboard(&self, account: &Address) -> Option<&UserDashboard> {
        match self.get(&CacheKey::Dashboard(account.clone())) {
            Some(CacheValue::Dashboard(v)) => Some(v),
            _ => None,
        }
    }
}
