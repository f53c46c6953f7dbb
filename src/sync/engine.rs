//! The reconciliation engine: cache, optimistic ledger and account session
//! behind one handle.
//!
//! Refresh cycles are single-flight. A non-forced request that arrives while
//! a cycle runs is dropped; a forced one is queued and run by the in-flight
//! runner as soon as its cycle ends.

use super::view::{Notification, SyncView};
use super::SyncError;
use crate::cache::{CacheKey, CacheStore, CacheValue, PutOutcome};
use crate::clock::Clock;
use crate::db::{PersistedEntry, Repository, StoreError};
use crate::domain::{
    AccountDeposit, AccountPosition, Address, CookingStatus, Decimal, EpochStatus, RiskTier,
    TimeMs, UserDashboard, VaultMetrics,
};
use crate::fetch::{FetchError, Fetcher};
use crate::ledger::{MutationId, MutationKind, OptimisticLedger};
use std::collections::VecDeque;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};

pub const MAX_NOTIFICATIONS: usize = 20;

#[derive(Debug, Clone)]
pub struct SyncSettings {
    pub freshness_ms: i64,
    pub optimistic_expiry_ms: i64,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            freshness_ms: crate::cache::DEFAULT_FRESHNESS_MS,
            optimistic_expiry_ms: crate::ledger::DEFAULT_EXPIRY_MS,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RefreshOptions {
    /// Must not be dropped by the single-flight guard.
    pub forced: bool,
    /// Flag the cycle as a visible background refresh.
    pub show_loading: bool,
}

impl RefreshOptions {
    pub fn background() -> Self {
        Self::default()
    }

    pub fn forced() -> Self {
        Self {
            forced: true,
            show_loading: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    Completed,
    /// Another cycle was running and the request was not forced.
    Skipped,
    /// Another cycle was running; it will run one more cycle afterwards.
    Queued,
}

#[derive(Debug, Default)]
struct RefreshState {
    running: bool,
    forced_pending: bool,
}

/// State scoped to the connected account. Replaced on identity change.
#[derive(Debug, Default)]
struct Session {
    id: u64,
    account: Option<Address>,
    epoch_info: Option<EpochStatus>,
    vault_metrics: Option<VaultMetrics>,
    position: Option<AccountPosition>,
    deposit: Option<AccountDeposit>,
    dashboard: Option<UserDashboard>,
    initial_loading: bool,
    background_refreshing: bool,
    last_successful_fetch: Option<TimeMs>,
    error: Option<String>,
}

#[derive(Debug, Default)]
struct Notifications {
    items: VecDeque<Notification>,
    next_id: u64,
}

/// Result of one cache-or-remote lookup within a cycle.
#[derive(Debug, Default)]
struct Lookup {
    value: Option<CacheValue>,
    stored: bool,
    failure: Option<String>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug)]
pub struct SyncEngine {
    fetcher: Fetcher,
    clock: Arc<dyn Clock>,
    cache: Mutex<CacheStore>,
    ledger: Mutex<OptimisticLedger>,
    session: Mutex<Session>,
    notifications: Mutex<Notifications>,
    refresh: Mutex<RefreshState>,
    generation: AtomicU64,
    repo: Option<Repository>,
}

/// Clears the running flag if a cycle future is dropped midway.
struct RunningGuard<'a> {
    state: &'a Mutex<RefreshState>,
    armed: bool,
}

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            lock(self.state).running = false;
        }
    }
}

impl SyncEngine {
    pub fn new(fetcher: Fetcher, clock: Arc<dyn Clock>, settings: SyncSettings) -> Self {
        Self {
            fetcher,
            cache: Mutex::new(CacheStore::new(clock.clone(), settings.freshness_ms)),
            ledger: Mutex::new(OptimisticLedger::new(settings.optimistic_expiry_ms)),
            clock,
            session: Mutex::new(Session::default()),
            notifications: Mutex::new(Notifications::default()),
            refresh: Mutex::new(RefreshState::default()),
            generation: AtomicU64::new(0),
            repo: None,
        }
    }

    /// Write cycle results through to SQLite.
    pub fn with_repository(mut self, repo: Repository) -> Self {
        self.repo = Some(repo);
        self
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn account(&self) -> Option<Address> {
        lock(&self.session).account.clone()
    }

    pub fn is_refreshing(&self) -> bool {
        lock(&self.refresh).running
    }

    /// Seed the cache with persisted entries.
    pub fn hydrate(&self, entries: Vec<PersistedEntry>) -> usize {
        let mut restored = 0;
        {
            let mut cache = lock(&self.cache);
            for entry in entries {
                match cache.restore(entry.key, entry.value, entry.fetched_at) {
                    Ok(()) => restored += 1,
                    Err(e) => warn!("Ignoring persisted entry: {}", e),
                }
            }
        }
        self.reload_session_from_cache();
        info!("Hydrated {} cache entries", restored);
        restored
    }

    pub async fn load_persisted(&self) -> Result<usize, StoreError> {
        match &self.repo {
            Some(repo) => Ok(self.hydrate(repo.load_cache_entries().await?)),
            None => Ok(0),
        }
    }

    fn reload_session_from_cache(&self) {
        let mut session = lock(&self.session);
        let cache = lock(&self.cache);
        session.epoch_info = cache.epoch_status().cloned();
        session.vault_metrics = cache.vault_metrics().cloned();
        if let Some(account) = session.account.clone() {
            session.position = cache.position(&account).cloned();
            session.deposit = cache.deposit(&account).cloned();
            session.dashboard = cache.dashboard(&account).cloned();
        }
    }

    /// Switch the connected account. Returns false if it did not change.
    ///
    /// Cached values for the new account are shown at once. The caller is
    /// expected to follow up with a forced refresh.
    pub fn set_account(&self, account: Option<Address>) -> bool {
        let mut session = lock(&self.session);
        if session.account == account {
            return false;
        }
        info!(
            "Account changed: {:?} -> {:?}",
            session.account.as_ref().map(Address::as_str),
            account.as_ref().map(Address::as_str)
        );

        let cache = lock(&self.cache);
        let (position, deposit, dashboard) = match &account {
            Some(a) => (
                cache.position(a).cloned(),
                cache.deposit(a).cloned(),
                cache.dashboard(a).cloned(),
            ),
            None => (None, None, None),
        };
        let initial_loading = account.is_some() && position.is_none() && dashboard.is_none();

        *session = Session {
            id: session.id + 1,
            account,
            epoch_info: cache.epoch_status().cloned(),
            vault_metrics: cache.vault_metrics().cloned(),
            position,
            deposit,
            dashboard,
            initial_loading,
            background_refreshing: false,
            last_successful_fetch: None,
            error: None,
        };
        true
    }

    /// Run a refresh cycle, subject to the single-flight policy.
    ///
    /// The error is the initiator's; passive readers only see it through
    /// the view when no cycle of this session has succeeded yet.
    pub async fn refresh_data(&self, options: RefreshOptions) -> Result<RefreshOutcome, SyncError> {
        {
            let mut state = lock(&self.refresh);
            if state.running {
                if options.forced {
                    debug!("Refresh in flight; queueing forced refresh");
                    state.forced_pending = true;
                    return Ok(RefreshOutcome::Queued);
                }
                debug!("Refresh in flight; skipping");
                return Ok(RefreshOutcome::Skipped);
            }
            state.running = true;
        }
        let mut guard = RunningGuard {
            state: &self.refresh,
            armed: true,
        };

        let mut result = self.run_cycle(options.show_loading).await;
        loop {
            let again = {
                let mut state = lock(&self.refresh);
                if state.forced_pending {
                    state.forced_pending = false;
                    true
                } else {
                    state.running = false;
                    guard.armed = false;
                    false
                }
            };
            if !again {
                break;
            }
            debug!("Running queued forced refresh");
            self.drop_account_entries().await;
            result = self.run_cycle(true).await;
        }

        result.map(|()| RefreshOutcome::Completed)
    }

    /// Drop the connected account's cached entries and refresh.
    pub async fn force_refresh(&self) -> Result<RefreshOutcome, SyncError> {
        self.drop_account_entries().await;
        self.refresh_data(RefreshOptions {
            forced: true,
            show_loading: true,
        })
        .await
    }

    async fn drop_account_entries(&self) {
        let Some(account) = self.account() else {
            return;
        };
        let removed = lock(&self.cache).invalidate_account(&account);
        debug!("Invalidated {} cache entries for {}", removed.len(), account);
        if let Some(repo) = &self.repo {
            if let Err(e) = repo.delete_cache_entries(&removed).await {
                warn!("Failed to delete persisted entries: {}", e);
            }
        }
    }

    async fn run_cycle(&self, show_loading: bool) -> Result<(), SyncError> {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let (session_id, account) = {
            let mut session = lock(&self.session);
            if show_loading && !session.initial_loading {
                session.background_refreshing = true;
            }
            (session.id, session.account.clone())
        };
        debug!("Refresh cycle {} started (account {:?})", generation, account);

        let mut stored = Vec::new();
        let mut failures = Vec::new();
        let mut collect = |key: CacheKey, lookup: Lookup| {
            if lookup.stored {
                stored.push(key);
            }
            if let Some(failure) = lookup.failure {
                failures.push(failure);
            }
            lookup.value
        };

        // Global data first: the dashboard needs the current epoch.
        let (epoch_lookup, metrics_lookup) = futures::join!(
            self.read_through(&CacheKey::EpochInfo, generation, async {
                self.fetcher
                    .fetch_epoch_status()
                    .await
                    .map(CacheValue::EpochInfo)
            }),
            self.read_through(&CacheKey::VaultMetrics, generation, async {
                self.fetcher
                    .fetch_vault_metrics()
                    .await
                    .map(CacheValue::VaultMetrics)
            }),
        );
        let epoch_info = match collect(CacheKey::EpochInfo, epoch_lookup) {
            Some(CacheValue::EpochInfo(v)) => Some(v),
            _ => None,
        };
        let vault_metrics = match collect(CacheKey::VaultMetrics, metrics_lookup) {
            Some(CacheValue::VaultMetrics(v)) => Some(v),
            _ => None,
        };

        let mut account_data = None;
        if let Some(account) = &account {
            let position_key = CacheKey::Position(account.clone());
            let deposit_key = CacheKey::Deposit(account.clone());
            let dashboard_key = CacheKey::Dashboard(account.clone());

            let (position_lookup, deposit_lookup) = futures::join!(
                self.read_through(&position_key, generation, async {
                    self.fetcher
                        .fetch_position(account)
                        .await
                        .map(CacheValue::Position)
                }),
                self.read_through(&deposit_key, generation, async {
                    self.fetcher
                        .fetch_deposit(account)
                        .await
                        .map(CacheValue::Deposit)
                }),
            );
            let position = match collect(position_key, position_lookup) {
                Some(CacheValue::Position(v)) => Some(v),
                _ => None,
            };
            let deposit = match collect(deposit_key, deposit_lookup) {
                Some(CacheValue::Deposit(v)) => Some(v),
                _ => None,
            };

            let dashboard_lookup = self
                .read_through(&dashboard_key, generation, async {
                    self.fetcher
                        .fetch_dashboard(account, epoch_info.as_ref(), position.as_ref())
                        .await
                        .map(CacheValue::Dashboard)
                })
                .await;
            let dashboard = match collect(dashboard_key, dashboard_lookup) {
                Some(CacheValue::Dashboard(v)) => Some(v),
                _ => None,
            };
            account_data = Some((position, deposit, dashboard));
        }

        let now = self.clock.now();
        let outcome = if failures.is_empty() {
            Ok(())
        } else {
            Err(SyncError::RefreshFailed(failures.join("; ")))
        };

        {
            let mut session = lock(&self.session);
            if session.id != session_id {
                debug!(
                    "Refresh cycle {} finished after an account change; not applied",
                    generation
                );
            } else {
                if epoch_info.is_some() {
                    session.epoch_info = epoch_info;
                }
                if vault_metrics.is_some() {
                    session.vault_metrics = vault_metrics;
                }
                if let Some((position, deposit, dashboard)) = account_data {
                    if position.is_some() {
                        session.position = position;
                    }
                    if deposit.is_some() {
                        session.deposit = deposit;
                    }
                    if dashboard.is_some() {
                        session.dashboard = dashboard;
                    }
                }

                match &outcome {
                    Ok(()) => {
                        session.last_successful_fetch = Some(now);
                        session.error = None;
                    }
                    Err(e) if session.last_successful_fetch.is_none() => {
                        warn!("Refresh cycle {} failed: {}", generation, e);
                        session.error = Some(format!("Failed to load data: {}", e));
                    }
                    Err(e) => {
                        warn!("Background refresh cycle {} failed: {}", generation, e);
                    }
                }
                session.initial_loading = false;
                session.background_refreshing = false;
            }
        }

        if outcome.is_ok() {
            lock(&self.ledger).sweep_expired(now);
        }
        self.persist(&stored).await;
        debug!("Refresh cycle {} finished", generation);
        outcome
    }

    async fn read_through<F>(&self, key: &CacheKey, generation: u64, fetch: F) -> Lookup
    where
        F: Future<Output = Result<CacheValue, FetchError>>,
    {
        if let Some(value) = self.fresh_value(key) {
            debug!("{} is fresh; skipping fetch", key);
            return Lookup {
                value: Some(value),
                ..Lookup::default()
            };
        }

        match fetch.await {
            Ok(value) => {
                let mut cache = lock(&self.cache);
                match cache.put_stamped(key.clone(), value.clone(), generation) {
                    Ok(PutOutcome::Stored) => Lookup {
                        value: Some(value),
                        stored: true,
                        failure: None,
                    },
                    Ok(PutOutcome::DiscardedStale) => Lookup {
                        value: cache.get(key).cloned(),
                        ..Lookup::default()
                    },
                    Err(e) => Lookup {
                        value: cache.get(key).cloned(),
                        stored: false,
                        failure: Some(e.to_string()),
                    },
                }
            }
            Err(e) => {
                debug!("{}; serving cached {}", e, key);
                Lookup {
                    value: lock(&self.cache).get(key).cloned(),
                    stored: false,
                    failure: Some(e.to_string()),
                }
            }
        }
    }

    fn fresh_value(&self, key: &CacheKey) -> Option<CacheValue> {
        let cache = lock(&self.cache);
        if cache.is_fresh(key) {
            cache.get(key).cloned()
        } else {
            None
        }
    }

    async fn persist(&self, keys: &[CacheKey]) {
        let Some(repo) = &self.repo else {
            return;
        };
        let entries: Vec<_> = {
            let cache = lock(&self.cache);
            keys.iter()
                .filter_map(|k| cache.entry(k).map(|e| (k.clone(), e.clone())))
                .collect()
        };
        if let Err(e) = repo.save_cache_entries(&entries).await {
            warn!("Failed to persist cache entries: {}", e);
        }
    }

    /// Record a pending mutation for the connected account.
    pub fn record_mutation(&self, kind: MutationKind) -> Result<(Address, MutationId), SyncError> {
        let account = self.account().ok_or(SyncError::NotConnected)?;
        let id = lock(&self.ledger).record(&account, kind, self.clock.now());
        Ok((account, id))
    }

    pub fn add_optimistic_deposit(
        &self,
        amount: Decimal,
        asset: impl Into<String>,
        risk_tier: RiskTier,
    ) -> Result<MutationId, SyncError> {
        self.record_mutation(MutationKind::Deposit {
            amount,
            asset: asset.into(),
            risk_tier,
        })
        .map(|(_, id)| id)
    }

    pub fn add_optimistic_withdrawal(&self) -> Result<MutationId, SyncError> {
        self.record_mutation(MutationKind::WithdrawalRequest)
            .map(|(_, id)| id)
    }

    pub fn add_optimistic_claim(&self, epoch_number: u64) -> Result<MutationId, SyncError> {
        self.record_mutation(MutationKind::Claim { epoch_number })
            .map(|(_, id)| id)
    }

    pub fn add_optimistic_risk_update(&self, risk_tier: RiskTier) -> Result<MutationId, SyncError> {
        self.record_mutation(MutationKind::RiskUpdate { risk_tier })
            .map(|(_, id)| id)
    }

    /// Returns whether the entry was still pending.
    pub fn resolve_optimistic_update(&self, id: MutationId) -> bool {
        lock(&self.ledger).resolve(id).is_some()
    }

    pub fn sweep_expired(&self) -> usize {
        lock(&self.ledger).sweep_expired(self.clock.now()).len()
    }

    pub fn notify(&self, message: impl Into<String>) -> u64 {
        let mut notifications = lock(&self.notifications);
        notifications.next_id += 1;
        let id = notifications.next_id;
        notifications.items.push_back(Notification {
            id,
            message: message.into(),
            created_at: self.clock.now(),
        });
        while notifications.items.len() > MAX_NOTIFICATIONS {
            notifications.items.pop_front();
        }
        id
    }

    pub fn dismiss_notification(&self, id: u64) -> bool {
        let mut notifications = lock(&self.notifications);
        let before = notifications.items.len();
        notifications.items.retain(|n| n.id != id);
        notifications.items.len() != before
    }

    pub fn dismiss_error(&self) {
        lock(&self.session).error = None;
    }

    /// Projected deposits (authoritative plus pending) are positive.
    pub fn has_user_deposits(&self) -> bool {
        let session = lock(&self.session);
        let (Some(account), Some(position)) = (&session.account, &session.position) else {
            return false;
        };
        let pending = lock(&self.ledger).pending_deposit_total(account);
        (position.total_deposited + pending).is_positive()
    }

    /// The merged view: authoritative values with pending mutations applied.
    pub fn view(&self) -> SyncView {
        let session = lock(&self.session);
        let ledger = lock(&self.ledger);
        let notifications = lock(&self.notifications).items.iter().cloned().collect();

        let (account_position, user_dashboard, pending, pending_deposits) = match &session.account
        {
            Some(account) => (
                session
                    .position
                    .as_ref()
                    .map(|p| ledger.project_position(account, p)),
                session
                    .dashboard
                    .as_ref()
                    .map(|d| ledger.project_dashboard(account, d)),
                ledger.pending_for(account),
                ledger.pending_deposit_total(account),
            ),
            None => (None, None, Vec::new(), Decimal::zero()),
        };

        let cooking = session.epoch_info.as_ref().and_then(|epoch| {
            CookingStatus::compute(
                epoch.epoch_number,
                session.deposit.as_ref(),
                epoch.time_remaining,
            )
        });
        let has_user_deposits = session
            .position
            .as_ref()
            .map(|p| (p.total_deposited + pending_deposits).is_positive())
            .unwrap_or(false);

        SyncView {
            account: session.account.clone(),
            epoch_info: session.epoch_info.clone(),
            vault_metrics: session.vault_metrics.clone(),
            account_position,
            account_deposit: session.deposit.clone(),
            user_dashboard,
            cooking,
            initial_loading: session.initial_loading,
            background_refreshing: session.background_refreshing,
            last_successful_fetch_time: session
                .last_successful_fetch
                .and_then(|t| chrono::DateTime::<chrono::Utc>::from_timestamp_millis(t.as_ms())),
            error: session.error.clone(),
            has_pending_optimistic_updates: !pending.is_empty(),
            has_user_deposits,
            pending_mutations: pending,
            notifications,
        }
    }

    /// Raw cache access, for inspection.
    pub fn cached(&self, key: &CacheKey) -> Option<CacheValue> {
        lock(&self.cache).get(key).cloned()
    }
}
