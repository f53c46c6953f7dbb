//! Pending user mutations and the projected view they produce.
//!
//! Projection is a fold of [`apply_to_position`] / [`apply_to_dashboard`]
//! over the connected account's entries in creation order. Deposit amounts
//! accumulate; tier, withdrawal flag and claim status are last-wins.

use crate::domain::{AccountPosition, Address, Decimal, RiskTier, TimeMs, UserDashboard};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::{debug, info};
use uuid::Uuid;

pub const DEFAULT_EXPIRY_MS: i64 = 30_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MutationId(Uuid);

impl MutationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for MutationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MutationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for MutationId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum MutationKind {
    #[serde(rename_all = "camelCase")]
    Deposit {
        amount: Decimal,
        asset: String,
        risk_tier: RiskTier,
    },
    WithdrawalRequest,
    #[serde(rename_all = "camelCase")]
    Claim { epoch_number: u64 },
    #[serde(rename_all = "camelCase")]
    RiskUpdate { risk_tier: RiskTier },
}

impl MutationKind {
    pub fn label(&self) -> &'static str {
        match self {
            MutationKind::Deposit { .. } => "deposit",
            MutationKind::WithdrawalRequest => "withdrawal",
            MutationKind::Claim { .. } => "claim",
            MutationKind::RiskUpdate { .. } => "risk update",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingMutation {
    pub id: MutationId,
    pub account: Address,
    pub kind: MutationKind,
    pub created_at: TimeMs,
    /// Tie-break for entries created in the same millisecond.
    #[serde(skip)]
    pub seq: u64,
}

/// Position with one pending mutation applied.
pub fn apply_to_position(base: &AccountPosition, kind: &MutationKind) -> AccountPosition {
    let mut next = base.clone();
    match kind {
        MutationKind::Deposit {
            amount, risk_tier, ..
        } => {
            next.total_deposited = next.total_deposited + *amount;
            next.risk_tier = *risk_tier;
        }
        MutationKind::WithdrawalRequest => next.withdrawal_requested = true,
        MutationKind::RiskUpdate { risk_tier } => next.risk_tier = *risk_tier,
        MutationKind::Claim { .. } => {}
    }
    next
}

/// Dashboard with one pending mutation applied.
pub fn apply_to_dashboard(base: &UserDashboard, kind: &MutationKind) -> UserDashboard {
    let mut next = base.clone();
    match kind {
        MutationKind::Deposit {
            amount, risk_tier, ..
        } => {
            next.total_deposited = next.total_deposited + *amount;
            next.has_active_deposit = true;
            next.risk_tier = *risk_tier;
        }
        MutationKind::RiskUpdate { risk_tier } => next.risk_tier = *risk_tier,
        MutationKind::Claim { epoch_number } => {
            for info in next
                .recent_epochs_info
                .iter_mut()
                .filter(|e| e.epoch_number == *epoch_number)
            {
                info.has_claimed = true;
            }
            next.claimable_epochs.retain(|e| e != epoch_number);
            next.recompute_totals();
        }
        MutationKind::WithdrawalRequest => {}
    }
    next
}

#[derive(Debug)]
pub struct OptimisticLedger {
    entries: Vec<PendingMutation>,
    expiry_ms: i64,
    next_seq: u64,
}

impl OptimisticLedger {
    pub fn new(expiry_ms: i64) -> Self {
        Self {
            entries: Vec::new(),
            expiry_ms,
            next_seq: 0,
        }
    }

    pub fn record(&mut self, account: &Address, kind: MutationKind, now: TimeMs) -> MutationId {
        let id = MutationId::new();
        info!("Recording pending {} {} for {}", kind.label(), id, account);
        self.entries.push(PendingMutation {
            id,
            account: account.clone(),
            kind,
            created_at: now,
            seq: self.next_seq,
        });
        self.next_seq += 1;
        id
    }

    /// Remove an entry. Unknown ids are a no-op.
    pub fn resolve(&mut self, id: MutationId) -> Option<PendingMutation> {
        let index = self.entries.iter().position(|e| e.id == id)?;
        let removed = self.entries.remove(index);
        debug!("Resolved pending {} {}", removed.kind.label(), id);
        Some(removed)
    }

    /// Drop every entry whose age has reached the expiry window.
    pub fn sweep_expired(&mut self, now: TimeMs) -> Vec<PendingMutation> {
        let expiry_ms = self.expiry_ms;
        let (expired, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut self.entries)
            .into_iter()
            .partition(|e| now.since(e.created_at) >= expiry_ms);
        self.entries = kept;
        if !expired.is_empty() {
            info!("Expired {} pending mutation(s)", expired.len());
        }
        expired
    }

    /// Entries for `account`, oldest first.
    pub fn pending_for(&self, account: &Address) -> Vec<PendingMutation> {
        let mut pending: Vec<PendingMutation> = self
            .entries
            .iter()
            .filter(|e| &e.account == account)
            .cloned()
            .collect();
        pending.sort_by_key(|e| (e.created_at, e.seq));
        pending
    }

    pub fn has_pending(&self, account: &Address) -> bool {
        self.entries.iter().any(|e| &e.account == account)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, id: MutationId) -> bool {
        self.entries.iter().any(|e| e.id == id)
    }

    pub fn project_position(&self, account: &Address, base: &AccountPosition) -> AccountPosition {
        self.pending_for(account)
            .iter()
            .fold(base.clone(), |acc, e| apply_to_position(&acc, &e.kind))
    }

    pub fn project_dashboard(&self, account: &Address, base: &UserDashboard) -> UserDashboard {
        self.pending_for(account)
            .iter()
            .fold(base.clone(), |acc, e| apply_to_dashboard(&acc, &e.kind))
    }

    pub fn pending_deposit_total(&self, account: &Address) -> Decimal {
        self.entries
            .iter()
            .filter(|e| &e.account == account)
            .filter_map(|e| match &e.kind {
                MutationKind::Deposit { amount, .. } => Some(*amount),
                _ => None,
            })
            .sum()
    }
}

impl Default for OptimisticLedger {
    fn default() -> Self {
        Self::new(DEFAULT_EXPIRY_MS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{EpochRewardInfo, RewardParameters};

    fn d(s: &str) -> Decimal {
        Decimal::from_str_canonical(s).unwrap()
    }

    fn alice() -> Address {
        Address::new("0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa".to_string())
    }

    fn bob() -> Address {
        Address::new("0xbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb".to_string())
    }

    fn position() -> AccountPosition {
        AccountPosition {
            share_balance: d("1000"),
            last_mutation_time: 0,
            withdrawal_requested: false,
            withdrawal_available_at: 0,
            risk_tier: RiskTier::Medium,
            total_deposited: d("1000"),
        }
    }

    fn deposit(amount: &str, tier: RiskTier) -> MutationKind {
        MutationKind::Deposit {
            amount: d(amount),
            asset: "FLOW".to_string(),
            risk_tier: tier,
        }
    }

    fn dashboard() -> UserDashboard {
        let params = RewardParameters {
            base_weight: d("1"),
            time_weight: d("1"),
            risk_multiplier: 100,
            total_weight: d("2"),
            win_probability: 1000,
            potential_payout: d("5"),
        };
        UserDashboard::aggregate(
            None,
            Some(&position()),
            vec![3, 4],
            vec![
                EpochRewardInfo::new(3, &params, true, false),
                EpochRewardInfo::new(4, &params, true, false),
            ],
            Decimal::zero(),
        )
    }

    #[test]
    fn test_apply_deposit_to_position() {
        let next = apply_to_position(&position(), &deposit("500", RiskTier::Aggressive));
        assert_eq!(next.total_deposited, d("1500"));
        assert_eq!(next.risk_tier, RiskTier::Aggressive);
        assert_eq!(next.share_balance, d("1000"));
    }

    #[test]
    fn test_apply_withdrawal_and_risk_update_to_position() {
        let next = apply_to_position(&position(), &MutationKind::WithdrawalRequest);
        assert!(next.withdrawal_requested);

        let next = apply_to_position(
            &position(),
            &MutationKind::RiskUpdate {
                risk_tier: RiskTier::Low,
            },
        );
        assert_eq!(next.risk_tier, RiskTier::Low);
    }

    #[test]
    fn test_apply_claim_leaves_position_untouched() {
        let next = apply_to_position(&position(), &MutationKind::Claim { epoch_number: 3 });
        assert_eq!(next, position());
    }

    #[test]
    fn test_apply_claim_to_dashboard() {
        let base = dashboard();
        assert_eq!(base.total_claimable_rewards, d("10"));

        let next = apply_to_dashboard(&base, &MutationKind::Claim { epoch_number: 3 });
        assert_eq!(next.claimable_epochs, vec![4]);
        let claimed = &next.recent_epochs_info[0];
        assert!(claimed.has_claimed);
        assert!(!claimed.can_claim());
        assert_eq!(next.total_claimable_rewards, d("5"));
    }

    #[test]
    fn test_apply_deposit_to_dashboard() {
        let mut base = dashboard();
        base.has_active_deposit = false;
        let next = apply_to_dashboard(&base, &deposit("1", RiskTier::Low));
        assert!(next.has_active_deposit);
        assert_eq!(next.total_deposited, d("1001"));
        assert_eq!(next.risk_tier, RiskTier::Low);
    }

    #[test]
    fn test_deposits_accumulate_and_last_tier_wins() {
        let mut ledger = OptimisticLedger::default();
        let now = TimeMs::new(0);
        ledger.record(&alice(), deposit("1.5", RiskTier::Low), now);
        ledger.record(&alice(), deposit("2.5", RiskTier::Aggressive), now);
        ledger.record(
            &alice(),
            MutationKind::RiskUpdate {
                risk_tier: RiskTier::Medium,
            },
            now,
        );

        let projected = ledger.project_position(&alice(), &position());
        assert_eq!(projected.total_deposited, d("1004"));
        assert_eq!(projected.risk_tier, RiskTier::Medium);
        assert_eq!(ledger.pending_deposit_total(&alice()), d("4"));
    }

    #[test]
    fn test_projection_ignores_other_accounts() {
        let mut ledger = OptimisticLedger::default();
        ledger.record(&bob(), deposit("500", RiskTier::Low), TimeMs::new(0));
        assert_eq!(ledger.project_position(&alice(), &position()), position());
        assert!(!ledger.has_pending(&alice()));
        assert!(ledger.has_pending(&bob()));
    }

    #[test]
    fn test_resolve_returns_to_base() {
        let mut ledger = OptimisticLedger::default();
        let id = ledger.record(&alice(), deposit("500", RiskTier::Medium), TimeMs::new(0));
        assert_eq!(
            ledger.project_position(&alice(), &position()).total_deposited,
            d("1500")
        );

        assert!(ledger.resolve(id).is_some());
        assert!(ledger.resolve(id).is_none());
        assert_eq!(ledger.project_position(&alice(), &position()), position());
    }

    #[test]
    fn test_sweep_removes_entries_at_expiry() {
        let mut ledger = OptimisticLedger::new(30_000);
        let old = ledger.record(&alice(), MutationKind::WithdrawalRequest, TimeMs::new(0));
        let young = ledger.record(&alice(), MutationKind::WithdrawalRequest, TimeMs::new(10_000));

        assert!(ledger.sweep_expired(TimeMs::new(29_999)).is_empty());

        let expired = ledger.sweep_expired(TimeMs::new(30_000));
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].id, old);
        assert!(ledger.contains(young));
        assert!(!ledger.contains(old));
    }

    #[test]
    fn test_mutation_kind_serializes_tagged() {
        let json = serde_json::to_value(MutationKind::Claim { epoch_number: 9 }).unwrap();
        assert_eq!(json, serde_json::json!({"type": "claim", "epochNumber": 9}));
        let json = serde_json::to_value(MutationKind::WithdrawalRequest).unwrap();
        assert_eq!(json, serde_json::json!({"type": "withdrawalRequest"}));
    }
}
