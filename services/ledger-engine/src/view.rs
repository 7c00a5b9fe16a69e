//! Derived view store
//!
//! Holds the latest raw slices (group roster, participant expense set) and
//! the materialized balance state per scope. Whenever a slice is replaced,
//! every affected scope is recomputed synchronously from scratch and the
//! new state atomically replaces the old one. Scopes are independent:
//! a recompute never mixes one scope's fresh state with another's stale
//! state, because each is rebuilt from the same raw slices in the same
//! pass.

use tracing::debug;
use types::balance::{BalanceState, ScopeId};
use types::errors::RecordError;
use types::group::Group;
use types::ids::UserId;
use types::record::LedgerRecord;

use crate::ledger;

use std::collections::{BTreeMap, BTreeSet};

/// Materialized groups, expenses, and balances.
#[derive(Debug, Default)]
pub struct DerivedViewStore {
    groups: Vec<Group>,
    expenses: Vec<LedgerRecord>,
    balances: BTreeMap<ScopeId, BalanceState>,
}

impl DerivedViewStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Latest known group roster.
    pub fn groups(&self) -> &[Group] {
        &self.groups
    }

    /// Latest known expense slice.
    pub fn expenses(&self) -> &[LedgerRecord] {
        &self.expenses
    }

    /// Materialized balance state for a scope, if computed.
    pub fn balances(&self, scope: &ScopeId) -> Option<&BalanceState> {
        self.balances.get(scope)
    }

    /// All scopes currently materialized, in deterministic order.
    pub fn scopes(&self) -> Vec<ScopeId> {
        self.balances.keys().copied().collect()
    }

    /// Replace the roster slice and recompute. Returns the scopes whose
    /// balance state changed plus any record faults encountered.
    pub fn apply_groups(&mut self, groups: Vec<Group>) -> (Vec<ScopeId>, Vec<RecordError>) {
        let mut groups = groups;
        groups.sort_by_key(|g| g.group_id);
        self.groups = groups;
        self.recompute()
    }

    /// Replace the expense slice and recompute.
    pub fn apply_expenses(
        &mut self,
        records: Vec<LedgerRecord>,
    ) -> (Vec<ScopeId>, Vec<RecordError>) {
        self.expenses = records;
        self.recompute()
    }

    /// Drop all raw slices and derived state (identity change).
    pub fn clear(&mut self) -> Vec<ScopeId> {
        let dropped = self.scopes();
        self.groups.clear();
        self.expenses.clear();
        self.balances.clear();
        dropped
    }

    /// Full recompute of every scope from the latest raw slices.
    fn recompute(&mut self) -> (Vec<ScopeId>, Vec<RecordError>) {
        let mut fresh: BTreeMap<ScopeId, BalanceState> = BTreeMap::new();
        let mut faults = Vec::new();

        // One scope per roster group.
        for group in &self.groups {
            let scope = ScopeId::Group(group.group_id);
            let records: Vec<LedgerRecord> = self
                .expenses
                .iter()
                .filter(|r| r.scope() == scope)
                .cloned()
                .collect();
            let (state, mut scope_faults) = ledger::build_balances(&group.members, &records);
            faults.append(&mut scope_faults);
            fresh.insert(scope, state);
        }

        // The "no group" scope covers peer-to-peer records; its member set
        // is derived from the records themselves.
        let personal: Vec<LedgerRecord> = self
            .expenses
            .iter()
            .filter(|r| r.scope() == ScopeId::Personal)
            .cloned()
            .collect();
        let members = personal_members(&personal);
        let (state, mut personal_faults) = ledger::build_balances(&members, &personal);
        faults.append(&mut personal_faults);
        fresh.insert(ScopeId::Personal, state);

        // Change detection: a scope changed if its state differs, appeared,
        // or was dropped from the roster.
        let mut changed: BTreeSet<ScopeId> = BTreeSet::new();
        for (scope, state) in &fresh {
            if self.balances.get(scope) != Some(state) {
                changed.insert(*scope);
            }
        }
        for scope in self.balances.keys() {
            if !fresh.contains_key(scope) {
                changed.insert(*scope);
            }
        }

        debug!(
            scopes = fresh.len(),
            changed = changed.len(),
            faults = faults.len(),
            "View recomputed"
        );

        self.balances = fresh;
        (changed.into_iter().collect(), faults)
    }
}

/// Everyone appearing in a peer-to-peer record: payers, participants,
/// settlement creditors.
fn personal_members(records: &[LedgerRecord]) -> BTreeSet<UserId> {
    let mut members = BTreeSet::new();
    for record in records {
        members.insert(record.payer().clone());
        match record {
            LedgerRecord::Expense { participants, .. } => {
                members.extend(participants.iter().cloned());
            }
            LedgerRecord::Settlement { creditor, .. } => {
                members.insert(creditor.clone());
            }
        }
    }
    members
}
