//! Scopes and derived balance state
//!
//! A `BalanceState` is derived, never persisted: it is recomputed from
//! scratch on every relevant snapshot and atomically replaces the prior
//! value. `BTreeMap` keys keep iteration deterministic.

use crate::ids::{GroupId, UserId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A balance-computation boundary: a specific group, or the sentinel
/// "no group" context for peer-to-peer expenses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ScopeId {
    Group(GroupId),
    Personal,
}

impl fmt::Display for ScopeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScopeId::Group(group_id) => write!(f, "group:{group_id}"),
            ScopeId::Personal => write!(f, "personal"),
        }
    }
}

/// Materialized balances for one scope.
///
/// Invariant: every pairwise amount is strictly positive (netted down to a
/// single direction per pair), and the signed net amounts sum to zero.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BalanceState {
    /// (debtor, creditor) → owed amount, netted and strictly positive.
    pub pairwise: BTreeMap<(UserId, UserId), Decimal>,
    /// user → net signed position (positive = is owed money).
    pub net: BTreeMap<UserId, Decimal>,
}

impl BalanceState {
    /// Amount the debtor owes the creditor after netting. Zero when no
    /// debt runs in that direction.
    pub fn owed(&self, debtor: &UserId, creditor: &UserId) -> Decimal {
        self.pairwise
            .get(&(debtor.clone(), creditor.clone()))
            .copied()
            .unwrap_or(Decimal::ZERO)
    }

    /// Net signed position of a user within this scope.
    pub fn net_of(&self, user_id: &UserId) -> Decimal {
        self.net.get(user_id).copied().unwrap_or(Decimal::ZERO)
    }

    /// Check the conservation invariant: net positions sum to zero.
    pub fn conservation_holds(&self) -> bool {
        self.net.values().sum::<Decimal>() == Decimal::ZERO
    }

    /// Whether this scope carries any debt at all.
    pub fn is_settled(&self) -> bool {
        self.pairwise.is_empty()
    }
}
