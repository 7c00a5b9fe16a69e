//! Expense-sharing group types
//!
//! Invariant: the creator is always a member. Membership changes and group
//! deletion policy are enforced at the store boundary, not here; this type
//! only carries the read-only roster copy.

use crate::ids::{GroupId, UserId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// An expense-sharing group.
///
/// Members are held in a `BTreeSet` so iteration order is deterministic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    pub group_id: GroupId,
    pub name: String,
    pub members: BTreeSet<UserId>,
    pub creator: UserId,
    /// Unix nanoseconds timestamp
    pub created_at: i64,
}

impl Group {
    /// Create a new group. The creator is inserted into the member set.
    pub fn new(
        group_id: GroupId,
        name: impl Into<String>,
        members: impl IntoIterator<Item = UserId>,
        creator: UserId,
        created_at: i64,
    ) -> Self {
        let mut members: BTreeSet<UserId> = members.into_iter().collect();
        members.insert(creator.clone());
        Self {
            group_id,
            name: name.into(),
            members,
            creator,
            created_at,
        }
    }

    /// Check the group invariant: creator ∈ members, members non-empty.
    pub fn check_invariant(&self) -> bool {
        !self.members.is_empty() && self.members.contains(&self.creator)
    }

    /// Whether the given user is a member.
    pub fn is_member(&self, user_id: &UserId) -> bool {
        self.members.contains(user_id)
    }

    /// Number of members.
    pub fn member_count(&self) -> usize {
        self.members.len()
    }
}
