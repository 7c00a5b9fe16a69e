//! Subscription coordinator
//!
//! Owns the set of active streaming subscriptions so that it always matches
//! what the current identity should be watching, and no more. Exactly two
//! streams are opened per identity: the group roster and the participant
//! expense stream; per-group expense sets are derived client-side, keeping
//! the concurrent stream count constant as group count grows.
//!
//! Subscription ids are minted from a monotonic counter and never reused,
//! so a snapshot arriving after its subscription was closed (including a
//! stale async teardown racing a fresh resubscribe) is always identifiable
//! and dropped.
//!
//! The coordinator also owns the entity cache lifecycle: created on
//! identity acquisition, discarded on identity loss.

use tracing::{debug, info};

use crate::cache::EntityCache;
use crate::events::StreamSource;
use crate::store::{Predicate, Query, StoreCommand, SubscriptionId, EXPENSES, GROUPS};
use types::profile::Identity;

use std::collections::BTreeMap;

/// Tracks which subscriptions are live for the current identity and emits
/// the store commands to keep the transport in sync.
#[derive(Debug)]
pub struct SubscriptionCoordinator {
    identity: Option<Identity>,
    /// Incremented on every identity change. Diagnostic only; staleness
    /// checks go through the never-reused subscription ids.
    epoch: u64,
    next_subscription: u64,
    active: BTreeMap<SubscriptionId, StreamSource>,
    cache: Option<EntityCache>,
    max_records_per_query: usize,
}

impl SubscriptionCoordinator {
    pub fn new(max_records_per_query: usize) -> Self {
        Self {
            identity: None,
            epoch: 0,
            next_subscription: 1,
            active: BTreeMap::new(),
            cache: None,
            max_records_per_query,
        }
    }

    /// The identity currently subscribed for, if any.
    pub fn identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }

    /// Session epoch, bumped on every identity change.
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// The session-scoped profile cache. `None` while signed out.
    pub fn cache_mut(&mut self) -> Option<&mut EntityCache> {
        self.cache.as_mut()
    }

    pub fn cache(&self) -> Option<&EntityCache> {
        self.cache.as_ref()
    }

    /// Number of live subscriptions.
    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    /// Whether a subscription id is still live. Snapshots for ids that
    /// fail this check must be ignored.
    pub fn is_current(&self, subscription: SubscriptionId) -> bool {
        self.active.contains_key(&subscription)
    }

    /// The stream a live subscription watches.
    pub fn source_of(&self, subscription: SubscriptionId) -> Option<StreamSource> {
        self.active.get(&subscription).copied()
    }

    /// Point the subscription set at a new identity.
    ///
    /// Setting the same identity twice in a row is a no-op. Otherwise every
    /// subscription opened under the previous identity is closed first,
    /// then, if the new identity is present, the roster and participant
    /// streams are opened and a fresh cache is created.
    pub fn set_identity(&mut self, identity: Option<Identity>) -> Vec<StoreCommand> {
        let current = self.identity.as_ref().map(|i| &i.user_id);
        let incoming = identity.as_ref().map(|i| &i.user_id);
        if current == incoming {
            debug!(identity = ?incoming, "Identity user unchanged, subscriptions kept");
            // Same user: keep subscriptions and cache, but refresh session
            // attributes such as the verification flag.
            self.identity = identity;
            return Vec::new();
        }

        let mut commands = Vec::new();
        for (subscription, source) in std::mem::take(&mut self.active) {
            debug!(
                subscription = subscription.value(),
                source = source.label(),
                "Closing subscription"
            );
            commands.push(StoreCommand::Unsubscribe { subscription });
        }

        self.epoch += 1;
        self.cache = None;

        if let Some(identity) = &identity {
            self.cache = Some(EntityCache::new());

            commands.push(self.open(
                StreamSource::GroupRoster,
                Query {
                    collection: GROUPS,
                    predicate: Predicate::ArrayContains {
                        field: "members".to_string(),
                        user_id: identity.user_id.clone(),
                    },
                    limit: self.max_records_per_query,
                },
            ));
            commands.push(self.open(
                StreamSource::ParticipantExpenses,
                Query {
                    collection: EXPENSES,
                    predicate: Predicate::ArrayContains {
                        field: "participants".to_string(),
                        user_id: identity.user_id.clone(),
                    },
                    limit: self.max_records_per_query,
                },
            ));

            info!(
                user_id = %identity.user_id,
                epoch = self.epoch,
                "Identity acquired, subscriptions opened"
            );
        } else {
            info!(epoch = self.epoch, "Identity lost, subscriptions closed");
        }

        self.identity = identity;
        commands
    }

    fn open(&mut self, source: StreamSource, query: Query) -> StoreCommand {
        let subscription = SubscriptionId::new(self.next_subscription);
        self.next_subscription += 1;
        self.active.insert(subscription, source);
        debug!(
            subscription = subscription.value(),
            source = source.label(),
            limit = query.limit,
            "Opening subscription"
        );
        StoreCommand::Subscribe {
            subscription,
            query,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use types::ids::UserId;

    fn coordinator() -> SubscriptionCoordinator {
        SubscriptionCoordinator::new(500)
    }

    fn subscribe_ids(commands: &[StoreCommand]) -> Vec<SubscriptionId> {
        commands
            .iter()
            .filter_map(|c| match c {
                StoreCommand::Subscribe { subscription, .. } => Some(*subscription),
                StoreCommand::Unsubscribe { .. } => None,
            })
            .collect()
    }

    #[test]
    fn test_identity_acquisition_opens_two_streams() {
        let mut coordinator = coordinator();
        let commands = coordinator.set_identity(Some(Identity::verified("alice")));

        assert_eq!(subscribe_ids(&commands).len(), 2);
        assert_eq!(coordinator.active_count(), 2);
        assert!(coordinator.cache().is_some());

        let sources: Vec<StreamSource> = subscribe_ids(&commands)
            .iter()
            .map(|s| coordinator.source_of(*s).unwrap())
            .collect();
        assert!(sources.contains(&StreamSource::GroupRoster));
        assert!(sources.contains(&StreamSource::ParticipantExpenses));
    }

    #[test]
    fn test_set_same_identity_is_noop() {
        let mut coordinator = coordinator();
        coordinator.set_identity(Some(Identity::verified("alice")));
        let commands = coordinator.set_identity(Some(Identity::verified("alice")));

        assert!(commands.is_empty());
        assert_eq!(coordinator.active_count(), 2, "exactly one subscription set");
    }

    #[test]
    fn test_same_user_refreshes_verification_flag() {
        let mut coordinator = coordinator();
        coordinator.set_identity(Some(Identity::new(UserId::new("alice"), false)));
        assert!(!coordinator.identity().unwrap().email_verified);

        // Verification flips for the same user: no resubscribe, but the
        // stored identity reflects the new flag.
        let commands = coordinator.set_identity(Some(Identity::verified("alice")));
        assert!(commands.is_empty());
        assert!(coordinator.identity().unwrap().email_verified);
        assert_eq!(coordinator.active_count(), 2);
        assert!(coordinator.cache().is_some());
    }

    #[test]
    fn test_identity_change_closes_before_opening() {
        let mut coordinator = coordinator();
        let first = coordinator.set_identity(Some(Identity::verified("alice")));
        let old_ids = subscribe_ids(&first);

        let second = coordinator.set_identity(Some(Identity::verified("bob")));

        // Unsubscribes for the old identity come before new subscribes.
        let unsubscribed: Vec<SubscriptionId> = second
            .iter()
            .take(2)
            .filter_map(|c| match c {
                StoreCommand::Unsubscribe { subscription } => Some(*subscription),
                StoreCommand::Subscribe { .. } => None,
            })
            .collect();
        assert_eq!(unsubscribed, old_ids);

        // Old ids are stale, new ids are live.
        for old in &old_ids {
            assert!(!coordinator.is_current(*old));
        }
        assert_eq!(coordinator.active_count(), 2);
    }

    #[test]
    fn test_identity_loss_discards_cache() {
        let mut coordinator = coordinator();
        coordinator.set_identity(Some(Identity::verified("alice")));
        assert!(coordinator.cache().is_some());

        let commands = coordinator.set_identity(None);
        assert_eq!(commands.len(), 2, "both streams unsubscribed");
        assert_eq!(coordinator.active_count(), 0);
        assert!(coordinator.cache().is_none());

        // Signing out twice stays a no-op.
        assert!(coordinator.set_identity(None).is_empty());
    }

    #[test]
    fn test_subscription_ids_never_reused() {
        let mut coordinator = coordinator();
        let first = subscribe_ids(&coordinator.set_identity(Some(Identity::verified("alice"))));
        coordinator.set_identity(None);
        let second = subscribe_ids(&coordinator.set_identity(Some(Identity::verified("alice"))));

        for id in &first {
            assert!(!second.contains(id), "ids must not be reused across epochs");
        }
    }

    #[test]
    fn test_query_carries_cap() {
        let mut coordinator = SubscriptionCoordinator::new(250);
        let commands = coordinator.set_identity(Some(Identity::new(UserId::new("alice"), true)));
        for command in &commands {
            if let StoreCommand::Subscribe { query, .. } = command {
                assert_eq!(query.limit, 250);
            }
        }
    }
}
