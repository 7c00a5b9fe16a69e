//! Session-scoped entity cache with in-flight request deduplication
//!
//! Memoizes resolved user profiles by id for the lifetime of a session.
//! Concurrent resolve calls for the same id before the fetch completes
//! share one pending fetch: only the first caller is told to issue it, and
//! every registered waiter receives the result on completion. Negative
//! results are not cached, so a later resolve retries the fetch.
//!
//! The cache is created by the coordinator on identity acquisition and
//! discarded on identity loss. The single-threaded event loop removes the
//! need for locking; callers are multiplexed cooperatively.

use tracing::{debug, warn};
use types::errors::StoreError;
use types::ids::UserId;
use types::profile::UserProfile;

use std::collections::BTreeMap;

/// Ticket identifying one pending resolve caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WaiterId(u64);

impl WaiterId {
    pub fn value(&self) -> u64 {
        self.0
    }
}

/// Outcome of a resolve call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolveOutcome {
    /// Served from memory.
    Hit(UserProfile),
    /// Not cached. `fetch_needed` is true only for the first waiter of an
    /// id; later callers join the pending fetch instead of issuing a new
    /// one.
    Miss { waiter: WaiterId, fetch_needed: bool },
}

/// Profile cache with pending-fetch bookkeeping and counters.
#[derive(Debug, Default)]
pub struct EntityCache {
    profiles: BTreeMap<UserId, UserProfile>,
    pending: BTreeMap<UserId, Vec<WaiterId>>,
    next_waiter: u64,
    hits: u64,
    misses: u64,
    deduped: u64,
}

impl EntityCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve a profile by id.
    ///
    /// On a miss the caller is registered as a waiter; the fetch result
    /// must be fed back through [`complete_fetch`](Self::complete_fetch).
    pub fn resolve(&mut self, user_id: &UserId) -> ResolveOutcome {
        if let Some(profile) = self.profiles.get(user_id) {
            self.hits += 1;
            return ResolveOutcome::Hit(profile.clone());
        }

        let waiter = WaiterId(self.next_waiter);
        self.next_waiter += 1;

        let waiters = self.pending.entry(user_id.clone()).or_default();
        let fetch_needed = waiters.is_empty();
        waiters.push(waiter);

        if fetch_needed {
            self.misses += 1;
            debug!(user_id = %user_id, "Profile cache miss, fetch needed");
        } else {
            self.deduped += 1;
            debug!(user_id = %user_id, "Profile cache miss, joined in-flight fetch");
        }

        ResolveOutcome::Miss {
            waiter,
            fetch_needed,
        }
    }

    /// Complete an in-flight fetch, returning the waiters to notify.
    ///
    /// Success populates the cache. Failure (including `NotFound`) drains
    /// the waiters without caching the negative result.
    pub fn complete_fetch(
        &mut self,
        user_id: &UserId,
        result: &Result<UserProfile, StoreError>,
    ) -> Vec<WaiterId> {
        let waiters = self.pending.remove(user_id).unwrap_or_default();

        match result {
            Ok(profile) => {
                self.profiles.insert(user_id.clone(), profile.clone());
                debug!(user_id = %user_id, waiters = waiters.len(), "Profile cached");
            }
            Err(e) => {
                warn!(user_id = %user_id, error = %e, "Profile fetch failed, not cached");
            }
        }

        waiters
    }

    /// Look up a cached profile without registering a waiter.
    pub fn peek(&self, user_id: &UserId) -> Option<&UserProfile> {
        self.profiles.get(user_id)
    }

    /// Number of cached profiles.
    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }

    /// Cache hits served since creation.
    pub fn hits(&self) -> u64 {
        self.hits
    }

    /// Misses that issued a fetch since creation.
    pub fn misses(&self) -> u64 {
        self.misses
    }

    /// Misses that joined an in-flight fetch since creation.
    pub fn deduped(&self) -> u64 {
        self.deduped
    }
}
