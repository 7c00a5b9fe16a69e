//! Ledger engine orchestrator
//!
//! Ties together the subscription coordinator, entity cache, derived view
//! store, ledger builder, and settlement translator behind the surface the
//! presentation layer consumes: snapshot delivery, balance/group change
//! notification, and the record write path.
//!
//! Single-threaded and run-to-completion: each delivered snapshot replaces
//! its raw slice, triggers a full recompute, and notifies listeners before
//! the next event is processed.

use rust_decimal::Decimal;
use tracing::{debug, info, warn};

use crate::cache::ResolveOutcome;
use crate::coordinator::SubscriptionCoordinator;
use crate::events::{FaultEvent, SnapshotPayload, StreamSource};
use crate::settlement;
use crate::store::{RecordStore, StoreCommand, SubscriptionId};
use crate::view::DerivedViewStore;
use types::balance::{BalanceState, ScopeId};
use types::errors::LedgerError;
use types::group::Group;
use types::ids::{RecordId, UserId};
use types::profile::{Identity, UserProfile};
use types::record::LedgerRecord;

use std::collections::BTreeSet;

/// Engine configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Most-recent-N cap stamped into every subscription query. Recompute
    /// cost is O(records) per scope, so this bounds each rebuild.
    pub max_records_per_query: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_records_per_query: 500,
        }
    }
}

/// A "record an expense" intent, before the store assigns an id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpenseDraft {
    pub description: String,
    pub amount: Decimal,
    pub payer: UserId,
    pub participants: BTreeSet<UserId>,
    pub scope: ScopeId,
    /// Unix nanoseconds timestamp
    pub created_at: i64,
}

/// Balance change listener: receives the scope and its fresh state.
pub type BalanceListener = Box<dyn FnMut(&ScopeId, &BalanceState)>;
/// Roster change listener.
pub type GroupsListener = Box<dyn FnMut(&[Group])>;
/// Diagnostic fault handler.
pub type FaultHandler = Box<dyn FnMut(&FaultEvent)>;

/// The ledger derivation engine.
pub struct LedgerEngine<S: RecordStore> {
    config: EngineConfig,
    store: S,
    coordinator: SubscriptionCoordinator,
    view: DerivedViewStore,
    balance_listeners: Vec<(Option<ScopeId>, BalanceListener)>,
    groups_listeners: Vec<GroupsListener>,
    fault_handlers: Vec<FaultHandler>,
    /// Streams whose last delivery was a failure. Pause is per stream: a
    /// healthy snapshot from one stream says nothing about the other.
    paused_sources: BTreeSet<StreamSource>,
}

impl<S: RecordStore> LedgerEngine<S> {
    /// Create an engine with default configuration.
    pub fn new(store: S) -> Self {
        Self::with_config(store, EngineConfig::default())
    }

    /// Create an engine with custom configuration.
    pub fn with_config(store: S, config: EngineConfig) -> Self {
        info!(
            max_records_per_query = config.max_records_per_query,
            "LedgerEngine initialized"
        );
        Self {
            coordinator: SubscriptionCoordinator::new(config.max_records_per_query),
            config,
            store,
            view: DerivedViewStore::new(),
            balance_listeners: Vec::new(),
            groups_listeners: Vec::new(),
            fault_handlers: Vec::new(),
            paused_sources: BTreeSet::new(),
        }
    }

    // ── Identity & subscriptions ────────────────────────────────────

    /// Point the engine at a new identity (or sign out with `None`).
    ///
    /// Returns the store commands the transport must execute. Setting the
    /// same identity twice is a no-op. An actual change drops the derived
    /// view: the raw slices belonged to the previous identity.
    pub fn set_identity(&mut self, identity: Option<Identity>) -> Vec<StoreCommand> {
        let commands = self.coordinator.set_identity(identity);
        if commands.is_empty() {
            return commands;
        }

        self.paused_sources.clear();
        let dropped = self.view.clear();
        self.notify_balance_listeners(&dropped);
        self.notify_groups_listeners();
        commands
    }

    /// The identity currently subscribed for.
    pub fn identity(&self) -> Option<&Identity> {
        self.coordinator.identity()
    }

    /// Number of live subscriptions.
    pub fn active_subscriptions(&self) -> usize {
        self.coordinator.active_count()
    }

    /// Apply a full result-set snapshot delivered by the transport.
    ///
    /// Snapshots for subscriptions that are no longer current (a stale
    /// async teardown racing a fresh resubscribe) are dropped. Returns the
    /// scopes whose balance state changed.
    pub fn deliver_snapshot(
        &mut self,
        subscription: SubscriptionId,
        payload: SnapshotPayload,
    ) -> Vec<ScopeId> {
        let source = match self.coordinator.source_of(subscription) {
            Some(source) => source,
            None => {
                debug!(
                    subscription = subscription.value(),
                    "Dropping snapshot for closed subscription"
                );
                return Vec::new();
            }
        };
        if source != payload.source() {
            warn!(
                subscription = subscription.value(),
                expected = source.label(),
                got = payload.source().label(),
                "Dropping snapshot with mismatched stream source"
            );
            return Vec::new();
        }

        debug!(
            subscription = subscription.value(),
            source = source.label(),
            records = payload.len(),
            "Applying snapshot"
        );

        let is_roster = matches!(payload, SnapshotPayload::Groups(_));
        let (changed, faults) = match payload {
            SnapshotPayload::Groups(groups) => self.view.apply_groups(groups),
            SnapshotPayload::Expenses(records) => self.view.apply_expenses(records),
        };

        // A successful snapshot means this stream is flowing again; other
        // streams keep their own pause state.
        self.paused_sources.remove(&source);

        for fault in faults {
            self.emit_fault(FaultEvent::MalformedRecord {
                record_id: fault.record_id(),
                reason: fault.to_string(),
            });
        }

        if is_roster {
            self.notify_groups_listeners();
        }
        self.notify_balance_listeners(&changed);
        changed
    }

    /// Report a stream failure from the transport.
    ///
    /// The raw slice stays frozen at its last-known-good value — a stale
    /// balance view with an "updates paused" signal is preferred over
    /// regressing to empty balances. The core does not retry; the
    /// transport owns reconnection.
    pub fn stream_failed(&mut self, subscription: SubscriptionId, cause: impl Into<String>) {
        let source = match self.coordinator.source_of(subscription) {
            Some(source) => source,
            None => {
                debug!(
                    subscription = subscription.value(),
                    "Ignoring failure for closed subscription"
                );
                return;
            }
        };

        let cause = cause.into();
        warn!(
            subscription = subscription.value(),
            source = source.label(),
            cause = %cause,
            "Stream failed, updates paused, last-known balances retained"
        );
        self.paused_sources.insert(source);
        self.emit_fault(FaultEvent::StreamError { source, cause });
    }

    /// Whether the balance view is stale because a stream failed.
    pub fn updates_paused(&self) -> bool {
        !self.paused_sources.is_empty()
    }

    // ── Read surface ────────────────────────────────────────────────

    /// Materialized balance state for a scope.
    pub fn balances(&self, scope: &ScopeId) -> Option<&BalanceState> {
        self.view.balances(scope)
    }

    /// Latest known group roster.
    pub fn groups(&self) -> &[Group] {
        self.view.groups()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Access the underlying store adapter. Transports use this to execute
    /// subscription queries and seed test fixtures.
    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    /// Register a balance listener; `None` subscribes to every scope.
    pub fn on_balance_change(
        &mut self,
        scope: Option<ScopeId>,
        listener: impl FnMut(&ScopeId, &BalanceState) + 'static,
    ) {
        self.balance_listeners.push((scope, Box::new(listener)));
    }

    /// Register a roster listener.
    pub fn on_groups_change(&mut self, listener: impl FnMut(&[Group]) + 'static) {
        self.groups_listeners.push(Box::new(listener));
    }

    /// Register a diagnostic fault handler.
    pub fn on_fault(&mut self, handler: impl FnMut(&FaultEvent) + 'static) {
        self.fault_handlers.push(Box::new(handler));
    }

    // ── Write path ──────────────────────────────────────────────────

    /// Validate and persist an expense, returning the assigned id.
    pub fn record_expense(&mut self, draft: ExpenseDraft) -> Result<RecordId, LedgerError> {
        let group_id = match draft.scope {
            ScopeId::Group(group_id) => Some(group_id),
            ScopeId::Personal => None,
        };
        let record = LedgerRecord::Expense {
            record_id: RecordId::new(),
            description: draft.description,
            amount: draft.amount,
            payer: draft.payer,
            participants: draft.participants,
            group_id,
            created_at: draft.created_at,
        };
        record.validate()?;
        let record_id = self.store.create_record(&record)?;
        info!(record_id = %record_id, amount = %record.amount(), "Expense recorded");
        Ok(record_id)
    }

    /// Validate and persist a settlement, returning the assigned id.
    pub fn record_settlement(
        &mut self,
        debtor: &UserId,
        creditor: &UserId,
        amount: Decimal,
        scope: &ScopeId,
        created_at: i64,
    ) -> Result<RecordId, LedgerError> {
        let record = settlement::translate_settlement(debtor, creditor, amount, scope, created_at)?;
        let record_id = self.store.create_record(&record)?;
        info!(record_id = %record_id, amount = %amount, "Settlement recorded");
        Ok(record_id)
    }

    /// Delete an expense record. Only the payer may delete; that policy is
    /// enforced at the store boundary.
    pub fn delete_expense(&mut self, record_id: RecordId) -> Result<(), LedgerError> {
        self.store.delete_record(record_id)?;
        Ok(())
    }

    // ── Profiles ────────────────────────────────────────────────────

    /// Resolve a user profile through the session cache.
    ///
    /// The synchronous adapter completes the fetch inline; the cache's
    /// waiter fan-out carries the dedup contract for asynchronous
    /// transports. Negative results are not cached.
    pub fn resolve_profile(&mut self, user_id: &UserId) -> Result<UserProfile, LedgerError> {
        let outcome = match self.coordinator.cache_mut() {
            Some(cache) => cache.resolve(user_id),
            None => return Err(LedgerError::NoIdentity),
        };

        match outcome {
            ResolveOutcome::Hit(profile) => Ok(profile),
            ResolveOutcome::Miss { .. } => {
                let result = self.store.fetch_profile(user_id);
                if let Some(cache) = self.coordinator.cache_mut() {
                    cache.complete_fetch(user_id, &result);
                }
                result.map_err(LedgerError::from)
            }
        }
    }

    // ── Internals ───────────────────────────────────────────────────

    fn notify_balance_listeners(&mut self, scopes: &[ScopeId]) {
        for scope in scopes {
            // A scope dropped from the roster notifies with an empty state.
            let state = self.view.balances(scope).cloned().unwrap_or_default();
            for (filter, listener) in &mut self.balance_listeners {
                if filter.map_or(true, |f| f == *scope) {
                    listener(scope, &state);
                }
            }
        }
    }

    fn notify_groups_listeners(&mut self) {
        let groups = self.view.groups().to_vec();
        for listener in &mut self.groups_listeners {
            listener(&groups);
        }
    }

    fn emit_fault(&mut self, fault: FaultEvent) {
        warn!(fault = fault.label(), "Fault raised");
        for handler in &mut self.fault_handlers {
            handler(&fault);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn user(id: &str) -> UserId {
        UserId::new(id)
    }

    fn engine() -> LedgerEngine<MemoryStore> {
        LedgerEngine::new(MemoryStore::new())
    }

    fn draft(payer: &str, participants: &[&str], amount: i64) -> ExpenseDraft {
        ExpenseDraft {
            description: "Dinner".to_string(),
            amount: Decimal::from(amount),
            payer: user(payer),
            participants: participants.iter().map(|p| user(p)).collect(),
            scope: ScopeId::Personal,
            created_at: 0,
        }
    }

    #[test]
    fn test_record_expense_validates_before_write() {
        let mut engine = engine();
        let result = engine.record_expense(draft("a", &["a", "b"], -5));
        assert!(matches!(result, Err(LedgerError::Record(_))));

        let record_id = engine.record_expense(draft("a", &["a", "b"], 20)).unwrap();
        engine.delete_expense(record_id).unwrap();
    }

    #[test]
    fn test_record_settlement_rejects_self_payment() {
        let mut engine = engine();
        let result = engine.record_settlement(
            &user("a"),
            &user("a"),
            Decimal::ONE,
            &ScopeId::Personal,
            0,
        );
        assert!(matches!(result, Err(LedgerError::Settlement(_))));
    }

    #[test]
    fn test_resolve_profile_requires_identity() {
        let mut engine = engine();
        let result = engine.resolve_profile(&user("a"));
        assert!(matches!(result, Err(LedgerError::NoIdentity)));
    }

    #[test]
    fn test_resolve_profile_caches_positive_results() {
        let mut store = MemoryStore::new();
        store.insert_profile(UserProfile::new(user("a"), "a@example.com", "Ana", 0));
        let mut engine = LedgerEngine::new(store);
        engine.set_identity(Some(Identity::verified("a")));

        engine.resolve_profile(&user("a")).unwrap();
        engine.resolve_profile(&user("a")).unwrap();

        // Second call served from cache: one underlying fetch.
        assert_eq!(engine.store.profile_fetches(), 1);
    }

    #[test]
    fn test_resolve_profile_not_found_retries() {
        let mut engine = engine();
        engine.set_identity(Some(Identity::verified("a")));

        assert!(engine.resolve_profile(&user("ghost")).is_err());
        assert!(engine.resolve_profile(&user("ghost")).is_err());
        // Negative results are not cached, so both calls hit the store.
        assert_eq!(engine.store.profile_fetches(), 2);
    }

    #[test]
    fn test_fault_handler_receives_stream_errors() {
        let mut engine = engine();
        let faults = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&faults);
        engine.on_fault(move |fault| sink.borrow_mut().push(fault.clone()));

        let commands = engine.set_identity(Some(Identity::verified("a")));
        let subscription = match &commands[0] {
            StoreCommand::Subscribe { subscription, .. } => *subscription,
            other => panic!("Expected Subscribe, got {other:?}"),
        };

        engine.stream_failed(subscription, "permission denied");
        assert!(engine.updates_paused());
        assert_eq!(faults.borrow().len(), 1);
        assert!(matches!(
            faults.borrow()[0],
            FaultEvent::StreamError { .. }
        ));
    }

    #[test]
    fn test_pause_tracked_per_stream() {
        use crate::store::{EXPENSES, GROUPS};

        let mut engine = engine();
        let commands = engine.set_identity(Some(Identity::verified("a")));
        let mut roster = None;
        let mut expenses = None;
        for command in &commands {
            if let StoreCommand::Subscribe {
                subscription,
                query,
            } = command
            {
                match query.collection {
                    GROUPS => roster = Some(*subscription),
                    EXPENSES => expenses = Some(*subscription),
                    _ => {}
                }
            }
        }
        let roster = roster.unwrap();
        let expenses = expenses.unwrap();

        engine.stream_failed(roster, "permission denied");
        assert!(engine.updates_paused());

        // A healthy snapshot on the other stream must not clear the pause.
        engine.deliver_snapshot(expenses, SnapshotPayload::Expenses(Vec::new()));
        assert!(engine.updates_paused());

        // Only the failed stream's recovery does.
        engine.deliver_snapshot(roster, SnapshotPayload::Groups(Vec::new()));
        assert!(!engine.updates_paused());
    }

    #[test]
    fn test_failure_for_closed_subscription_ignored() {
        let mut engine = engine();
        engine.stream_failed(SubscriptionId::new(999), "late teardown");
        assert!(!engine.updates_paused());
    }
}
