//! Record store adapter boundary
//!
//! Wraps the external document store behind a narrow interface: a streaming
//! subscription primitive described by `Query`/`StoreCommand`, and a small
//! write/fetch trait. No business logic lives here.
//!
//! Subscriptions are owned by the coordinator and executed by the external
//! transport: the coordinator emits `StoreCommand`s, the transport opens or
//! tears down the underlying streams and pushes snapshots back in. The
//! `RecordStore` trait covers the direct (non-streaming) calls: single
//! document fetch, create, delete.

use serde_json::Value;
use tracing::{debug, warn};
use types::errors::StoreError;
use types::group::Group;
use types::ids::{GroupId, RecordId, UserId};
use types::profile::UserProfile;
use types::record::LedgerRecord;

use std::collections::BTreeMap;

/// Collection names in the persisted layout.
pub const USERS: &str = "users";
pub const GROUPS: &str = "groups";
pub const EXPENSES: &str = "expenses";

/// Predicate forms supported by the store's query primitive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Predicate {
    /// Exact match on a scalar field.
    FieldEquals { field: String, value: String },
    /// "Array contains this id" membership test.
    ArrayContains { field: String, user_id: UserId },
}

/// A streaming query: collection, predicate, and the caller-enforced
/// most-recent-N cap bounding recompute cost.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    pub collection: &'static str,
    pub predicate: Predicate,
    pub limit: usize,
}

/// Version-tagged handle for one streaming subscription.
///
/// Ids are monotonically assigned and never reused, so a snapshot arriving
/// after its subscription was closed is always identifiable as stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

/// Commands emitted by the coordinator for the transport to execute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreCommand {
    Subscribe {
        subscription: SubscriptionId,
        query: Query,
    },
    Unsubscribe {
        subscription: SubscriptionId,
    },
}

/// The narrow write/fetch boundary into the document store.
///
/// The adapter assigns persisted record ids; any id carried by a submitted
/// record is a client-side placeholder.
pub trait RecordStore {
    /// Persist a ledger record, returning the assigned id.
    fn create_record(&mut self, record: &LedgerRecord) -> Result<RecordId, StoreError>;

    /// Delete a ledger record. Payer-only authorization is enforced at the
    /// store boundary, not duplicated here.
    fn delete_record(&mut self, record_id: RecordId) -> Result<(), StoreError>;

    /// Single-document profile fetch, used by the entity cache.
    fn fetch_profile(&mut self, user_id: &UserId) -> Result<UserProfile, StoreError>;
}

/// In-process store adapter used by tests and local transports.
///
/// Holds expense documents in their stored JSON shape so the tagged/legacy
/// classification path is exercised end to end.
#[derive(Debug, Default)]
pub struct MemoryStore {
    profiles: BTreeMap<UserId, UserProfile>,
    groups: BTreeMap<GroupId, Group>,
    expenses: BTreeMap<RecordId, Value>,
    unavailable: Option<String>,
    profile_fetches: u64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a profile document.
    pub fn insert_profile(&mut self, profile: UserProfile) {
        self.profiles.insert(profile.user_id.clone(), profile);
    }

    /// Seed a group document.
    pub fn insert_group(&mut self, group: Group) {
        self.groups.insert(group.group_id, group);
    }

    /// Seed a raw expense document. Used by tests to inject legacy or
    /// malformed document shapes.
    pub fn insert_document(&mut self, record_id: RecordId, doc: Value) {
        self.expenses.insert(record_id, doc);
    }

    /// Simulate a transport outage: all fetches fail until cleared.
    pub fn set_unavailable(&mut self, reason: Option<String>) {
        self.unavailable = reason;
    }

    /// Number of profile fetches served (including failures). Lets tests
    /// verify the cache's in-flight deduplication.
    pub fn profile_fetches(&self) -> u64 {
        self.profile_fetches
    }

    /// Groups whose member array contains the given user.
    pub fn groups_for_member(&self, user_id: &UserId) -> Vec<Group> {
        self.groups
            .values()
            .filter(|g| g.is_member(user_id))
            .cloned()
            .collect()
    }

    /// Run an expense query, returning the most-recent `limit` matches in
    /// ascending creation order. Documents that fail to parse are skipped
    /// with a warning; validation faults are left to the ledger builder.
    pub fn query_expenses(&self, predicate: &Predicate, limit: usize) -> Vec<LedgerRecord> {
        let mut matches: Vec<LedgerRecord> = self
            .expenses
            .iter()
            .filter(|(_, doc)| Self::matches(doc, predicate))
            .filter_map(|(record_id, doc)| {
                match LedgerRecord::from_document(*record_id, doc) {
                    Ok(record) => Some(record),
                    Err(e) => {
                        warn!(record_id = %record_id, error = %e, "Skipping unparseable document");
                        None
                    }
                }
            })
            .collect();

        matches.sort_by_key(|r| (r.created_at(), r.record_id()));
        if matches.len() > limit {
            matches.drain(..matches.len() - limit);
        }
        matches
    }

    fn matches(doc: &Value, predicate: &Predicate) -> bool {
        match predicate {
            Predicate::FieldEquals { field, value } => {
                doc.get(field).and_then(Value::as_str) == Some(value.as_str())
            }
            Predicate::ArrayContains { field, user_id } => doc
                .get(field)
                .and_then(Value::as_array)
                .map(|items| items.iter().any(|v| v.as_str() == Some(user_id.as_str())))
                .unwrap_or(false),
        }
    }

    fn check_available(&self) -> Result<(), StoreError> {
        match &self.unavailable {
            Some(reason) => Err(StoreError::Unavailable {
                reason: reason.clone(),
            }),
            None => Ok(()),
        }
    }
}

impl RecordStore for MemoryStore {
    fn create_record(&mut self, record: &LedgerRecord) -> Result<RecordId, StoreError> {
        self.check_available()?;
        let record_id = RecordId::new();
        self.expenses.insert(record_id, record.to_document());
        debug!(record_id = %record_id, kind = record.kind_label(), "Record created");
        Ok(record_id)
    }

    fn delete_record(&mut self, record_id: RecordId) -> Result<(), StoreError> {
        self.check_available()?;
        match self.expenses.remove(&record_id) {
            Some(_) => {
                debug!(record_id = %record_id, "Record deleted");
                Ok(())
            }
            None => Err(StoreError::NotFound {
                collection: EXPENSES.to_string(),
                id: record_id.to_string(),
            }),
        }
    }

    fn fetch_profile(&mut self, user_id: &UserId) -> Result<UserProfile, StoreError> {
        self.profile_fetches += 1;
        self.check_available()?;
        self.profiles
            .get(user_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound {
                collection: USERS.to_string(),
                id: user_id.to_string(),
            })
    }
}
