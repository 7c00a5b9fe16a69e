//! Snapshot and fault event definitions
//!
//! A snapshot is a complete, point-in-time result set delivered by a
//! streaming subscription; it supersedes any prior result for that
//! subscription. Faults travel on a separate diagnostic channel and are
//! never fatal.

use types::group::Group;
use types::ids::RecordId;
use types::record::LedgerRecord;

/// The query stream a subscription watches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum StreamSource {
    /// Groups whose member array contains the current identity.
    GroupRoster,
    /// Expense records whose participant array contains the current
    /// identity. Per-group expense sets are derived from this stream,
    /// not separately subscribed.
    ParticipantExpenses,
}

impl StreamSource {
    /// String label for logging.
    pub fn label(&self) -> &'static str {
        match self {
            StreamSource::GroupRoster => "group-roster",
            StreamSource::ParticipantExpenses => "participant-expenses",
        }
    }
}

/// A full result-set snapshot for one stream. Not a delta: the payload
/// replaces the corresponding raw slice wholesale.
#[derive(Debug, Clone, PartialEq)]
pub enum SnapshotPayload {
    Groups(Vec<Group>),
    Expenses(Vec<LedgerRecord>),
}

impl SnapshotPayload {
    /// Which stream this payload belongs to.
    pub fn source(&self) -> StreamSource {
        match self {
            SnapshotPayload::Groups(_) => StreamSource::GroupRoster,
            SnapshotPayload::Expenses(_) => StreamSource::ParticipantExpenses,
        }
    }

    /// Number of records in the snapshot.
    pub fn len(&self) -> usize {
        match self {
            SnapshotPayload::Groups(groups) => groups.len(),
            SnapshotPayload::Expenses(records) => records.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Diagnostic events surfaced to registered fault handlers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FaultEvent {
    /// A subscription stream delivered an error. The raw slice is frozen
    /// at its last-known-good value; the core does not retry.
    StreamError {
        source: StreamSource,
        cause: String,
    },

    /// A record failed data-integrity validation and was excluded from
    /// balance computation.
    MalformedRecord {
        record_id: RecordId,
        reason: String,
    },
}

impl FaultEvent {
    /// String label for logging.
    pub fn label(&self) -> &'static str {
        match self {
            FaultEvent::StreamError { .. } => "StreamError",
            FaultEvent::MalformedRecord { .. } => "MalformedRecord",
        }
    }
}
