//! Error taxonomy for the ledger core
//!
//! Comprehensive error taxonomy using thiserror. Per-record faults are
//! isolated and recoverable; nothing here is allowed to crash the process
//! on malformed input.

use crate::ids::{RecordId, UserId};
use rust_decimal::Decimal;
use thiserror::Error;

/// Top-level ledger error
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LedgerError {
    #[error("Record error: {0}")]
    Record(#[from] RecordError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Settlement error: {0}")]
    Settlement(#[from] SettlementError),

    #[error("Stream {stream} failed: {cause}")]
    Stream { stream: String, cause: String },

    #[error("No active identity")]
    NoIdentity,
}

/// Data-integrity faults on individual records
///
/// Malformed records are excluded from balance computation and reported
/// through the diagnostic channel, never fatal.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RecordError {
    #[error("Malformed record {record_id}: {reason}")]
    Malformed { record_id: RecordId, reason: String },
}

impl RecordError {
    /// The id of the offending record.
    pub fn record_id(&self) -> RecordId {
        match self {
            RecordError::Malformed { record_id, .. } => *record_id,
        }
    }
}

/// Record-store boundary errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("Document not found: {collection}/{id}")]
    NotFound { collection: String, id: String },

    #[error("Store unavailable: {reason}")]
    Unavailable { reason: String },
}

/// Settlement validation failures, rejected before any write is attempted
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SettlementError {
    #[error("Settlement amount must be positive, got {amount}")]
    NonPositiveAmount { amount: Decimal },

    #[error("Debtor and creditor must differ: {user_id}")]
    SelfSettlement { user_id: UserId },
}
