//! Ledger record types
//!
//! A ledger record is either an ordinary shared expense or a settlement (a
//! direct debtor→creditor payment). The two are an explicit tagged sum type
//! distinguished by a `kind` field in the document form, never by structural
//! coincidence.
//!
//! Stores populated by older writers encoded settlements as expenses with a
//! sentinel description and a single-element participant array. Settlement
//! documents still carry that structural signature for compatibility, and
//! `from_document` falls back to it when the `kind` tag is absent.

use crate::balance::ScopeId;
use crate::errors::RecordError;
use crate::ids::{GroupId, RecordId, UserId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeSet;
use uuid::Uuid;

/// Sentinel description marking a settlement in the legacy document shape.
pub const SETTLEMENT_DESCRIPTION: &str = "__settlement__";

/// A single ledger record: an expense shared across participants, or a
/// settlement paying down a debt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "UPPERCASE")]
pub enum LedgerRecord {
    /// A shared expense: the payer fronted `amount`, split evenly across
    /// the participant set. The payer may or may not be a participant.
    Expense {
        record_id: RecordId,
        description: String,
        amount: Decimal,
        payer: UserId,
        participants: BTreeSet<UserId>,
        group_id: Option<GroupId>,
        /// Unix nanoseconds timestamp
        created_at: i64,
    },

    /// A direct payment from a debtor (the payer) to a single creditor,
    /// reducing what the debtor owes that creditor.
    Settlement {
        record_id: RecordId,
        payer: UserId,
        creditor: UserId,
        amount: Decimal,
        group_id: Option<GroupId>,
        /// Unix nanoseconds timestamp
        created_at: i64,
    },
}

impl LedgerRecord {
    /// The record's store-assigned id.
    pub fn record_id(&self) -> RecordId {
        match self {
            LedgerRecord::Expense { record_id, .. } => *record_id,
            LedgerRecord::Settlement { record_id, .. } => *record_id,
        }
    }

    /// The monetary amount carried by this record.
    pub fn amount(&self) -> Decimal {
        match self {
            LedgerRecord::Expense { amount, .. } => *amount,
            LedgerRecord::Settlement { amount, .. } => *amount,
        }
    }

    /// The user who paid.
    pub fn payer(&self) -> &UserId {
        match self {
            LedgerRecord::Expense { payer, .. } => payer,
            LedgerRecord::Settlement { payer, .. } => payer,
        }
    }

    /// Group this record belongs to, if any.
    pub fn group_id(&self) -> Option<GroupId> {
        match self {
            LedgerRecord::Expense { group_id, .. } => *group_id,
            LedgerRecord::Settlement { group_id, .. } => *group_id,
        }
    }

    /// Unix nanoseconds creation timestamp.
    pub fn created_at(&self) -> i64 {
        match self {
            LedgerRecord::Expense { created_at, .. } => *created_at,
            LedgerRecord::Settlement { created_at, .. } => *created_at,
        }
    }

    /// The balance-computation scope this record contributes to.
    pub fn scope(&self) -> ScopeId {
        match self.group_id() {
            Some(group_id) => ScopeId::Group(group_id),
            None => ScopeId::Personal,
        }
    }

    /// Whether this record is a settlement.
    pub fn is_settlement(&self) -> bool {
        matches!(self, LedgerRecord::Settlement { .. })
    }

    /// Get the record kind as a string label for logging.
    pub fn kind_label(&self) -> &'static str {
        match self {
            LedgerRecord::Expense { .. } => "EXPENSE",
            LedgerRecord::Settlement { .. } => "SETTLEMENT",
        }
    }

    /// Validate data-integrity invariants: amount > 0, participants
    /// non-empty. Records failing validation are excluded from balance
    /// computation, never a reason to crash.
    pub fn validate(&self) -> Result<(), RecordError> {
        if self.amount() <= Decimal::ZERO {
            return Err(RecordError::Malformed {
                record_id: self.record_id(),
                reason: format!("non-positive amount {}", self.amount()),
            });
        }
        if let LedgerRecord::Expense { participants, .. } = self {
            if participants.is_empty() {
                return Err(RecordError::Malformed {
                    record_id: self.record_id(),
                    reason: "empty participant set".to_string(),
                });
            }
        }
        Ok(())
    }

    /// Serialize to the stored document shape (`expenses/{id}`).
    ///
    /// Settlement documents carry both the explicit `kind` tag and the
    /// legacy structural signature (sentinel description, single-element
    /// participant array) so older readers keep working.
    pub fn to_document(&self) -> Value {
        match self {
            LedgerRecord::Expense {
                description,
                amount,
                payer,
                participants,
                group_id,
                created_at,
                ..
            } => json!({
                "kind": "EXPENSE",
                "description": description,
                "amount": amount.to_string(),
                "payer": payer.as_str(),
                "participants": participants.iter().map(UserId::as_str).collect::<Vec<_>>(),
                "groupId": group_id.map(|g| g.to_string()),
                "createdAt": created_at,
            }),
            LedgerRecord::Settlement {
                payer,
                creditor,
                amount,
                group_id,
                created_at,
                ..
            } => json!({
                "kind": "SETTLEMENT",
                "description": SETTLEMENT_DESCRIPTION,
                "amount": amount.to_string(),
                "payer": payer.as_str(),
                "creditor": creditor.as_str(),
                "participants": [creditor.as_str()],
                "groupId": group_id.map(|g| g.to_string()),
                "createdAt": created_at,
            }),
        }
    }

    /// Reconstruct a record from its stored document.
    ///
    /// Dispatches on the explicit `kind` tag when present; untagged legacy
    /// documents are classified by the structural settlement signature
    /// (sentinel description + participant cardinality 1).
    pub fn from_document(record_id: RecordId, doc: &Value) -> Result<Self, RecordError> {
        let kind = doc.get("kind").and_then(Value::as_str);

        match kind {
            Some("EXPENSE") => Self::expense_from_document(record_id, doc),
            Some("SETTLEMENT") => Self::settlement_from_document(record_id, doc),
            Some(other) => Err(RecordError::Malformed {
                record_id,
                reason: format!("unknown record kind {other:?}"),
            }),
            None => {
                // Legacy untagged document: structural classification.
                let description = str_field(record_id, doc, "description")?;
                let participants = participants_field(record_id, doc)?;
                if description == SETTLEMENT_DESCRIPTION && participants.len() == 1 {
                    Self::settlement_from_document(record_id, doc)
                } else {
                    Self::expense_from_document(record_id, doc)
                }
            }
        }
    }

    fn expense_from_document(record_id: RecordId, doc: &Value) -> Result<Self, RecordError> {
        Ok(LedgerRecord::Expense {
            record_id,
            description: str_field(record_id, doc, "description")?.to_string(),
            amount: amount_field(record_id, doc)?,
            payer: UserId::new(str_field(record_id, doc, "payer")?),
            participants: participants_field(record_id, doc)?,
            group_id: group_field(record_id, doc)?,
            created_at: timestamp_field(record_id, doc)?,
        })
    }

    fn settlement_from_document(record_id: RecordId, doc: &Value) -> Result<Self, RecordError> {
        // Tagged documents carry an explicit creditor; legacy documents
        // carry the creditor as the sole participant.
        let creditor = match doc.get("creditor").and_then(Value::as_str) {
            Some(creditor) => UserId::new(creditor),
            None => {
                let participants = participants_field(record_id, doc)?;
                participants
                    .into_iter()
                    .next()
                    .ok_or_else(|| RecordError::Malformed {
                        record_id,
                        reason: "settlement without creditor".to_string(),
                    })?
            }
        };

        Ok(LedgerRecord::Settlement {
            record_id,
            payer: UserId::new(str_field(record_id, doc, "payer")?),
            creditor,
            amount: amount_field(record_id, doc)?,
            group_id: group_field(record_id, doc)?,
            created_at: timestamp_field(record_id, doc)?,
        })
    }
}

fn str_field<'a>(
    record_id: RecordId,
    doc: &'a Value,
    field: &str,
) -> Result<&'a str, RecordError> {
    doc.get(field)
        .and_then(Value::as_str)
        .ok_or_else(|| RecordError::Malformed {
            record_id,
            reason: format!("missing field {field:?}"),
        })
}

fn amount_field(record_id: RecordId, doc: &Value) -> Result<Decimal, RecordError> {
    let raw = str_field(record_id, doc, "amount")?;
    Decimal::from_str_exact(raw).map_err(|e| RecordError::Malformed {
        record_id,
        reason: format!("unparseable amount {raw:?}: {e}"),
    })
}

fn participants_field(record_id: RecordId, doc: &Value) -> Result<BTreeSet<UserId>, RecordError> {
    let raw = doc
        .get("participants")
        .and_then(Value::as_array)
        .ok_or_else(|| RecordError::Malformed {
            record_id,
            reason: "missing field \"participants\"".to_string(),
        })?;

    raw.iter()
        .map(|v| {
            v.as_str().map(UserId::new).ok_or_else(|| RecordError::Malformed {
                record_id,
                reason: "non-string participant id".to_string(),
            })
        })
        .collect()
}

fn group_field(record_id: RecordId, doc: &Value) -> Result<Option<GroupId>, RecordError> {
    match doc.get("groupId") {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(raw)) => raw
            .parse::<Uuid>()
            .map(|uuid| Some(GroupId::from_uuid(uuid)))
            .map_err(|e| RecordError::Malformed {
                record_id,
                reason: format!("unparseable groupId {raw:?}: {e}"),
            }),
        Some(_) => Err(RecordError::Malformed {
            record_id,
            reason: "non-string groupId".to_string(),
        }),
    }
}

fn timestamp_field(record_id: RecordId, doc: &Value) -> Result<i64, RecordError> {
    doc.get("createdAt")
        .and_then(Value::as_i64)
        .ok_or_else(|| RecordError::Malformed {
            record_id,
            reason: "missing field \"createdAt\"".to_string(),
        })
}
