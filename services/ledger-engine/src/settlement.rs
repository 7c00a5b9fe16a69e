//! Settlement translator
//!
//! Maps a "record a payment" intent into a canonical settlement record.
//! Validation happens here, before any write is attempted; the translator
//! performs no I/O.

use rust_decimal::Decimal;
use tracing::debug;
use types::balance::ScopeId;
use types::errors::SettlementError;
use types::ids::{RecordId, UserId};
use types::record::LedgerRecord;

/// Translate a payment intent into a canonical settlement record.
///
/// The returned record carries a client-side placeholder id; the store
/// adapter assigns the persisted id on create.
pub fn translate_settlement(
    debtor: &UserId,
    creditor: &UserId,
    amount: Decimal,
    scope: &ScopeId,
    created_at: i64,
) -> Result<LedgerRecord, SettlementError> {
    if amount <= Decimal::ZERO {
        return Err(SettlementError::NonPositiveAmount { amount });
    }
    if debtor == creditor {
        return Err(SettlementError::SelfSettlement {
            user_id: debtor.clone(),
        });
    }

    let group_id = match scope {
        ScopeId::Group(group_id) => Some(*group_id),
        ScopeId::Personal => None,
    };

    debug!(
        debtor = %debtor,
        creditor = %creditor,
        amount = %amount,
        scope = %scope,
        "Settlement translated"
    );

    Ok(LedgerRecord::Settlement {
        record_id: RecordId::new(),
        payer: debtor.clone(),
        creditor: creditor.clone(),
        amount,
        group_id,
        created_at,
    })
}
