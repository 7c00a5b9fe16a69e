//! Ledger builder: pure balance derivation
//!
//! A full recompute from the latest raw state: (member set, record set) →
//! `BalanceState`. No I/O, fully deterministic, idempotent; calling it any
//! number of times with the same inputs yields bit-identical output.
//! Balances are never incrementally patched, to avoid drift from missed or
//! out-of-order events. Cost is O(records) per rebuild, bounded by the
//! per-query result cap.

use rust_decimal::{Decimal, RoundingStrategy};
use tracing::warn;
use types::balance::BalanceState;
use types::errors::RecordError;
use types::ids::UserId;
use types::record::LedgerRecord;

use std::collections::{BTreeMap, BTreeSet};

/// Split an amount evenly across `count` shares.
///
/// Shares are floored to the amount's own precision; the indivisible
/// remainder is assigned one unit at a time to the leading shares, so the
/// shares always sum exactly to the amount with no rounding drift. Callers
/// align the share vector with participants in ascending id order.
pub fn split_amount(amount: Decimal, count: usize) -> Vec<Decimal> {
    debug_assert!(count > 0, "split requires at least one participant");

    let divisor = Decimal::from(count as u64);
    let unit = Decimal::new(1, amount.scale());
    let base = (amount / divisor).round_dp_with_strategy(amount.scale(), RoundingStrategy::ToZero);

    let mut shares = vec![base; count];
    let mut remainder = amount - base * divisor;
    let mut index = 0;
    while remainder > Decimal::ZERO && index < count {
        let step = remainder.min(unit);
        shares[index] += step;
        remainder -= step;
        index += 1;
    }

    shares
}

/// Build the balance state for one scope from its member set and the full
/// current record set visible for that scope.
///
/// Malformed records (non-positive amount, empty participant set) are
/// excluded from the computation and reported back, never fatal. Every
/// member appears in the net map, debt or not.
pub fn build_balances(
    members: &BTreeSet<UserId>,
    records: &[LedgerRecord],
) -> (BalanceState, Vec<RecordError>) {
    let mut faults = Vec::new();

    // Raw directed debt accumulation: (debtor, creditor) → signed total.
    let mut raw: BTreeMap<(UserId, UserId), Decimal> = BTreeMap::new();
    let mut add_debt = |debtor: &UserId, creditor: &UserId, amount: Decimal| {
        if debtor == creditor {
            return;
        }
        *raw.entry((debtor.clone(), creditor.clone()))
            .or_insert(Decimal::ZERO) += amount;
    };

    for record in records {
        if let Err(fault) = record.validate() {
            warn!(
                record_id = %record.record_id(),
                kind = record.kind_label(),
                error = %fault,
                "Excluding malformed record from balance computation"
            );
            faults.push(fault);
            continue;
        }

        match record {
            LedgerRecord::Expense {
                amount,
                payer,
                participants,
                ..
            } => {
                let shares = split_amount(*amount, participants.len());
                for (participant, share) in participants.iter().zip(shares) {
                    // A participant who is also the payer owes nothing to
                    // themself.
                    add_debt(participant, payer, share);
                }
            }
            LedgerRecord::Settlement {
                payer,
                creditor,
                amount,
                ..
            } => {
                // A payment from debtor to creditor cancels debt in the
                // opposite direction.
                add_debt(creditor, payer, *amount);
            }
        }
    }

    // Net opposite-direction totals down to a single non-negative directed
    // amount per pair.
    let mut state = BalanceState::default();
    for ((debtor, creditor), amount) in &raw {
        let reverse_key = (creditor.clone(), debtor.clone());
        if debtor > creditor && raw.contains_key(&reverse_key) {
            continue; // handled when the lexically-first direction was visited
        }
        let net = *amount - raw.get(&reverse_key).copied().unwrap_or(Decimal::ZERO);
        if net > Decimal::ZERO {
            state
                .pairwise
                .insert((debtor.clone(), creditor.clone()), net);
        } else if net < Decimal::ZERO {
            state.pairwise.insert(reverse_key, -net);
        }
    }

    // Net signed positions: owed-to minus owes. Members with no activity
    // show an explicit zero.
    for member in members {
        state.net.insert(member.clone(), Decimal::ZERO);
    }
    let pairs: Vec<_> = state
        .pairwise
        .iter()
        .map(|((d, c), a)| (d.clone(), c.clone(), *a))
        .collect();
    for (debtor, creditor, amount) in pairs {
        *state.net.entry(debtor).or_insert(Decimal::ZERO) -= amount;
        *state.net.entry(creditor).or_insert(Decimal::ZERO) += amount;
    }

    (state, faults)
}

#[cfg(test)]
mod tests {
    use super::*;
    use types::ids::RecordId;

    fn user(id: &str) -> UserId {
        UserId::new(id)
    }

    fn users(ids: &[&str]) -> BTreeSet<UserId> {
        ids.iter().map(|id| user(id)).collect()
    }

    fn expense(payer: &str, participants: &[&str], amount: Decimal) -> LedgerRecord {
        LedgerRecord::Expense {
            record_id: RecordId::new(),
            description: "Dinner".to_string(),
            amount,
            payer: user(payer),
            participants: users(participants),
            group_id: None,
            created_at: 1708123456789000000,
        }
    }

    fn settlement(debtor: &str, creditor: &str, amount: Decimal) -> LedgerRecord {
        LedgerRecord::Settlement {
            record_id: RecordId::new(),
            payer: user(debtor),
            creditor: user(creditor),
            amount,
            group_id: None,
            created_at: 1708123456789000000,
        }
    }

    #[test]
    fn test_equal_split_remainder_law() {
        // 100 split among 3 → {34, 33, 33}, assigned in ascending order.
        let shares = split_amount(Decimal::from(100), 3);
        assert_eq!(
            shares,
            vec![Decimal::from(34), Decimal::from(33), Decimal::from(33)]
        );
        assert_eq!(shares.iter().sum::<Decimal>(), Decimal::from(100));
    }

    #[test]
    fn test_cent_precision_split() {
        let shares = split_amount(Decimal::new(10000, 2), 3); // 100.00
        assert_eq!(
            shares,
            vec![
                Decimal::new(3334, 2),
                Decimal::new(3333, 2),
                Decimal::new(3333, 2)
            ]
        );
        assert_eq!(shares.iter().sum::<Decimal>(), Decimal::new(10000, 2));
    }

    #[test]
    fn test_split_single_participant() {
        let shares = split_amount(Decimal::new(999, 2), 1);
        assert_eq!(shares, vec![Decimal::new(999, 2)]);
    }

    #[test]
    fn test_group_scenario() {
        // Group {A,B,C}; expense(90, payer=A, participants={A,B,C}) ⇒
        // B owes A 30, C owes A 30, nets A:+60 B:-30 C:-30.
        let members = users(&["a", "b", "c"]);
        let records = vec![expense("a", &["a", "b", "c"], Decimal::from(90))];

        let (state, faults) = build_balances(&members, &records);
        assert!(faults.is_empty());
        assert_eq!(state.owed(&user("b"), &user("a")), Decimal::from(30));
        assert_eq!(state.owed(&user("c"), &user("a")), Decimal::from(30));
        assert_eq!(state.net_of(&user("a")), Decimal::from(60));
        assert_eq!(state.net_of(&user("b")), Decimal::from(-30));
        assert_eq!(state.net_of(&user("c")), Decimal::from(-30));
        assert!(state.conservation_holds());
    }

    #[test]
    fn test_settlement_cancels_debt() {
        let members = users(&["a", "b"]);
        let records = vec![
            expense("b", &["a", "b"], Decimal::from(100)),
            settlement("a", "b", Decimal::from(50)),
        ];

        let (state, _) = build_balances(&members, &records);
        assert_eq!(state.owed(&user("a"), &user("b")), Decimal::ZERO);
        assert_eq!(state.net_of(&user("a")), Decimal::ZERO);
        assert_eq!(state.net_of(&user("b")), Decimal::ZERO);
        assert!(state.is_settled());
    }

    #[test]
    fn test_settlement_after_group_scenario() {
        let members = users(&["a", "b", "c"]);
        let records = vec![
            expense("a", &["a", "b", "c"], Decimal::from(90)),
            settlement("b", "a", Decimal::from(30)),
        ];

        let (state, _) = build_balances(&members, &records);
        assert_eq!(state.net_of(&user("b")), Decimal::ZERO);
        assert_eq!(state.net_of(&user("a")), Decimal::from(30));
        assert_eq!(state.net_of(&user("c")), Decimal::from(-30));
        assert!(state.conservation_holds());
    }

    #[test]
    fn test_opposite_debts_net_to_single_direction() {
        // A owes B 30, B owes A 10 → A owes B 20.
        let members = users(&["a", "b"]);
        let records = vec![
            expense("b", &["a"], Decimal::from(30)),
            expense("a", &["b"], Decimal::from(10)),
        ];

        let (state, _) = build_balances(&members, &records);
        assert_eq!(state.owed(&user("a"), &user("b")), Decimal::from(20));
        assert_eq!(state.owed(&user("b"), &user("a")), Decimal::ZERO);
        assert_eq!(state.pairwise.len(), 1);
    }

    #[test]
    fn test_self_payer_exclusion() {
        // Entirely paid and shared by one participant → zero contribution.
        let members = users(&["a", "b"]);
        let records = vec![expense("a", &["a"], Decimal::from(42))];

        let (state, _) = build_balances(&members, &records);
        assert!(state.is_settled());
        assert_eq!(state.net_of(&user("a")), Decimal::ZERO);
    }

    #[test]
    fn test_payer_outside_participant_set() {
        let members = users(&["a", "b", "c"]);
        let records = vec![expense("a", &["b", "c"], Decimal::from(50))];

        let (state, _) = build_balances(&members, &records);
        assert_eq!(state.owed(&user("b"), &user("a")), Decimal::from(25));
        assert_eq!(state.owed(&user("c"), &user("a")), Decimal::from(25));
        assert_eq!(state.net_of(&user("a")), Decimal::from(50));
    }

    #[test]
    fn test_malformed_records_excluded_not_fatal() {
        let members = users(&["a", "b"]);
        let records = vec![
            expense("a", &["a", "b"], Decimal::from(-10)),
            LedgerRecord::Expense {
                record_id: RecordId::new(),
                description: "No participants".to_string(),
                amount: Decimal::from(10),
                payer: user("a"),
                participants: BTreeSet::new(),
                group_id: None,
                created_at: 0,
            },
            expense("a", &["a", "b"], Decimal::from(20)),
        ];

        let (state, faults) = build_balances(&members, &records);
        assert_eq!(faults.len(), 2);
        // Only the valid expense contributes.
        assert_eq!(state.owed(&user("b"), &user("a")), Decimal::from(10));
        assert!(state.conservation_holds());
    }

    #[test]
    fn test_idempotent_rebuild() {
        let members = users(&["a", "b", "c"]);
        let records = vec![
            expense("a", &["a", "b", "c"], Decimal::new(10001, 2)),
            settlement("b", "a", Decimal::new(1200, 2)),
            expense("c", &["a", "b"], Decimal::new(999, 2)),
        ];

        let (first, _) = build_balances(&members, &records);
        let (second, _) = build_balances(&members, &records);
        assert_eq!(first, second, "identical inputs must rebuild identically");
    }

    #[test]
    fn test_inactive_member_shows_zero() {
        let members = users(&["a", "b", "idle"]);
        let records = vec![expense("a", &["a", "b"], Decimal::from(10))];

        let (state, _) = build_balances(&members, &records);
        assert_eq!(state.net_of(&user("idle")), Decimal::ZERO);
        assert!(state.net.contains_key(&user("idle")));
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;
    use types::ids::RecordId;

    const USER_POOL: [&str; 5] = ["ana", "ben", "cal", "dee", "eli"];

    fn user(id: &str) -> UserId {
        UserId::new(id)
    }

    prop_compose! {
        fn arb_expense()(
            payer_idx in 0usize..USER_POOL.len(),
            mask in 1u8..(1 << USER_POOL.len()) as u8,
            cents in 1i64..1_000_000,
        ) -> LedgerRecord {
            let participants: BTreeSet<UserId> = USER_POOL
                .iter()
                .enumerate()
                .filter(|(i, _)| mask & (1 << i) != 0)
                .map(|(_, id)| user(id))
                .collect();
            LedgerRecord::Expense {
                record_id: RecordId::new(),
                description: "prop".to_string(),
                amount: Decimal::new(cents, 2),
                payer: user(USER_POOL[payer_idx]),
                participants,
                group_id: None,
                created_at: 0,
            }
        }
    }

    prop_compose! {
        fn arb_settlement()(
            debtor_idx in 0usize..USER_POOL.len(),
            creditor_idx in 0usize..USER_POOL.len(),
            cents in 1i64..1_000_000,
        ) -> LedgerRecord {
            LedgerRecord::Settlement {
                record_id: RecordId::new(),
                payer: user(USER_POOL[debtor_idx]),
                creditor: user(USER_POOL[creditor_idx]),
                amount: Decimal::new(cents, 2),
                group_id: None,
                created_at: 0,
            }
        }
    }

    proptest! {
        #[test]
        fn prop_shares_sum_to_amount(
            cents in 1i64..10_000_000,
            count in 1usize..24,
        ) {
            let amount = Decimal::new(cents, 2);
            let shares = split_amount(amount, count);

            prop_assert_eq!(shares.len(), count);
            prop_assert_eq!(shares.iter().sum::<Decimal>(), amount);

            // Shares differ pairwise by at most one unit.
            let max = shares.iter().max().unwrap();
            let min = shares.iter().min().unwrap();
            prop_assert!(*max - *min <= Decimal::new(1, 2));
        }

        #[test]
        fn prop_conservation(
            records in prop::collection::vec(
                prop_oneof![arb_expense(), arb_settlement()],
                0..40,
            ),
        ) {
            let members: BTreeSet<UserId> =
                USER_POOL.iter().map(|id| user(id)).collect();
            let (state, _) = build_balances(&members, &records);

            prop_assert!(state.conservation_holds());
            for amount in state.pairwise.values() {
                prop_assert!(*amount > Decimal::ZERO);
            }
        }
    }
}
