//! Debt simplification.
//!
//! Turns a group's balance sheet into a short list of transfers ("who pays
//! whom how much") that settles every balance to zero. Two phases:
//!
//! 1. exactly-offsetting pairs cancel directly, which keeps the common
//!    two-person case to a single transfer;
//! 2. the largest debtor repeatedly pays the largest creditor as much as one
//!    of them needs.
//!
//! The result is not guaranteed to be the theoretical minimum number of
//! transfers (that is a hard combinatorial problem) but it is deterministic,
//! easy to audit, and bounded by `members - 1` transfers.

use serde::Serialize;

use crate::{BalanceSheet, EngineError, MoneyCents, ResultEngine};

/// One settling payment in a [`simplify_debts`] plan.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Transfer {
    pub from: String,
    pub to: String,
    pub amount: MoneyCents,
}

/// Computes a settlement plan for the sheet.
///
/// The sheet is read-only; the plan is produced fresh on every call and never
/// persisted. Requires a zero-sum input (the ledger invariant); a sheet that
/// cannot settle to zero fails with [`EngineError::ArithmeticInvariant`].
pub fn simplify_debts(sheet: &BalanceSheet) -> ResultEngine<Vec<Transfer>> {
    let mut balances: Vec<(&str, MoneyCents)> = sheet.iter().collect();
    let mut transfers = Vec::new();

    settle_matching_pairs(&mut balances, &mut transfers);
    settle_greedy(&mut balances, &mut transfers);

    if let Some((member, balance)) = balances.iter().find(|(_, balance)| !balance.is_zero()) {
        tracing::error!(
            member,
            balance = balance.cents(),
            "simplification left a nonzero balance"
        );
        return Err(EngineError::ArithmeticInvariant(format!(
            "balances do not settle to zero ({member}: {balance})"
        )));
    }
    Ok(transfers)
}

/// Phase 1: cancel exactly-offsetting pairs.
///
/// Members are scanned in sheet order; each one pairs with the first later
/// member holding the exact opposite balance, and both drop to zero. Zero
/// balances never pair (a plan contains strictly positive amounts only).
fn settle_matching_pairs(balances: &mut [(&str, MoneyCents)], transfers: &mut Vec<Transfer>) {
    for first in 0..balances.len() {
        if balances[first].1.is_zero() {
            continue;
        }
        for second in (first + 1)..balances.len() {
            if balances[second].1.is_zero() || balances[first].1 != -balances[second].1 {
                continue;
            }
            let (debtor, creditor) = if balances[first].1.is_negative() {
                (first, second)
            } else {
                (second, first)
            };
            transfers.push(Transfer {
                from: balances[debtor].0.to_string(),
                to: balances[creditor].0.to_string(),
                amount: balances[creditor].1,
            });
            balances[first].1 = MoneyCents::ZERO;
            balances[second].1 = MoneyCents::ZERO;
            break;
        }
    }
}

/// Phase 2: repeatedly match the largest debtor with the largest creditor.
///
/// Each round zeroes at least one of the two, so for a zero-sum input the
/// loop bound of one round per member is never reached; it exists to keep
/// malformed input from looping forever (the recursive formulation this
/// replaces had no such guard).
fn settle_greedy(balances: &mut [(&str, MoneyCents)], transfers: &mut Vec<Transfer>) {
    for _ in 0..balances.len() {
        // First encountered wins ties, which keeps plans deterministic.
        let mut debtor = 0;
        let mut creditor = 0;
        for (idx, (_, balance)) in balances.iter().enumerate() {
            if *balance < balances[debtor].1 {
                debtor = idx;
            }
            if *balance > balances[creditor].1 {
                creditor = idx;
            }
        }

        let amount = (-balances[debtor].1).min(balances[creditor].1);
        if !amount.is_positive() {
            // Either everything is settled or the input was not zero-sum;
            // the caller distinguishes the two.
            return;
        }

        balances[debtor].1 += amount;
        balances[creditor].1 -= amount;
        transfers.push(Transfer {
            from: balances[debtor].0.to_string(),
            to: balances[creditor].0.to_string(),
            amount,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sheet(entries: &[(&str, i64)]) -> BalanceSheet {
        let mut sheet = BalanceSheet::new(entries.iter().map(|(member, _)| *member));
        for (member, cents) in entries {
            sheet.adjust(member, MoneyCents::new(*cents)).unwrap();
        }
        sheet
    }

    /// Replays a plan against the sheet it was computed from.
    fn replay(sheet: &BalanceSheet, plan: &[Transfer]) -> BalanceSheet {
        let mut result = sheet.clone();
        for transfer in plan {
            result.adjust(&transfer.from, transfer.amount).unwrap();
            result.adjust(&transfer.to, -transfer.amount).unwrap();
        }
        result
    }

    #[test]
    fn all_zero_yields_empty_plan() {
        let plan = simplify_debts(&sheet(&[("a", 0), ("b", 0), ("c", 0)])).unwrap();
        assert!(plan.is_empty());
    }

    #[test]
    fn empty_sheet_yields_empty_plan() {
        let plan = simplify_debts(&BalanceSheet::default()).unwrap();
        assert!(plan.is_empty());
    }

    #[test]
    fn offsetting_pair_cancels_directly() {
        let plan = simplify_debts(&sheet(&[("a", -10_00), ("b", 10_00)])).unwrap();
        assert_eq!(
            plan,
            vec![Transfer {
                from: "a".to_string(),
                to: "b".to_string(),
                amount: MoneyCents::new(10_00),
            }]
        );
    }

    #[test]
    fn one_debtor_two_creditors() {
        let start = sheet(&[("a", -50_00), ("b", 30_00), ("c", 20_00)]);
        let plan = simplify_debts(&start).unwrap();

        assert_eq!(plan.len(), 2);
        let from_a: MoneyCents = plan
            .iter()
            .filter(|t| t.from == "a")
            .map(|t| t.amount)
            .sum();
        assert_eq!(from_a, MoneyCents::new(50_00));
        assert!(replay(&start, &plan).net().is_zero());
        assert!(replay(&start, &plan).iter().all(|(_, b)| b.is_zero()));
    }

    #[test]
    fn plan_is_deterministic() {
        let start = sheet(&[("a", -50_00), ("b", 30_00), ("c", 20_00)]);
        let first = simplify_debts(&start).unwrap();
        let second = simplify_debts(&start).unwrap();
        assert_eq!(first, second);
        // Largest creditor is served first.
        assert_eq!(first[0].to, "b");
        assert_eq!(first[1].to, "c");
    }

    #[test]
    fn pairs_cancel_before_greedy_matching() {
        // (a, d) cancel in phase 1 even though the greedy phase would have
        // matched a (largest debtor) with b (largest creditor).
        let start = sheet(&[("a", -40_00), ("b", 35_00), ("c", -35_00), ("d", 40_00)]);
        let plan = simplify_debts(&start).unwrap();

        assert_eq!(plan.len(), 2);
        assert_eq!(plan[0].from, "a");
        assert_eq!(plan[0].to, "d");
        assert_eq!(plan[0].amount, MoneyCents::new(40_00));
        assert_eq!(plan[1].from, "c");
        assert_eq!(plan[1].to, "b");
        assert!(replay(&start, &plan).iter().all(|(_, b)| b.is_zero()));
    }

    #[test]
    fn plan_settles_every_balance() {
        let cases: Vec<Vec<(&str, i64)>> = vec![
            vec![("a", -66_66), ("b", 33_33), ("c", 33_33)],
            vec![("a", 1), ("b", -1)],
            vec![("a", -10_00), ("b", -20_00), ("c", -30_00), ("d", 60_00)],
            vec![("a", 25_50), ("b", -13_00), ("c", -12_50)],
            vec![("a", -1), ("b", 2), ("c", -3), ("d", 4), ("e", -2)],
        ];
        for entries in cases {
            let start = sheet(&entries);
            let plan = simplify_debts(&start).unwrap();
            let settled = replay(&start, &plan);
            assert!(
                settled.iter().all(|(_, b)| b.is_zero()),
                "unsettled plan for {entries:?}"
            );
            assert!(plan.iter().all(|t| t.amount.is_positive()));
        }
    }

    #[test]
    fn plan_length_is_bounded_by_members_minus_one() {
        let start = sheet(&[
            ("a", -10_00),
            ("b", -20_00),
            ("c", -30_00),
            ("d", 25_00),
            ("e", 35_00),
        ]);
        let plan = simplify_debts(&start).unwrap();
        assert!(plan.len() <= start.len() - 1);
    }

    #[test]
    fn non_zero_sum_input_is_rejected() {
        let err = simplify_debts(&sheet(&[("a", -10_00), ("b", 5_00)])).unwrap_err();
        assert!(matches!(err, EngineError::ArithmeticInvariant(_)));
    }
}
