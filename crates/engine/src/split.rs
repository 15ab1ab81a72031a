//! Expense split application.
//!
//! Splitting an amount among members produces per-member shares that may not
//! sum back to the amount exactly (100.00 over three members is 33.33 each,
//! 0.01 short). The residual always lands on the expense owner, so the sheet
//! keeps summing to zero and the tie-break is deterministic and auditable.

use crate::{BalanceSheet, EngineError, MoneyCents, ResultEngine};

/// Applies one expense to the sheet and returns the new sheet.
///
/// The owner is credited the full amount, every listed member (the owner may
/// or may not be among them) is debited the rounded per-member share, and the
/// rounding residual is charged to the owner.
///
/// Fails with [`EngineError::InvalidExpense`] for a non-positive amount or an
/// empty member list, and with [`EngineError::UnknownMember`] when the owner
/// or a member has no entry in the sheet. The input sheet is never modified.
pub fn apply_expense(
    sheet: &BalanceSheet,
    amount: MoneyCents,
    owner: &str,
    members: &[String],
) -> ResultEngine<BalanceSheet> {
    if !amount.is_positive() {
        return Err(EngineError::InvalidExpense(
            "expense amount must be positive".to_string(),
        ));
    }
    apply_signed(sheet, amount, owner, members)
}

/// Reverses one previously applied expense and returns the new sheet.
///
/// Exact algebraic inverse of [`apply_expense`]: for any sheet `S`,
/// `revert_expense(apply_expense(S, a, o, m), a, o, m) == S`. Used by the
/// expense edit and delete flows.
pub fn revert_expense(
    sheet: &BalanceSheet,
    amount: MoneyCents,
    owner: &str,
    members: &[String],
) -> ResultEngine<BalanceSheet> {
    if !amount.is_positive() {
        return Err(EngineError::InvalidExpense(
            "expense amount must be positive".to_string(),
        ));
    }
    apply_signed(sheet, -amount, owner, members)
}

/// Shared body of apply/revert; revert is apply with the amount negated, and
/// half-away-from-zero rounding is sign-symmetric so the two are exact
/// inverses.
fn apply_signed(
    sheet: &BalanceSheet,
    amount: MoneyCents,
    owner: &str,
    members: &[String],
) -> ResultEngine<BalanceSheet> {
    if members.is_empty() {
        return Err(EngineError::InvalidExpense(
            "expense needs at least one member".to_string(),
        ));
    }
    // Membership is the caller's job, but a violation here would silently
    // corrupt the sheet, so every party is checked before any adjustment.
    if !sheet.contains(owner) {
        return Err(EngineError::UnknownMember(owner.to_string()));
    }
    for member in members {
        if !sheet.contains(member) {
            return Err(EngineError::UnknownMember(member.clone()));
        }
    }

    let per_share = amount.split_among(members.len())?;
    // What the rounded shares miss (or overshoot) relative to the amount.
    let residual = amount - per_share * members.len() as i64;

    let mut next = sheet.clone();
    next.adjust(owner, amount)?;
    for member in members {
        next.adjust(member, -per_share)?;
    }
    next.adjust(owner, -residual)?;

    if next.net() != sheet.net() {
        tracing::error!(
            owner,
            amount = amount.cents(),
            "expense split changed the sheet net"
        );
        return Err(EngineError::ArithmeticInvariant(
            "expense split changed the sheet net".to_string(),
        ));
    }
    Ok(next)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sheet_abc() -> BalanceSheet {
        BalanceSheet::new(["a@mail.com", "b@mail.com", "c@mail.com"])
    }

    fn cents(sheet: &BalanceSheet, member: &str) -> i64 {
        sheet.get(member).unwrap().cents()
    }

    #[test]
    fn owner_absorbs_rounding_cent() {
        // 100.00 among three: share 33.33, residual 0.01 charged to the owner.
        let sheet = apply_expense(
            &sheet_abc(),
            MoneyCents::new(100_00),
            "a@mail.com",
            &[
                "a@mail.com".to_string(),
                "b@mail.com".to_string(),
                "c@mail.com".to_string(),
            ],
        )
        .unwrap();

        assert_eq!(cents(&sheet, "a@mail.com"), 66_66);
        assert_eq!(cents(&sheet, "b@mail.com"), -33_33);
        assert_eq!(cents(&sheet, "c@mail.com"), -33_33);
        assert!(sheet.net().is_zero());
    }

    #[test]
    fn owner_outside_member_list_pays_nothing() {
        let sheet = apply_expense(
            &sheet_abc(),
            MoneyCents::new(90_00),
            "a@mail.com",
            &["b@mail.com".to_string(), "c@mail.com".to_string()],
        )
        .unwrap();

        assert_eq!(cents(&sheet, "a@mail.com"), 90_00);
        assert_eq!(cents(&sheet, "b@mail.com"), -45_00);
        assert_eq!(cents(&sheet, "c@mail.com"), -45_00);
        assert!(sheet.net().is_zero());
    }

    #[test]
    fn negative_residual_also_lands_on_owner() {
        // 100.00 among seven: share 14.29, 7 * 14.29 = 100.03, residual -0.03.
        let members: Vec<String> = (0..7).map(|i| format!("m{i}@mail.com")).collect();
        let base = BalanceSheet::new(members.iter().map(String::as_str));
        let sheet = apply_expense(&base, MoneyCents::new(100_00), "m0@mail.com", &members).unwrap();

        assert_eq!(cents(&sheet, "m1@mail.com"), -14_29);
        // owner: +100.00 - 14.29 + 0.03
        assert_eq!(cents(&sheet, "m0@mail.com"), 85_74);
        assert!(sheet.net().is_zero());
    }

    #[test]
    fn revert_is_exact_inverse() {
        let mut start = sheet_abc();
        // Start from a non-trivial sheet.
        start.adjust("a@mail.com", MoneyCents::new(12_34)).unwrap();
        start.adjust("b@mail.com", MoneyCents::new(-12_34)).unwrap();

        let members = vec![
            "a@mail.com".to_string(),
            "b@mail.com".to_string(),
            "c@mail.com".to_string(),
        ];
        let amount = MoneyCents::new(77_77);
        let applied = apply_expense(&start, amount, "b@mail.com", &members).unwrap();
        let reverted = revert_expense(&applied, amount, "b@mail.com", &members).unwrap();

        assert_eq!(reverted, start);
    }

    #[test]
    fn zero_sum_holds_across_sequences() {
        let members = vec![
            "a@mail.com".to_string(),
            "b@mail.com".to_string(),
            "c@mail.com".to_string(),
        ];
        let mut sheet = sheet_abc();
        for (amount, owner) in [
            (100_00, "a@mail.com"),
            (13_37, "b@mail.com"),
            (99_99, "c@mail.com"),
            (1, "a@mail.com"),
        ] {
            sheet = apply_expense(&sheet, MoneyCents::new(amount), owner, &members).unwrap();
            assert!(sheet.net().is_zero());
        }
        sheet = revert_expense(&sheet, MoneyCents::new(13_37), "b@mail.com", &members).unwrap();
        assert!(sheet.net().is_zero());
    }

    #[test]
    fn empty_member_list_fails() {
        let err =
            apply_expense(&sheet_abc(), MoneyCents::new(10_00), "a@mail.com", &[]).unwrap_err();
        assert!(matches!(err, EngineError::InvalidExpense(_)));
    }

    #[test]
    fn non_positive_amount_fails() {
        let members = vec!["a@mail.com".to_string()];
        for amount in [0, -100] {
            let err = apply_expense(&sheet_abc(), MoneyCents::new(amount), "a@mail.com", &members)
                .unwrap_err();
            assert!(matches!(err, EngineError::InvalidExpense(_)));
        }
    }

    #[test]
    fn unknown_owner_or_member_fails_without_corruption() {
        let base = sheet_abc();
        let members = vec!["a@mail.com".to_string(), "eve@mail.com".to_string()];

        let err =
            apply_expense(&base, MoneyCents::new(10_00), "eve@mail.com", &members).unwrap_err();
        assert_eq!(err, EngineError::UnknownMember("eve@mail.com".to_string()));

        let err = apply_expense(&base, MoneyCents::new(10_00), "a@mail.com", &members).unwrap_err();
        assert_eq!(err, EngineError::UnknownMember("eve@mail.com".to_string()));
    }
}
