//! Per-group balance ledger.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{EngineError, MoneyCents, ResultEngine};

/// Signed balance per member within one group.
///
/// Negative = the member owes the group, positive = the group owes the member.
/// The group invariant is that all balances sum to zero; no single [`adjust`]
/// guarantees it, only the composite operations (expense apply/revert,
/// settlement apply) restore it before the sheet is considered consistent
/// again.
///
/// Backed by a `BTreeMap` so iteration order is stable; the debt simplifier
/// relies on this for deterministic output.
///
/// [`adjust`]: BalanceSheet::adjust
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BalanceSheet {
    balances: BTreeMap<String, MoneyCents>,
}

impl BalanceSheet {
    /// Creates a sheet with every member at balance 0.
    pub fn new<I, S>(members: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            balances: members
                .into_iter()
                .map(|member| (member.into(), MoneyCents::ZERO))
                .collect(),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.balances.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.balances.is_empty()
    }

    #[must_use]
    pub fn contains(&self, member: &str) -> bool {
        self.balances.contains_key(member)
    }

    #[must_use]
    pub fn get(&self, member: &str) -> Option<MoneyCents> {
        self.balances.get(member).copied()
    }

    /// Inserts `member` at balance 0 if not already present.
    ///
    /// Used when a group edit introduces new members; existing entries are
    /// left untouched.
    pub fn add_member(&mut self, member: &str) {
        self.balances
            .entry(member.to_string())
            .or_insert(MoneyCents::ZERO);
    }

    /// Adds `delta` to the member's balance.
    ///
    /// Membership must have been established beforehand; an unknown member
    /// fails with [`EngineError::UnknownMember`] and leaves the sheet
    /// unchanged.
    pub fn adjust(&mut self, member: &str, delta: MoneyCents) -> ResultEngine<()> {
        match self.balances.get_mut(member) {
            Some(balance) => {
                *balance += delta;
                Ok(())
            }
            None => Err(EngineError::UnknownMember(member.to_string())),
        }
    }

    /// Signed sum of all balances.
    ///
    /// Zero whenever the sheet is consistent; anything else is rounding
    /// residue mid-operation or a bug.
    #[must_use]
    pub fn net(&self) -> MoneyCents {
        self.balances.values().copied().sum()
    }

    /// Verifies the zero-sum invariant.
    ///
    /// A violation is a bug in a composite operation, not a user mistake, so
    /// it is logged as an error before failing.
    pub fn check_zero_sum(&self) -> ResultEngine<()> {
        let net = self.net();
        if net.is_zero() {
            Ok(())
        } else {
            tracing::error!(net = net.cents(), "balance sheet does not sum to zero");
            Err(EngineError::ArithmeticInvariant(format!(
                "balances sum to {net}, expected 0.00"
            )))
        }
    }

    /// Iterates members and balances in stable (sorted) order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, MoneyCents)> {
        self.balances
            .iter()
            .map(|(member, balance)| (member.as_str(), *balance))
    }

    /// Member ids in stable (sorted) order.
    pub fn members(&self) -> impl Iterator<Item = &str> {
        self.balances.keys().map(String::as_str)
    }

    /// Parses a sheet from its JSON column representation.
    pub fn from_json(json: &str) -> ResultEngine<Self> {
        serde_json::from_str(json)
            .map_err(|err| EngineError::CorruptRecord(format!("balance sheet: {err}")))
    }

    /// Serializes the sheet for its JSON column representation.
    pub fn to_json(&self) -> ResultEngine<String> {
        serde_json::to_string(self)
            .map_err(|err| EngineError::CorruptRecord(format!("balance sheet: {err}")))
    }
}
