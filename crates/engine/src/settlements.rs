//! Direct member-to-member settlements.
//!
//! A settlement is a real payment between two members, independent of any
//! expense: no splitting, just a symmetric balance transfer plus an immutable
//! history row for audit.

use chrono::{DateTime, Utc};
use sea_orm::{ActiveValue, entity::prelude::*};
use uuid::Uuid;

use crate::{BalanceSheet, EngineError, MoneyCents, ResultEngine};

/// A recorded payment from one member to another.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Settlement {
    pub id: Uuid,
    pub group_id: String,
    /// The payer. Under the "negative balance = owes" convention the payer's
    /// balance moves up toward zero.
    pub settle_from: String,
    /// The payee; their balance moves down toward zero.
    pub settle_to: String,
    pub amount: MoneyCents,
    pub settle_date: DateTime<Utc>,
}

impl Settlement {
    pub fn new(
        group_id: &str,
        settle_from: &str,
        settle_to: &str,
        amount: MoneyCents,
        settle_date: DateTime<Utc>,
    ) -> ResultEngine<Self> {
        if !amount.is_positive() {
            return Err(EngineError::InvalidSettlement(
                "settlement amount must be positive".to_string(),
            ));
        }
        if settle_from == settle_to {
            return Err(EngineError::InvalidSettlement(
                "settle_from and settle_to must differ".to_string(),
            ));
        }
        Ok(Self {
            id: Uuid::new_v4(),
            group_id: group_id.to_string(),
            settle_from: settle_from.to_string(),
            settle_to: settle_to.to_string(),
            amount,
            settle_date,
        })
    }
}

/// Applies a settlement to the sheet and returns the new sheet.
///
/// The payer gains `amount`, the payee loses it; only two entries are touched
/// and the amount is already whole cents, so there is no rounding residual.
pub fn apply_settlement(
    sheet: &BalanceSheet,
    settle_from: &str,
    settle_to: &str,
    amount: MoneyCents,
) -> ResultEngine<BalanceSheet> {
    if !amount.is_positive() {
        return Err(EngineError::InvalidSettlement(
            "settlement amount must be positive".to_string(),
        ));
    }
    if settle_from == settle_to {
        return Err(EngineError::InvalidSettlement(
            "settle_from and settle_to must differ".to_string(),
        ));
    }
    if !sheet.contains(settle_from) {
        return Err(EngineError::UnknownMember(settle_from.to_string()));
    }
    if !sheet.contains(settle_to) {
        return Err(EngineError::UnknownMember(settle_to.to_string()));
    }

    let mut next = sheet.clone();
    next.adjust(settle_from, amount)?;
    next.adjust(settle_to, -amount)?;
    Ok(next)
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq)]
#[sea_orm(table_name = "settlements")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub group_id: String,
    pub settle_from: String,
    pub settle_to: String,
    pub amount_minor: i64,
    pub settle_date: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::groups::Entity",
        from = "Column::GroupId",
        to = "super::groups::Column::Id",
        on_update = "NoAction",
        on_delete = "Cascade"
    )]
    Groups,
}

impl Related<super::groups::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Groups.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl From<&Settlement> for ActiveModel {
    fn from(value: &Settlement) -> Self {
        Self {
            id: ActiveValue::Set(value.id.to_string()),
            group_id: ActiveValue::Set(value.group_id.clone()),
            settle_from: ActiveValue::Set(value.settle_from.clone()),
            settle_to: ActiveValue::Set(value.settle_to.clone()),
            amount_minor: ActiveValue::Set(value.amount.cents()),
            settle_date: ActiveValue::Set(value.settle_date),
        }
    }
}

impl TryFrom<Model> for Settlement {
    type Error = EngineError;

    fn try_from(model: Model) -> Result<Self, Self::Error> {
        Ok(Self {
            id: Uuid::parse_str(&model.id)
                .map_err(|_| EngineError::CorruptRecord(format!("settlement id: {}", model.id)))?,
            group_id: model.group_id,
            settle_from: model.settle_from,
            settle_to: model.settle_to,
            amount: MoneyCents::new(model.amount_minor),
            settle_date: model.settle_date,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sheet_ab() -> BalanceSheet {
        let mut sheet = BalanceSheet::new(["a@mail.com", "b@mail.com"]);
        sheet.adjust("a@mail.com", MoneyCents::new(-25_00)).unwrap();
        sheet.adjust("b@mail.com", MoneyCents::new(25_00)).unwrap();
        sheet
    }

    #[test]
    fn payment_moves_payer_toward_zero() {
        let sheet = apply_settlement(
            &sheet_ab(),
            "a@mail.com",
            "b@mail.com",
            MoneyCents::new(25_00),
        )
        .unwrap();

        assert_eq!(sheet.get("a@mail.com"), Some(MoneyCents::ZERO));
        assert_eq!(sheet.get("b@mail.com"), Some(MoneyCents::ZERO));
    }

    #[test]
    fn swapped_settlement_restores_original() {
        let start = sheet_ab();
        let amount = MoneyCents::new(10_00);
        let paid = apply_settlement(&start, "a@mail.com", "b@mail.com", amount).unwrap();
        let back = apply_settlement(&paid, "b@mail.com", "a@mail.com", amount).unwrap();
        assert_eq!(back, start);
    }

    #[test]
    fn self_settlement_fails() {
        let err = apply_settlement(
            &sheet_ab(),
            "a@mail.com",
            "a@mail.com",
            MoneyCents::new(5_00),
        )
        .unwrap_err();
        assert!(matches!(err, EngineError::InvalidSettlement(_)));
    }

    #[test]
    fn unknown_party_fails() {
        let err = apply_settlement(
            &sheet_ab(),
            "eve@mail.com",
            "b@mail.com",
            MoneyCents::new(5_00),
        )
        .unwrap_err();
        assert_eq!(err, EngineError::UnknownMember("eve@mail.com".to_string()));
    }

    #[test]
    fn non_positive_amount_fails() {
        let err = apply_settlement(&sheet_ab(), "a@mail.com", "b@mail.com", MoneyCents::ZERO)
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidSettlement(_)));
    }
}
