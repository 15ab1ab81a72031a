//! Expense records.
//!
//! An expense is paid by one member (the owner) and shared by a list of
//! members; the owner may or may not be in that list. The per-member share is
//! derived at creation time and stored for reporting; the authoritative
//! balance effect lives in the group's sheet.

use chrono::{DateTime, Utc};
use sea_orm::{ActiveValue, entity::prelude::*};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Currency, EngineError, MoneyCents, ResultEngine};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpenseKind {
    #[default]
    Cash,
    Card,
}

impl ExpenseKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Cash => "cash",
            Self::Card => "card",
        }
    }
}

impl TryFrom<&str> for ExpenseKind {
    type Error = EngineError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "cash" => Ok(Self::Cash),
            "card" => Ok(Self::Card),
            other => Err(EngineError::InvalidExpense(format!(
                "invalid expense kind: {other}"
            ))),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Expense {
    pub id: Uuid,
    pub group_id: String,
    pub name: String,
    pub description: Option<String>,
    pub amount: MoneyCents,
    pub category: String,
    pub currency: Currency,
    pub date: DateTime<Utc>,
    pub owner: String,
    pub members: Vec<String>,
    /// Rounded share of `amount` per listed member. Informational: the owner
    /// additionally absorbs the rounding residual in the balance sheet.
    pub per_member: MoneyCents,
    pub kind: ExpenseKind,
}

impl Expense {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        group_id: &str,
        name: &str,
        description: Option<&str>,
        amount: MoneyCents,
        category: Option<&str>,
        currency: Currency,
        date: DateTime<Utc>,
        owner: &str,
        members: Vec<String>,
        kind: ExpenseKind,
    ) -> ResultEngine<Self> {
        if name.trim().is_empty() {
            return Err(EngineError::InvalidExpense(
                "expense name must not be empty".to_string(),
            ));
        }
        if !amount.is_positive() {
            return Err(EngineError::InvalidExpense(
                "expense amount must be positive".to_string(),
            ));
        }
        if members.is_empty() {
            return Err(EngineError::InvalidExpense(
                "expense needs at least one member".to_string(),
            ));
        }
        let per_member = amount.split_among(members.len())?;
        Ok(Self {
            id: Uuid::new_v4(),
            group_id: group_id.to_string(),
            name: name.to_string(),
            description: description.map(|s| s.to_string()),
            amount,
            category: category
                .unwrap_or(super::groups::DEFAULT_CATEGORY)
                .to_string(),
            currency,
            date,
            owner: owner.to_string(),
            members,
            per_member,
            kind,
        })
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq)]
#[sea_orm(table_name = "expenses")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub group_id: String,
    pub name: String,
    pub description: Option<String>,
    pub amount_minor: i64,
    pub category: String,
    pub currency: String,
    pub date: DateTimeUtc,
    pub owner: String,
    pub members: String,
    pub per_member_minor: i64,
    pub kind: String,
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

impl TryFrom<&Expense> for ActiveModel {
    type Error = EngineError;

    fn try_from(value: &Expense) -> Result<Self, Self::Error> {
        let members = serde_json::to_string(&value.members)
            .map_err(|err| EngineError::CorruptRecord(format!("expense members: {err}")))?;
        Ok(Self {
            id: ActiveValue::Set(value.id.to_string()),
            group_id: ActiveValue::Set(value.group_id.clone()),
            name: ActiveValue::Set(value.name.clone()),
            description: ActiveValue::Set(value.description.clone()),
            amount_minor: ActiveValue::Set(value.amount.cents()),
            category: ActiveValue::Set(value.category.clone()),
            currency: ActiveValue::Set(value.currency.code().to_string()),
            date: ActiveValue::Set(value.date),
            owner: ActiveValue::Set(value.owner.clone()),
            members: ActiveValue::Set(members),
            per_member_minor: ActiveValue::Set(value.per_member.cents()),
            kind: ActiveValue::Set(value.kind.as_str().to_string()),
        })
    }
}

impl TryFrom<Model> for Expense {
    type Error = EngineError;

    fn try_from(model: Model) -> Result<Self, Self::Error> {
        let members: Vec<String> = serde_json::from_str(&model.members)
            .map_err(|err| EngineError::CorruptRecord(format!("expense members: {err}")))?;
        Ok(Self {
            id: Uuid::parse_str(&model.id)
                .map_err(|_| EngineError::CorruptRecord(format!("expense id: {}", model.id)))?,
            group_id: model.group_id,
            name: model.name,
            description: model.description,
            amount: MoneyCents::new(model.amount_minor),
            category: model.category,
            currency: Currency::try_from(model.currency.as_str())?,
            date: model.date,
            owner: model.owner,
            members,
            per_member: MoneyCents::new(model.per_member_minor),
            kind: ExpenseKind::try_from(model.kind.as_str())?,
        })
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;

    #[test]
    fn new_expense_derives_per_member_share() {
        let expense = Expense::new(
            "group-1",
            "Dinner",
            None,
            MoneyCents::new(100_00),
            Some("Food"),
            Currency::Eur,
            Utc.timestamp_opt(0, 0).unwrap(),
            "a@mail.com",
            vec!["a@mail.com".to_string(), "b@mail.com".to_string(), "c@mail.com".to_string()],
            ExpenseKind::Card,
        )
        .unwrap();

        assert_eq!(expense.per_member, MoneyCents::new(33_33));
        assert_eq!(expense.category, "Food");
    }

    #[test]
    fn new_expense_rejects_empty_members() {
        let err = Expense::new(
            "group-1",
            "Dinner",
            None,
            MoneyCents::new(100_00),
            None,
            Currency::Eur,
            Utc.timestamp_opt(0, 0).unwrap(),
            "a@mail.com",
            Vec::new(),
            ExpenseKind::Cash,
        )
        .unwrap_err();
        assert!(matches!(err, EngineError::InvalidExpense(_)));
    }

    #[test]
    fn new_expense_rejects_non_positive_amount() {
        let err = Expense::new(
            "group-1",
            "Dinner",
            None,
            MoneyCents::ZERO,
            None,
            Currency::Eur,
            Utc.timestamp_opt(0, 0).unwrap(),
            "a@mail.com",
            vec!["a@mail.com".to_string()],
            ExpenseKind::Cash,
        )
        .unwrap_err();
        assert!(matches!(err, EngineError::InvalidExpense(_)));
    }
}
