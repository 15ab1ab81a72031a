//! Group state: the members of a shared-expense group and their running
//! balances.

use sea_orm::{ActiveValue, entity::prelude::*};
use uuid::Uuid;

use crate::{BalanceSheet, Currency, EngineError, MoneyCents, ResultEngine};

pub const DEFAULT_CATEGORY: &str = "Others";

/// A shared-expense group.
///
/// The balance sheet is the authoritative "who owes whom" state; `total` is
/// the running sum of every expense currently applied (edits and deletes
/// subtract, so it is not monotonic in time). `version` is the optimistic
/// concurrency counter checked on every write.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Group {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub owner: String,
    pub members: Vec<String>,
    pub category: String,
    pub currency: Currency,
    pub total: MoneyCents,
    pub balances: BalanceSheet,
    pub version: i64,
}

impl Group {
    /// Creates a group with every member at balance 0.
    ///
    /// The owner is always a member, listed or not. Duplicate members are
    /// rejected rather than silently collapsed.
    pub fn new(
        name: &str,
        description: Option<&str>,
        owner: &str,
        members: &[String],
        currency: Currency,
        category: Option<&str>,
    ) -> ResultEngine<Self> {
        if name.trim().is_empty() {
            return Err(EngineError::InvalidGroup(
                "group name must not be empty".to_string(),
            ));
        }

        let mut all_members: Vec<String> = Vec::with_capacity(members.len() + 1);
        for member in members {
            if all_members.contains(member) {
                return Err(EngineError::ExistingKey(member.clone()));
            }
            all_members.push(member.clone());
        }
        if !all_members.iter().any(|member| member == owner) {
            all_members.push(owner.to_string());
        }

        Ok(Self {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            description: description.map(|s| s.to_string()),
            owner: owner.to_string(),
            category: category.unwrap_or(DEFAULT_CATEGORY).to_string(),
            currency,
            total: MoneyCents::ZERO,
            balances: BalanceSheet::new(all_members.iter().map(String::as_str)),
            members: all_members,
            version: 0,
        })
    }

    /// Adds any member of `members` not yet in the group, at balance 0.
    ///
    /// Existing members (and their balances) are never removed here: a member
    /// with outstanding debt cannot simply disappear from the sheet.
    pub fn add_missing_members(&mut self, members: &[String]) {
        for member in members {
            if !self.members.contains(member) {
                self.members.push(member.clone());
                self.balances.add_member(member);
            }
        }
    }

    /// Checks that `member` belongs to this group.
    pub fn check_member(&self, member: &str) -> ResultEngine<()> {
        if self.balances.contains(member) {
            Ok(())
        } else {
            Err(EngineError::UnknownMember(member.to_string()))
        }
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq)]
#[sea_orm(table_name = "groups")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub owner: String,
    pub members: String,
    pub category: String,
    pub currency: String,
    pub total_minor: i64,
    pub balances: String,
    pub version: i64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::expenses::Entity")]
    Expenses,
    #[sea_orm(has_many = "super::settlements::Entity")]
    Settlements,
}

impl Related<super::expenses::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Expenses.def()
    }
}

impl Related<super::settlements::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Settlements.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl TryFrom<&Group> for ActiveModel {
    type Error = EngineError;

    fn try_from(value: &Group) -> Result<Self, Self::Error> {
        let members = serde_json::to_string(&value.members)
            .map_err(|err| EngineError::CorruptRecord(format!("group members: {err}")))?;
        Ok(Self {
            id: ActiveValue::Set(value.id.clone()),
            name: ActiveValue::Set(value.name.clone()),
            description: ActiveValue::Set(value.description.clone()),
            owner: ActiveValue::Set(value.owner.clone()),
            members: ActiveValue::Set(members),
            category: ActiveValue::Set(value.category.clone()),
            currency: ActiveValue::Set(value.currency.code().to_string()),
            total_minor: ActiveValue::Set(value.total.cents()),
            balances: ActiveValue::Set(value.balances.to_json()?),
            version: ActiveValue::Set(value.version),
        })
    }
}

impl TryFrom<Model> for Group {
    type Error = EngineError;

    fn try_from(model: Model) -> Result<Self, Self::Error> {
        let members: Vec<String> = serde_json::from_str(&model.members)
            .map_err(|err| EngineError::CorruptRecord(format!("group members: {err}")))?;
        Ok(Self {
            id: model.id,
            name: model.name,
            description: model.description,
            owner: model.owner,
            members,
            category: model.category,
            currency: Currency::try_from(model.currency.as_str())?,
            total: MoneyCents::new(model.total_minor),
            balances: BalanceSheet::from_json(&model.balances)?,
            version: model.version,
        })
    }
}
