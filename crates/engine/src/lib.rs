//! Shared-expense ledger engine.
//!
//! Groups hold members and a signed balance per member (negative = owes).
//! Expenses are split across members with the rounding residual charged to
//! the payer; settlements transfer balance directly between two members; the
//! debt simplifier turns a sheet into a short "who pays whom" plan.
//!
//! Every mutating operation is one atomic read-modify-write: the group row is
//! fetched fresh, the full new state is computed in memory by pure functions,
//! and a single database transaction writes it back guarded by an optimistic
//! version check. Racing writers get [`EngineError::Conflict`] and retry.

use chrono::{DateTime, Utc};
use sea_orm::{
    ConnectionTrait, QueryFilter, QueryOrder, Statement, TransactionTrait, prelude::*,
    sea_query::Expr,
};
use uuid::Uuid;

pub use balances::BalanceSheet;
pub use currency::Currency;
pub use error::EngineError;
pub use expenses::{Expense, ExpenseKind};
pub use groups::Group;
pub use money::MoneyCents;
pub use settlements::{Settlement, apply_settlement};
pub use simplify::{Transfer, simplify_debts};
pub use split::{apply_expense, revert_expense};

mod balances;
mod currency;
mod error;
mod expenses;
mod groups;
mod money;
mod settlements;
mod simplify;
mod split;

type ResultEngine<T> = Result<T, EngineError>;

#[derive(Debug)]
pub struct Engine {
    database: DatabaseConnection,
}

impl Engine {
    /// Return a builder for `Engine`. Help to build the struct.
    pub fn builder() -> EngineBuilder {
        EngineBuilder::default()
    }

    async fn load_group<C>(&self, conn: &C, group_id: &str) -> ResultEngine<Group>
    where
        C: ConnectionTrait,
    {
        let model = groups::Entity::find_by_id(group_id.to_string())
            .one(conn)
            .await?
            .ok_or_else(|| EngineError::KeyNotFound("group not exists".to_string()))?;
        Group::try_from(model)
    }

    /// Writes the group back with a compare-and-swap on its version.
    ///
    /// The row is only updated when the stored version still matches the one
    /// the group was loaded with; a miss means another writer committed in
    /// between and the whole composite operation must be retried from a fresh
    /// load.
    async fn store_group<C>(conn: &C, group: &Group) -> ResultEngine<()>
    where
        C: ConnectionTrait,
    {
        group.balances.check_zero_sum()?;

        let members = serde_json::to_string(&group.members)
            .map_err(|err| EngineError::CorruptRecord(format!("group members: {err}")))?;
        let result = groups::Entity::update_many()
            .col_expr(groups::Column::Name, Expr::value(group.name.clone()))
            .col_expr(
                groups::Column::Description,
                Expr::value(group.description.clone()),
            )
            .col_expr(groups::Column::Owner, Expr::value(group.owner.clone()))
            .col_expr(groups::Column::Members, Expr::value(members))
            .col_expr(groups::Column::Category, Expr::value(group.category.clone()))
            .col_expr(
                groups::Column::Currency,
                Expr::value(group.currency.code().to_string()),
            )
            .col_expr(groups::Column::TotalMinor, Expr::value(group.total.cents()))
            .col_expr(groups::Column::Balances, Expr::value(group.balances.to_json()?))
            .col_expr(groups::Column::Version, Expr::value(group.version + 1))
            .filter(groups::Column::Id.eq(group.id.clone()))
            .filter(groups::Column::Version.eq(group.version))
            .exec(conn)
            .await?;

        if result.rows_affected == 0 {
            return Err(EngineError::Conflict(format!(
                "group {} changed since it was read",
                group.id
            )));
        }
        Ok(())
    }

    /// Persist a group snapshot, guarded by its optimistic version.
    ///
    /// Succeeds only when the stored row still carries the version the
    /// snapshot was loaded with; otherwise nothing is written and
    /// [`EngineError::Conflict`] tells the caller to reload and retry. The
    /// composite operations below all go through the same check.
    pub async fn store_group_checked(&self, group: &Group) -> ResultEngine<()> {
        Self::store_group(&self.database, group).await
    }

    /// Add a new group, all members starting at balance 0.
    pub async fn new_group(
        &self,
        name: &str,
        description: Option<&str>,
        owner: &str,
        members: &[String],
        currency: Option<Currency>,
        category: Option<&str>,
    ) -> ResultEngine<String> {
        let group = Group::new(
            name,
            description,
            owner,
            members,
            currency.unwrap_or_default(),
            category,
        )?;
        let group_id = group.id.clone();

        groups::ActiveModel::try_from(&group)?
            .insert(&self.database)
            .await?;

        tracing::debug!(group_id, members = group.members.len(), "group created");
        Ok(group_id)
    }

    /// Return a group with its current balance sheet.
    pub async fn group(&self, group_id: &str) -> ResultEngine<Group> {
        self.load_group(&self.database, group_id).await
    }

    /// Return every group the member belongs to.
    pub async fn user_groups(&self, member: &str) -> ResultEngine<Vec<Group>> {
        let models = groups::Entity::find().all(&self.database).await?;

        let mut out = Vec::new();
        for model in models {
            let group = Group::try_from(model)?;
            if group.members.iter().any(|m| m == member) {
                out.push(group);
            }
        }
        Ok(out)
    }

    /// Update group metadata and membership.
    ///
    /// Members listed for the first time join the sheet at balance 0;
    /// existing members and their balances are never dropped, so outstanding
    /// debt cannot silently disappear.
    pub async fn edit_group(
        &self,
        group_id: &str,
        name: Option<&str>,
        description: Option<&str>,
        category: Option<&str>,
        members: &[String],
    ) -> ResultEngine<()> {
        let mut group = self.load_group(&self.database, group_id).await?;

        if let Some(name) = name {
            if name.trim().is_empty() {
                return Err(EngineError::InvalidGroup(
                    "group name must not be empty".to_string(),
                ));
            }
            group.name = name.to_string();
        }
        if let Some(description) = description {
            group.description = Some(description.to_string());
        }
        if let Some(category) = category {
            group.category = category.to_string();
        }
        group.add_missing_members(members);

        Self::store_group(&self.database, &group).await?;
        tracing::debug!(group_id, "group updated");
        Ok(())
    }

    /// Delete a group together with its expenses and settlement history.
    pub async fn delete_group(&self, group_id: &str) -> ResultEngine<()> {
        // Fails early with KeyNotFound when the group does not exist.
        self.load_group(&self.database, group_id).await?;

        let db_tx = self.database.begin().await?;
        expenses::Entity::delete_many()
            .filter(expenses::Column::GroupId.eq(group_id))
            .exec(&db_tx)
            .await?;
        settlements::Entity::delete_many()
            .filter(settlements::Column::GroupId.eq(group_id))
            .exec(&db_tx)
            .await?;
        groups::Entity::delete_by_id(group_id.to_string())
            .exec(&db_tx)
            .await?;
        db_tx.commit().await?;

        tracing::debug!(group_id, "group deleted");
        Ok(())
    }

    /// Add an expense and apply its split to the group's balance sheet.
    ///
    /// The expense row and the updated group are written in one database
    /// transaction; a failure anywhere leaves the stored state untouched.
    #[allow(clippy::too_many_arguments)]
    pub async fn add_expense(
        &self,
        group_id: &str,
        name: &str,
        description: Option<&str>,
        amount: MoneyCents,
        category: Option<&str>,
        date: DateTime<Utc>,
        owner: &str,
        members: &[String],
        kind: ExpenseKind,
    ) -> ResultEngine<Uuid> {
        let mut group = self.load_group(&self.database, group_id).await?;

        let expense = Expense::new(
            group_id,
            name,
            description,
            amount,
            category,
            group.currency,
            date,
            owner,
            members.to_vec(),
            kind,
        )?;
        group.balances = split::apply_expense(&group.balances, amount, owner, members)?;
        group.total += amount;

        let db_tx = self.database.begin().await?;
        expenses::ActiveModel::try_from(&expense)?.insert(&db_tx).await?;
        Self::store_group(&db_tx, &group).await?;
        db_tx.commit().await?;

        tracing::debug!(
            group_id,
            expense_id = %expense.id,
            amount = amount.cents(),
            "expense added"
        );
        Ok(expense.id)
    }

    /// Update an existing expense.
    ///
    /// When amount, owner or members changed, the old split is reverted and
    /// the new one applied (two composite steps, not a diff). A
    /// metadata-only edit skips the rebalance and leaves the group row
    /// untouched.
    #[allow(clippy::too_many_arguments)]
    pub async fn update_expense(
        &self,
        expense_id: Uuid,
        name: &str,
        description: Option<&str>,
        amount: MoneyCents,
        category: Option<&str>,
        date: Option<DateTime<Utc>>,
        owner: &str,
        members: &[String],
        kind: ExpenseKind,
    ) -> ResultEngine<()> {
        let old = self.expense(expense_id).await?;
        let mut group = self.load_group(&self.database, &old.group_id).await?;

        let rebalance =
            old.amount != amount || old.owner != owner || old.members.as_slice() != members;
        if rebalance {
            let reverted =
                split::revert_expense(&group.balances, old.amount, &old.owner, &old.members)?;
            group.balances = split::apply_expense(&reverted, amount, owner, members)?;
            group.total = group.total - old.amount + amount;
        }

        let mut updated = Expense::new(
            &old.group_id,
            name,
            description,
            amount,
            category,
            group.currency,
            date.unwrap_or(old.date),
            owner,
            members.to_vec(),
            kind,
        )?;
        updated.id = old.id;

        let db_tx = self.database.begin().await?;
        let model = expenses::ActiveModel::try_from(&updated)?;
        expenses::Entity::update(model).exec(&db_tx).await?;
        if rebalance {
            Self::store_group(&db_tx, &group).await?;
        }
        db_tx.commit().await?;

        tracing::debug!(group_id = %old.group_id, expense_id = %expense_id, rebalance, "expense updated");
        Ok(())
    }

    /// Delete an expense, reverting its split from the group's sheet.
    pub async fn delete_expense(&self, expense_id: Uuid) -> ResultEngine<()> {
        let expense = self.expense(expense_id).await?;
        let mut group = self.load_group(&self.database, &expense.group_id).await?;

        group.balances = split::revert_expense(
            &group.balances,
            expense.amount,
            &expense.owner,
            &expense.members,
        )?;
        group.total -= expense.amount;

        let db_tx = self.database.begin().await?;
        expenses::Entity::delete_by_id(expense_id.to_string())
            .exec(&db_tx)
            .await?;
        Self::store_group(&db_tx, &group).await?;
        db_tx.commit().await?;

        tracing::debug!(group_id = %expense.group_id, expense_id = %expense_id, "expense deleted");
        Ok(())
    }

    /// Return an [`Expense`].
    pub async fn expense(&self, expense_id: Uuid) -> ResultEngine<Expense> {
        let model = expenses::Entity::find_by_id(expense_id.to_string())
            .one(&self.database)
            .await?
            .ok_or_else(|| EngineError::KeyNotFound("expense not exists".to_string()))?;
        Expense::try_from(model)
    }

    /// List a group's expenses, most recent first.
    pub async fn group_expenses(&self, group_id: &str) -> ResultEngine<Vec<Expense>> {
        let models = expenses::Entity::find()
            .filter(expenses::Column::GroupId.eq(group_id))
            .order_by_desc(expenses::Column::Date)
            .all(&self.database)
            .await?;

        models.into_iter().map(Expense::try_from).collect()
    }

    /// List every expense the member shares in, most recent first.
    pub async fn user_expenses(&self, member: &str) -> ResultEngine<Vec<Expense>> {
        let models = expenses::Entity::find()
            .order_by_desc(expenses::Column::Date)
            .all(&self.database)
            .await?;

        let mut out = Vec::new();
        for model in models {
            let expense = Expense::try_from(model)?;
            if expense.members.iter().any(|m| m == member) {
                out.push(expense);
            }
        }
        Ok(out)
    }

    /// Record a direct payment between two members.
    ///
    /// The settlement history row and the updated balance sheet are one
    /// logical transaction: either both are committed or neither.
    pub async fn make_settlement(
        &self,
        group_id: &str,
        settle_from: &str,
        settle_to: &str,
        amount: MoneyCents,
        settle_date: DateTime<Utc>,
    ) -> ResultEngine<Uuid> {
        let mut group = self.load_group(&self.database, group_id).await?;

        let settlement = Settlement::new(group_id, settle_from, settle_to, amount, settle_date)?;
        group.balances =
            settlements::apply_settlement(&group.balances, settle_from, settle_to, amount)?;

        let db_tx = self.database.begin().await?;
        settlements::ActiveModel::from(&settlement).insert(&db_tx).await?;
        Self::store_group(&db_tx, &group).await?;
        db_tx.commit().await?;

        tracing::debug!(
            group_id,
            settlement_id = %settlement.id,
            amount = amount.cents(),
            "settlement recorded"
        );
        Ok(settlement.id)
    }

    /// List a group's settlement history, most recent first.
    pub async fn group_settlements(&self, group_id: &str) -> ResultEngine<Vec<Settlement>> {
        let models = settlements::Entity::find()
            .filter(settlements::Column::GroupId.eq(group_id))
            .order_by_desc(settlements::Column::SettleDate)
            .all(&self.database)
            .await?;

        models.into_iter().map(Settlement::try_from).collect()
    }

    /// Compute the settlement plan for a group's current balances.
    ///
    /// Read-only: the plan is derived from a fresh snapshot and nothing is
    /// persisted.
    pub async fn balance_sheet(&self, group_id: &str) -> ResultEngine<Vec<Transfer>> {
        let group = self.load_group(&self.database, group_id).await?;
        simplify::simplify_debts(&group.balances)
    }

    /// Returns group totals: `(currency, total_spent_minor, expense_count)`.
    ///
    /// Totals are aggregated from the expense rows, not from the group's
    /// running `total`, so this doubles as a consistency cross-check.
    pub async fn group_statistics(
        &self,
        group_id: &str,
    ) -> ResultEngine<(Currency, MoneyCents, u64)> {
        let group = self.load_group(&self.database, group_id).await?;

        let backend = self.database.get_database_backend();
        let stmt = Statement::from_sql_and_values(
            backend,
            "SELECT COALESCE(SUM(amount_minor), 0) AS total, COUNT(*) AS n \
             FROM expenses \
             WHERE group_id = ?",
            vec![group_id.into()],
        );
        let row = self.database.query_one(stmt).await?;
        let (total, count) = match row {
            Some(row) => (
                row.try_get::<i64>("", "total").unwrap_or(0),
                row.try_get::<i64>("", "n").unwrap_or(0),
            ),
            None => (0, 0),
        };

        Ok((group.currency, MoneyCents::new(total), count as u64))
    }
}

/// The builder for `Engine`
#[derive(Default)]
pub struct EngineBuilder {
    database: DatabaseConnection,
}

impl EngineBuilder {
    /// Pass the required database
    pub fn database(mut self, db: DatabaseConnection) -> EngineBuilder {
        self.database = db;
        self
    }

    /// Construct `Engine`
    pub fn build(self) -> Engine {
        Engine {
            database: self.database,
        }
    }
}
