//! The module contains the error the engine can throw.
//!
//! Most variants map to caller mistakes ([`InvalidExpense`], [`UnknownMember`],
//! ...) and are safe to surface as-is. [`ArithmeticInvariant`] is different: it
//! means a composite operation left a group balance sheet that does not sum to
//! zero, which is a bug in the engine itself and is logged loudly before being
//! returned. [`Conflict`] is retryable: the optimistic version check on the
//! group row failed because another writer got there first.
//!
//!  [`InvalidExpense`]: EngineError::InvalidExpense
//!  [`UnknownMember`]: EngineError::UnknownMember
//!  [`ArithmeticInvariant`]: EngineError::ArithmeticInvariant
//!  [`Conflict`]: EngineError::Conflict
use sea_orm::DbErr;
use thiserror::Error;

/// Engine custom errors.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Invalid group: {0}")]
    InvalidGroup(String),
    #[error("Invalid expense: {0}")]
    InvalidExpense(String),
    #[error("Invalid settlement: {0}")]
    InvalidSettlement(String),
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),
    #[error("\"{0}\" is not a member of the group!")]
    UnknownMember(String),
    #[error("\"{0}\" already present!")]
    ExistingKey(String),
    #[error("\"{0}\" key not found!")]
    KeyNotFound(String),
    #[error("Balance invariant violated: {0}")]
    ArithmeticInvariant(String),
    #[error("Concurrent update: {0}")]
    Conflict(String),
    #[error("Corrupt record: {0}")]
    CorruptRecord(String),
    #[error(transparent)]
    Database(#[from] DbErr),
}

impl PartialEq for EngineError {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::InvalidGroup(a), Self::InvalidGroup(b)) => a == b,
            (Self::InvalidExpense(a), Self::InvalidExpense(b)) => a == b,
            (Self::InvalidSettlement(a), Self::InvalidSettlement(b)) => a == b,
            (Self::InvalidAmount(a), Self::InvalidAmount(b)) => a == b,
            (Self::UnknownMember(a), Self::UnknownMember(b)) => a == b,
            (Self::ExistingKey(a), Self::ExistingKey(b)) => a == b,
            (Self::KeyNotFound(a), Self::KeyNotFound(b)) => a == b,
            (Self::ArithmeticInvariant(a), Self::ArithmeticInvariant(b)) => a == b,
            (Self::Conflict(a), Self::Conflict(b)) => a == b,
            (Self::CorruptRecord(a), Self::CorruptRecord(b)) => a == b,
            (Self::Database(a), Self::Database(b)) => a.to_string() == b.to_string(),
            _ => false,
        }
    }
}
