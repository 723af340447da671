//! Transaction support.
//!
//! Isolation levels and savepoints for explicit transactions opened with
//! [`Session::begin_transaction`](crate::Session::begin_transaction).

use crate::error::{Error, ErrorCode, ErrorKind, Result};

/// Statement that opens a transaction.
pub const START_TRANSACTION: &str = "START TRANSACTION";

/// Statement that commits the open transaction.
pub const COMMIT: &str = "COMMIT";

/// Statement that rolls back the open transaction.
pub const ROLLBACK: &str = "ROLLBACK";

/// Transaction isolation level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IsolationLevel {
    /// Read uncommitted (dirty reads allowed).
    ReadUncommitted,

    /// Read committed.
    ///
    /// Prevents dirty reads but allows non-repeatable reads and phantom reads.
    ReadCommitted,

    /// Repeatable read (the InnoDB default).
    #[default]
    RepeatableRead,

    /// Serializable (highest isolation).
    Serializable,
}

impl IsolationLevel {
    /// Get the SQL statement that applies this level to the next transaction.
    #[must_use]
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::ReadUncommitted => "SET TRANSACTION ISOLATION LEVEL READ UNCOMMITTED",
            Self::ReadCommitted => "SET TRANSACTION ISOLATION LEVEL READ COMMITTED",
            Self::RepeatableRead => "SET TRANSACTION ISOLATION LEVEL REPEATABLE READ",
            Self::Serializable => "SET TRANSACTION ISOLATION LEVEL SERIALIZABLE",
        }
    }

    /// Get the isolation level name.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::ReadUncommitted => "READ UNCOMMITTED",
            Self::ReadCommitted => "READ COMMITTED",
            Self::RepeatableRead => "REPEATABLE READ",
            Self::Serializable => "SERIALIZABLE",
        }
    }
}

/// A savepoint within a transaction.
///
/// The name is validated on creation so it can be spliced into
/// `SAVEPOINT` / `ROLLBACK TO SAVEPOINT` statements.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavePoint {
    name: String,
}

impl SavePoint {
    /// Validate a savepoint name: ASCII letters, digits and `_`, not starting
    /// with a digit, at most 64 characters.
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        let valid = !name.is_empty()
            && name.len() <= 64
            && !name.as_bytes()[0].is_ascii_digit()
            && name.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_');
        if !valid {
            return Err(Error::new(
                ErrorKind::Validation,
                ErrorCode::WrongArguments,
                format!("invalid savepoint name '{name}'"),
            ));
        }
        Ok(Self { name })
    }

    /// Get the savepoint name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn create_sql(&self) -> String {
        format!("SAVEPOINT {}", self.name)
    }

    pub(crate) fn rollback_sql(&self) -> String {
        format!("ROLLBACK TO SAVEPOINT {}", self.name)
    }
}
