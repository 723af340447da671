//! Result sets as delivered by a transport.
//!
//! Decoding of the wire representation happens in the transport; rows
//! arrive here as [`SqlValue`]s with shared column metadata.

use std::sync::Arc;

use mariadb_types::SqlValue;

/// Column metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub struct Column {
    /// Column name or alias.
    pub name: String,
    /// Server type name (e.g. `INT`, `VARCHAR`).
    pub type_name: String,
    /// Whether the column is nullable.
    pub nullable: bool,
}

impl Column {
    /// Create column metadata.
    pub fn new(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
            nullable: true,
        }
    }

    /// Set nullability.
    #[must_use]
    pub fn with_nullable(mut self, nullable: bool) -> Self {
        self.nullable = nullable;
        self
    }
}

/// A single row.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    columns: Arc<[Column]>,
    values: Vec<SqlValue>,
}

impl Row {
    /// Create a row sharing column metadata with its result set.
    pub fn new(columns: Arc<[Column]>, values: Vec<SqlValue>) -> Self {
        Self { columns, values }
    }

    /// Value by column index.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&SqlValue> {
        self.values.get(index)
    }

    /// Value by column name (first match).
    #[must_use]
    pub fn get_by_name(&self, name: &str) -> Option<&SqlValue> {
        let index = self.columns.iter().position(|c| c.name == name)?;
        self.values.get(index)
    }

    /// Column metadata.
    #[must_use]
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// All values in column order.
    #[must_use]
    pub fn values(&self) -> &[SqlValue] {
        &self.values
    }

    /// Number of columns.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether the row has no columns.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Server status flags reported with every OK/EOF packet.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ServerStatus(pub u16);

impl ServerStatus {
    /// A transaction is open on the session.
    pub const IN_TRANS: u16 = 0x0001;
    /// Autocommit is enabled.
    pub const AUTOCOMMIT: u16 = 0x0002;

    /// Whether a transaction is open.
    #[must_use]
    pub fn in_transaction(self) -> bool {
        self.0 & Self::IN_TRANS != 0
    }
}

/// Complete outcome of one successful command.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultSet {
    /// Column metadata, empty for statements without a result set.
    pub columns: Arc<[Column]>,
    /// Rows in server order.
    pub rows: Vec<Row>,
    /// Rows affected by a DML statement.
    pub affected_rows: u64,
    /// Auto-increment id generated by the statement.
    pub last_insert_id: u64,
    /// Warning count.
    pub warnings: u16,
    /// Status flags, if the transport reports them.
    pub status: Option<ServerStatus>,
}

impl ResultSet {
    /// Result of a statement that returned no rows.
    #[must_use]
    pub fn affected(affected_rows: u64) -> Self {
        Self {
            affected_rows,
            ..Self::default()
        }
    }

    /// Build a row-returning result from columns and raw values.
    #[must_use]
    pub fn rows(columns: Vec<Column>, rows: Vec<Vec<SqlValue>>) -> Self {
        let columns: Arc<[Column]> = columns.into();
        let rows = rows
            .into_iter()
            .map(|values| Row::new(Arc::clone(&columns), values))
            .collect();
        Self {
            columns,
            rows,
            ..Self::default()
        }
    }

    /// Attach status flags.
    #[must_use]
    pub fn with_status(mut self, status: ServerStatus) -> Self {
        self.status = Some(status);
        self
    }

    /// Attach the generated id.
    #[must_use]
    pub fn with_last_insert_id(mut self, id: u64) -> Self {
        self.last_insert_id = id;
        self
    }

    /// First value of the first row, handy for `SELECT <expr>`.
    #[must_use]
    pub fn scalar(&self) -> Option<&SqlValue> {
        self.rows.first().and_then(|row| row.get(0))
    }
}
