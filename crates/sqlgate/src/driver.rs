//! Seam to the wire-level SQL driver.
//!
//! This layer does not speak the wire protocol; it drives an implementation
//! of [`Driver`] supplied by the host. The traits are object-safe (via
//! `#[async_trait]`) so the factory can hold a `dyn Driver` and tests can
//! substitute an in-memory fake.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use sqlgate_ident::ParameterName;

use crate::error::{Error, Result};
use crate::value::{FromSql, SqlValue};

/// Severity class at and above which a server message is an error.
///
/// SQL Server classes 0-10 are informational; 11+ indicate errors.
pub const ERROR_CLASS_THRESHOLD: u8 = 11;

/// Options for opening one physical connection.
#[derive(Debug, Clone)]
pub struct ConnectOptions {
    /// The raw connection string.
    pub connection_string: String,
    /// The owner identity the connection is partitioned under.
    pub owner: Option<String>,
    /// A managed-identity access token, when that flow is active.
    pub access_token: Option<String>,
}

/// An informational or error message sent by the server.
#[derive(Debug, Clone)]
pub struct ServerMessage {
    /// Server message number.
    pub number: i32,
    /// Severity class (0-25).
    pub class: u8,
    /// Server state byte.
    pub state: u8,
    /// Message text.
    pub message: String,
    /// Originating stored procedure, when applicable.
    pub procedure: Option<String>,
    /// Line number within the batch or procedure.
    pub line: u32,
}

impl ServerMessage {
    /// Whether this message reports an error rather than information.
    #[must_use]
    pub fn is_error(&self) -> bool {
        self.class >= ERROR_CLASS_THRESHOLD
    }

    /// One-line description used in diagnostics.
    #[must_use]
    pub fn describe(&self) -> String {
        match &self.procedure {
            Some(proc) => format!(
                "msg {} class {} state {} ({proc}:{}) {}",
                self.number, self.class, self.state, self.line, self.message
            ),
            None => format!(
                "msg {} class {} state {} (line {}) {}",
                self.number, self.class, self.state, self.line, self.message
            ),
        }
    }
}

/// Callback the driver invokes for every server message.
///
/// May fire from a different task than the one executing the command.
pub type MessageSink = Arc<dyn Fn(ServerMessage) + Send + Sync>;

/// How command text is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    /// The text names a stored procedure.
    StoredProcedure,
    /// The text is a raw SQL batch.
    Text,
}

/// A fully-bound command ready for the driver.
#[derive(Debug, Clone)]
pub struct Command {
    /// Statement text: a canonical identifier for procedures, raw SQL
    /// otherwise.
    pub text: String,
    /// Interpretation of `text`.
    pub kind: CommandKind,
    /// Bound parameters in registration order, keyed by normalized name.
    pub parameters: Vec<(ParameterName, SqlValue)>,
    /// Execution timeout.
    pub timeout: Duration,
}

/// Factory for physical connections.
#[async_trait]
pub trait Driver: Send + Sync + 'static {
    /// Open one physical connection.
    async fn connect(&self, options: &ConnectOptions) -> Result<Box<dyn DriverConnection>>;
}

/// One live physical connection owned by the layer above.
#[async_trait]
pub trait DriverConnection: Send {
    /// Whether the physical connection is open.
    fn is_open(&self) -> bool;

    /// Install the sink that receives server messages.
    fn set_message_sink(&mut self, sink: MessageSink);

    /// Execute a command and stream its result sets.
    ///
    /// The returned stream is positioned on the first result set, if any.
    async fn execute(&mut self, command: &Command) -> Result<Box<dyn ResultStream>>;

    /// Execute a command that returns no result sets; yields rows affected.
    async fn execute_non_query(&mut self, command: &Command) -> Result<u64>;

    /// Close the physical connection. Idempotent.
    fn close(&mut self);
}

/// Cursor over the result sets of one execution.
#[async_trait]
pub trait ResultStream: Send {
    /// Whether the stream is currently positioned on a result set.
    fn has_result_set(&self) -> bool;

    /// Read the next row of the current result set.
    async fn next_row(&mut self) -> Result<Option<Row>>;

    /// Advance to the next result set. Returns `false` when none remain.
    async fn advance(&mut self) -> Result<bool>;
}

/// One row of a result set.
#[derive(Debug, Clone)]
pub struct Row {
    columns: Arc<Vec<String>>,
    values: Vec<SqlValue>,
}

impl Row {
    /// Build a row from shared column names and values.
    #[must_use]
    pub fn new(columns: Arc<Vec<String>>, values: Vec<SqlValue>) -> Self {
        Self { columns, values }
    }

    /// Column names, in order.
    #[must_use]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Value at a column index.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&SqlValue> {
        self.values.get(index)
    }

    /// Value of a named column (case-insensitive).
    #[must_use]
    pub fn get_named(&self, name: &str) -> Option<&SqlValue> {
        let index = self
            .columns
            .iter()
            .position(|c| c.eq_ignore_ascii_case(name))?;
        self.values.get(index)
    }

    /// Typed value at a column index.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Type`] for an out-of-range index or a value that
    /// cannot convert to `T`.
    pub fn get_as<T: FromSql>(&self, index: usize) -> Result<T> {
        let value = self
            .get(index)
            .ok_or_else(|| Error::Type(format!("no column at index {index}")))?;
        T::from_sql(value)
    }

    /// Typed value of a named column (case-insensitive).
    ///
    /// # Errors
    ///
    /// Returns [`Error::Type`] for an unknown column or a value that cannot
    /// convert to `T`.
    pub fn get_named_as<T: FromSql>(&self, name: &str) -> Result<T> {
        let value = self
            .get_named(name)
            .ok_or_else(|| Error::Type(format!("no column named '{name}'")))?;
        T::from_sql(value)
    }
}

/// A fully-read result set, handed to whole-set readers.
#[derive(Debug, Clone, Default)]
pub struct Rows {
    rows: Vec<Row>,
}

impl Rows {
    /// Wrap a vector of rows.
    #[must_use]
    pub fn new(rows: Vec<Row>) -> Self {
        Self { rows }
    }

    /// Number of rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the result set is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// The rows as a slice.
    #[must_use]
    pub fn as_slice(&self) -> &[Row] {
        &self.rows
    }

    /// Iterate the rows.
    pub fn iter(&self) -> std::slice::Iter<'_, Row> {
        self.rows.iter()
    }

    /// The first row, if any.
    #[must_use]
    pub fn first(&self) -> Option<&Row> {
        self.rows.first()
    }

    /// Typed value of the first column of the first row.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Type`] when the set is empty or the value does not
    /// convert.
    pub fn scalar<T: FromSql>(&self) -> Result<T> {
        self.first()
            .ok_or_else(|| Error::Type("result set has no rows".into()))?
            .get_as(0)
    }
}

impl IntoIterator for Rows {
    type Item = Row;
    type IntoIter = std::vec::IntoIter<Row>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.into_iter()
    }
}

impl<'a> IntoIterator for &'a Rows {
    type Item = &'a Row;
    type IntoIter = std::slice::Iter<'a, Row>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.iter()
    }
}
