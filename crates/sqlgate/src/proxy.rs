//! Checked-out connection guard.
//!
//! A [`ConnectionProxy`] owns one pooled [`Connection`] for the duration of
//! a unit of work and checks it back in on drop. All query execution flows
//! through the proxy so the post-execution message check can never be
//! skipped.

use std::sync::Arc;
use std::time::{Duration, Instant};

use sqlgate_ident::Identifier;
use uuid::Uuid;

use crate::connection::Connection;
use crate::driver::{Command, CommandKind, ResultStream};
use crate::error::{Error, Result};
use crate::factory::ConnectionSource;
use crate::pool::ConnectionPool;
use crate::query::QueryBuilder;
use crate::settings::DatabaseSettings;

/// Guard around a checked-out connection.
///
/// Dropping the proxy returns the connection to its pool; [`release`]
/// does the same eagerly. A released proxy rejects further execution.
///
/// [`release`]: ConnectionProxy::release
pub struct ConnectionProxy {
    connection: Option<Connection>,
    pool: Arc<ConnectionPool>,
    source: Arc<ConnectionSource>,
}

impl ConnectionProxy {
    pub(crate) fn new(
        connection: Connection,
        pool: Arc<ConnectionPool>,
        source: Arc<ConnectionSource>,
    ) -> Self {
        Self {
            connection: Some(connection),
            pool,
            source,
        }
    }

    /// Id of the underlying connection, while still checked out.
    #[must_use]
    pub fn connection_id(&self) -> Option<Uuid> {
        self.connection.as_ref().map(Connection::id)
    }

    /// Begin a stored-procedure call.
    ///
    /// The procedure name is normalized to canonical bracketed form, so
    /// `dbo.GetOrders` and `[dbo].[GetOrders]` name the same procedure.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Parse`] for a malformed procedure name.
    pub fn query_procedure(&mut self, name: &str) -> Result<QueryBuilder<'_>> {
        let identifier = Identifier::new(name)?;
        Ok(QueryBuilder::new(
            self,
            identifier.as_str().to_string(),
            CommandKind::StoredProcedure,
        ))
    }

    /// Begin a raw SQL batch.
    pub fn query_text(&mut self, sql: impl Into<String>) -> QueryBuilder<'_> {
        QueryBuilder::new(self, sql.into(), CommandKind::Text)
    }

    /// Return the connection to the pool now instead of at drop.
    pub fn release(&mut self) {
        if let Some(connection) = self.connection.take() {
            self.pool.recycle_connection(connection);
        }
    }

    pub(crate) fn settings(&self) -> &DatabaseSettings {
        self.source.settings()
    }

    pub(crate) fn profile_command_timeout(&self) -> Option<Duration> {
        self.source.profile().command_timeout()
    }

    fn live(&mut self) -> Result<&mut Connection> {
        self.connection
            .as_mut()
            .ok_or_else(|| Error::Programming("connection proxy already released".into()))
    }

    pub(crate) async fn execute_stream(
        &mut self,
        command: &Command,
    ) -> Result<Box<dyn ResultStream>> {
        self.live()?.execute(command).await
    }

    pub(crate) async fn execute_rows_affected(&mut self, command: &Command) -> Result<u64> {
        self.live()?.execute_non_query(command).await
    }

    /// Completion path shared by every execution: log the timing, then run
    /// the unreported-error check. An error found in the message buffer
    /// takes precedence over the execution result, after the profile has a
    /// chance to substitute a more specific error.
    pub(crate) fn finish_execution<T>(
        &self,
        command: &Command,
        started: Instant,
        result: Result<T>,
    ) -> Result<T> {
        let Some(connection) = self.connection.as_ref() else {
            return result;
        };

        tracing::debug!(
            connection_id = %connection.id(),
            statement = %command.text,
            elapsed_ms = started.elapsed().as_millis() as u64,
            success = result.is_ok(),
            "command completed"
        );

        if let Err(check_error) = connection.check_for_unreported_errors(Some(command)) {
            let analyzed = self
                .source
                .profile()
                .analyze_error(&check_error)
                .unwrap_or(check_error);
            return Err(analyzed);
        }
        result
    }
}

impl Drop for ConnectionProxy {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for ConnectionProxy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionProxy")
            .field("connection_id", &self.connection_id())
            .field("released", &self.connection.is_none())
            .finish()
    }
}
