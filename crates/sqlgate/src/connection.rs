//! One live database connection and its server-message buffer.

use std::fmt::Write as _;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::RwLock;
use uuid::Uuid;

use crate::driver::{Command, DriverConnection, ResultStream, ServerMessage};
use crate::error::{Error, Result};
use crate::factory::DatabaseProfile;
use crate::value::SqlValue;

/// Owns exactly one live physical connection and the messages the server
/// has sent on it since the last recycle.
///
/// The message buffer is written from the driver's message callback, which
/// may fire on a different task than command execution, so it sits behind a
/// reader/writer lock.
pub struct Connection {
    id: Uuid,
    driver: Box<dyn DriverConnection>,
    connection_string_redacted: String,
    owner: Option<String>,
    uses_managed_identity: bool,
    last_used: Instant,
    last_command_text: Option<String>,
    messages: Arc<RwLock<Vec<ServerMessage>>>,
}

impl Connection {
    /// Wrap an opened driver connection and install the message sink.
    pub(crate) fn new(
        mut driver: Box<dyn DriverConnection>,
        connection_string_redacted: String,
        owner: Option<String>,
        uses_managed_identity: bool,
    ) -> Self {
        let messages: Arc<RwLock<Vec<ServerMessage>>> = Arc::new(RwLock::new(Vec::new()));
        let sink_buffer = Arc::clone(&messages);
        driver.set_message_sink(Arc::new(move |message| {
            sink_buffer.write().push(message);
        }));

        Self {
            id: Uuid::new_v4(),
            driver,
            connection_string_redacted,
            owner,
            uses_managed_identity,
            last_used: Instant::now(),
            last_command_text: None,
            messages,
        }
    }

    /// Opaque instance identifier.
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Whether the physical connection is open.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.driver.is_open()
    }

    /// The owner this connection is partitioned under.
    #[must_use]
    pub fn owner(&self) -> Option<&str> {
        self.owner.as_deref()
    }

    /// When the connection last executed or was checked in.
    #[must_use]
    pub fn last_used(&self) -> Instant {
        self.last_used
    }

    /// Snapshot of the buffered server messages.
    #[must_use]
    pub fn messages(&self) -> Vec<ServerMessage> {
        self.messages.read().clone()
    }

    /// Execute a command that streams result sets.
    pub(crate) async fn execute(&mut self, command: &Command) -> Result<Box<dyn ResultStream>> {
        self.last_used = Instant::now();
        self.last_command_text = Some(command.text.clone());
        self.driver.execute(command).await
    }

    /// Execute a command that returns only a row count.
    pub(crate) async fn execute_non_query(&mut self, command: &Command) -> Result<u64> {
        self.last_used = Instant::now();
        self.last_command_text = Some(command.text.clone());
        self.driver.execute_non_query(command).await
    }

    /// Scan the message buffer for server-side errors the driver did not
    /// surface as execution failures.
    ///
    /// Must run after every command execution: some server failures arrive
    /// only on the message channel. When error-class messages exist, the
    /// whole buffer is drained and an [`Error::UnreportedServerError`]
    /// carrying their descriptions plus the full diagnostic dump is
    /// returned.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnreportedServerError`] when any buffered message
    /// has severity class at or above the error threshold.
    pub fn check_for_unreported_errors(&self, command: Option<&Command>) -> Result<()> {
        let has_errors = self.messages.read().iter().any(ServerMessage::is_error);
        if !has_errors {
            return Ok(());
        }

        let drained: Vec<ServerMessage> = std::mem::take(&mut *self.messages.write());
        let mut details = String::new();
        for message in drained.iter().filter(|m| m.is_error()) {
            details.push_str(&message.describe());
            details.push('\n');
        }
        details.push_str(&self.diagnostic_dump(command));

        Err(Error::UnreportedServerError { details })
    }

    /// Return the connection to a reusable state.
    ///
    /// Returns `false` (recycle failed, caller should dispose) when the
    /// physical connection is no longer open or the profile's teardown hook
    /// fails. Never propagates the teardown error; it is logged instead.
    /// On success the message buffer is cleared so a later checkout cannot
    /// see this use's messages.
    pub(crate) fn recycle(&mut self, profile: &dyn DatabaseProfile) -> bool {
        if !self.driver.is_open() {
            return false;
        }

        if let Err(error) = profile.teardown(self) {
            tracing::warn!(
                connection_id = %self.id,
                error = %error,
                "teardown hook failed; connection will be disposed"
            );
            return false;
        }

        self.messages.write().clear();
        self.last_command_text = None;
        self.last_used = Instant::now();
        true
    }

    /// Close the physical connection.
    pub(crate) fn close(&mut self) {
        tracing::debug!(connection_id = %self.id, "closing connection");
        self.driver.close();
    }

    /// Structured multi-field text describing this connection and the
    /// given command, for exception payloads.
    #[must_use]
    pub fn diagnostic_dump(&self, command: Option<&Command>) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "connection id:     {}", self.id);
        let _ = writeln!(
            out,
            "connection string: {}",
            self.connection_string_redacted
        );
        let _ = writeln!(
            out,
            "owner:             {}",
            self.owner.as_deref().unwrap_or("(none)")
        );
        let _ = writeln!(
            out,
            "managed identity:  {}",
            if self.uses_managed_identity { "yes" } else { "no" }
        );
        let _ = writeln!(out, "token broker vars: {}", broker_vars_present());

        let text = command
            .map(|c| c.text.as_str())
            .or(self.last_command_text.as_deref())
            .unwrap_or("(none)");
        let _ = writeln!(out, "statement:         {text}");

        if let Some(command) = command {
            let _ = writeln!(out, "timeout:           {:?}", command.timeout);
            if !command.parameters.is_empty() {
                let _ = writeln!(out, "parameters:");
                for (name, value) in &command.parameters {
                    match value {
                        SqlValue::Table(_) => {
                            let _ = writeln!(out, "  {name} ({}) =", value.type_name());
                            for line in value.sql_literal().lines() {
                                let _ = writeln!(out, "    {line}");
                            }
                        }
                        other => {
                            let _ = writeln!(out, "  {name} = {}", other.sql_literal());
                        }
                    }
                }
            }
        }

        out
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("owner", &self.owner)
            .field("open", &self.is_open())
            .finish_non_exhaustive()
    }
}

/// Names of the token-broker variables that are currently set.
fn broker_vars_present() -> String {
    let names = [
        sqlgate_auth::managed_identity::IDENTITY_ENDPOINT_VAR,
        sqlgate_auth::managed_identity::IDENTITY_HEADER_VAR,
        sqlgate_auth::managed_identity::MSI_ENDPOINT_VAR,
        sqlgate_auth::managed_identity::MSI_SECRET_VAR,
    ];
    let present: Vec<&str> = names
        .into_iter()
        .filter(|name| std::env::var_os(name).is_some_and(|v| !v.is_empty()))
        .collect();
    if present.is_empty() {
        "(none set)".to_string()
    } else {
        present.join(", ")
    }
}
