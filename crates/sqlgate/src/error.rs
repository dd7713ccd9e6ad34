//! Error types for the access layer.

use thiserror::Error;

/// Errors that can occur while acquiring connections or executing queries.
#[derive(Debug, Error)]
pub enum Error {
    /// Opening or using a physical connection failed.
    #[error("connection failed for '{connection_string}': {reason}")]
    Connection {
        /// Redacted connection string the failure is tied to.
        connection_string: String,
        /// Driver-supplied failure description.
        reason: String,
    },

    /// A server-side error surfaced through the message channel rather than
    /// as an execution failure, detected by the post-execution check.
    #[error("unreported server error(s):\n{details}")]
    UnreportedServerError {
        /// Concatenated message descriptions plus the diagnostic dump.
        details: String,
    },

    /// Query execution failed.
    ///
    /// `retryable` is set by the layer that raised the failure (the wire
    /// driver), never inferred here.
    #[error("query execution failed: {reason}")]
    Query {
        /// Failure description.
        reason: String,
        /// Whether the failure is safe to re-attempt.
        retryable: bool,
    },

    /// A mandatory reader's result set was absent or had no rows.
    #[error("mandatory result set {position} is missing or empty")]
    MandatoryResultSet {
        /// Zero-based registration position of the reader.
        position: usize,
    },

    /// The typed execution arity does not match the registered reader count.
    #[error("{registered} reader(s) registered but result tuple has arity {requested}")]
    ReaderCountMismatch {
        /// Number of readers registered on the builder.
        registered: usize,
        /// Arity of the requested result tuple.
        requested: usize,
    },

    /// A parameter name was added twice (case-insensitively).
    #[error("duplicate parameter '{name}'")]
    DuplicateParameter {
        /// Normalized parameter name.
        name: String,
    },

    /// A value could not be converted to the requested Rust type.
    #[error("type conversion error: {0}")]
    Type(String),

    /// Identifier or parameter-name normalization failed.
    #[error(transparent)]
    Parse(#[from] sqlgate_ident::ParseError),

    /// The application and database deployment environments do not pair.
    #[error(
        "environment mismatch: application '{application}' may not use database \
         '{database}' ({host})"
    )]
    EnvironmentMismatch {
        /// Application deployment environment.
        application: String,
        /// Inferred database environment.
        database: String,
        /// Database server hostname.
        host: String,
    },

    /// The database environment could not be determined and validation is
    /// configured strict.
    #[error("cannot determine environment for '{host}' and strict validation is enabled")]
    EnvironmentUnknown {
        /// Database server hostname.
        host: String,
    },

    /// Managed-identity token acquisition failed.
    #[error("authentication failed: {0}")]
    Auth(#[from] sqlgate_auth::AuthError),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// An extension point returned an invalid value. This signals a bug in
    /// the database profile, not bad input, and is never recoverable.
    #[error("programming error: {0}")]
    Programming(String),

    /// The operation was cancelled through its cancellation token.
    #[error("operation cancelled")]
    Cancelled,
}

impl Error {
    /// Construct a non-retryable query failure.
    #[must_use]
    pub fn query(reason: impl Into<String>) -> Self {
        Self::Query {
            reason: reason.into(),
            retryable: false,
        }
    }

    /// Construct a query failure explicitly marked safe to retry.
    #[must_use]
    pub fn retryable_query(reason: impl Into<String>) -> Self {
        Self::Query {
            reason: reason.into(),
            retryable: true,
        }
    }

    /// Whether this failure is explicitly marked safe to re-attempt.
    ///
    /// Only query failures carry the flag; parse, environment and
    /// programming errors are never retried.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Query { retryable: true, .. })
    }
}

/// Result type for access-layer operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_flag_is_carried_not_inferred() {
        assert!(Error::retryable_query("deadlock victim").is_retryable());
        assert!(!Error::query("constraint violation").is_retryable());
        assert!(!Error::Cancelled.is_retryable());
        assert!(
            !Error::MandatoryResultSet { position: 2 }.is_retryable(),
            "pipeline failures are never retryable"
        );
    }

    #[test]
    fn mandatory_result_set_error_names_position() {
        let err = Error::MandatoryResultSet { position: 3 };
        assert!(err.to_string().contains('3'));
    }
}
