//! Authentication error types.

use thiserror::Error;

/// Errors that can occur during managed-identity token acquisition.
#[derive(Debug, Error)]
pub enum AuthError {
    /// The token-broker environment variables required by the managed
    /// identity flow are not set.
    #[error("managed identity requires the token broker environment ({missing} is not set)")]
    MissingBrokerEnvironment {
        /// Name of the first missing variable.
        missing: &'static str,
    },

    /// Token acquisition failed.
    #[error("failed to acquire token: {0}")]
    TokenAcquisition(String),

    /// Azure identity error.
    #[error("Azure identity error: {0}")]
    AzureIdentity(String),
}
