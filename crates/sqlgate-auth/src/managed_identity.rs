//! Managed-identity token acquisition.
//!
//! Uses the `azure_identity` crate to acquire access tokens for Azure SQL
//! Database. The credential itself talks to the platform token broker
//! (App Service, Container Apps, AKS workload identity); before creating
//! one, [`BrokerEnvironment::require`] verifies that the broker endpoint
//! and secret environment variables are present so a misconfigured host
//! fails at connection setup rather than deep inside a query.

use std::sync::Arc;

use azure_core::credentials::TokenCredential;
use azure_identity::ManagedIdentityCredential;

use crate::error::AuthError;

/// The Azure SQL Database scope for token requests.
const AZURE_SQL_SCOPE: &str = "https://database.windows.net/.default";

/// Current App Service token broker endpoint variable.
pub const IDENTITY_ENDPOINT_VAR: &str = "IDENTITY_ENDPOINT";
/// Current App Service token broker secret variable.
pub const IDENTITY_HEADER_VAR: &str = "IDENTITY_HEADER";
/// Legacy token broker endpoint variable.
pub const MSI_ENDPOINT_VAR: &str = "MSI_ENDPOINT";
/// Legacy token broker secret variable.
pub const MSI_SECRET_VAR: &str = "MSI_SECRET";

/// Presence check for the token-broker environment.
///
/// The managed-identity flow needs an endpoint and a secret, supplied by the
/// hosting platform as either `IDENTITY_ENDPOINT`/`IDENTITY_HEADER` or the
/// legacy `MSI_ENDPOINT`/`MSI_SECRET` pair.
#[derive(Debug, Clone)]
pub struct BrokerEnvironment {
    /// Which endpoint variable was found.
    pub endpoint_var: &'static str,
    /// Which secret variable was found.
    pub secret_var: &'static str,
}

impl BrokerEnvironment {
    /// Require the token-broker environment to be present.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::MissingBrokerEnvironment`] naming the first
    /// missing variable when neither the current nor the legacy pair is
    /// fully set.
    pub fn require() -> Result<Self, AuthError> {
        let set = |name: &str| std::env::var_os(name).is_some_and(|v| !v.is_empty());

        if set(IDENTITY_ENDPOINT_VAR) && set(IDENTITY_HEADER_VAR) {
            return Ok(Self {
                endpoint_var: IDENTITY_ENDPOINT_VAR,
                secret_var: IDENTITY_HEADER_VAR,
            });
        }
        if set(MSI_ENDPOINT_VAR) && set(MSI_SECRET_VAR) {
            return Ok(Self {
                endpoint_var: MSI_ENDPOINT_VAR,
                secret_var: MSI_SECRET_VAR,
            });
        }

        let missing = if set(IDENTITY_ENDPOINT_VAR) {
            IDENTITY_HEADER_VAR
        } else {
            IDENTITY_ENDPOINT_VAR
        };
        Err(AuthError::MissingBrokerEnvironment { missing })
    }

    /// Whether either broker variable pair is fully present.
    #[must_use]
    pub fn is_present() -> bool {
        Self::require().is_ok()
    }
}

/// Managed Identity authentication provider.
///
/// Acquires access tokens for Azure SQL Database using the identity assigned
/// to the Azure resource the code runs on.
#[derive(Clone)]
pub struct ManagedIdentityAuth {
    credential: Arc<ManagedIdentityCredential>,
}

impl ManagedIdentityAuth {
    /// Create authentication using the system-assigned managed identity.
    ///
    /// Verifies the token-broker environment first; the credential itself is
    /// created lazily enough that a missing broker would otherwise only
    /// surface on the first token request.
    ///
    /// # Errors
    ///
    /// Returns an error if the broker environment is absent or the
    /// credential cannot be created.
    pub fn system_assigned() -> Result<Self, AuthError> {
        let broker = BrokerEnvironment::require()?;
        tracing::debug!(
            endpoint_var = broker.endpoint_var,
            "managed identity token broker detected"
        );

        let credential = ManagedIdentityCredential::new(None)
            .map_err(|e| AuthError::AzureIdentity(e.to_string()))?;
        Ok(Self { credential })
    }

    /// Get an access token for Azure SQL Database.
    ///
    /// # Errors
    ///
    /// Returns an error if token acquisition fails.
    pub async fn get_token(&self) -> Result<String, AuthError> {
        let token = self
            .credential
            .get_token(&[AZURE_SQL_SCOPE], None)
            .await
            .map_err(|e| AuthError::TokenAcquisition(e.to_string()))?;

        Ok(token.token.secret().to_string())
    }
}
