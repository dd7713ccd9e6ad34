//! Per-database configuration.
//!
//! [`DatabaseSettings`] is the serde-bindable shape a host application maps
//! from its configuration store, one section per target database.
//! [`ConnectionString`] parses the ADO.NET `Key=Value;` form far enough for
//! the decisions this layer has to make: which host is targeted, whether
//! credentials are embedded, and how to display the string without leaking
//! the password.

use std::time::Duration;

use serde::Deserialize;

use crate::error::{Error, Result};

fn default_idle_timeout_secs() -> u64 {
    120
}

fn default_max_retries() -> u32 {
    3
}

fn default_true() -> bool {
    true
}

/// Settings for one logical database connection.
///
/// This struct is marked `#[non_exhaustive]` to allow adding new fields in
/// future minor versions without breaking changes. Use [`DatabaseSettings::new`]
/// and the builder methods, or deserialize from configuration.
#[derive(Debug, Clone, Deserialize)]
#[non_exhaustive]
pub struct DatabaseSettings {
    /// The connection string (required).
    pub connection_string: String,

    /// Seconds an idle pooled connection may live before eviction.
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,

    /// Default maximum retry count for retryable query failures.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Force managed-identity authentication even when the heuristic would
    /// not select it.
    #[serde(default)]
    pub managed_identity: bool,

    /// Whether to validate the deployment environment pairing at startup.
    #[serde(default = "default_true")]
    pub validate_environment: bool,

    /// Whether an undeterminable environment fails validation (strict) or
    /// only logs a warning (lenient).
    #[serde(default = "default_true")]
    pub strict_validation: bool,
}

impl DatabaseSettings {
    /// Create settings for a connection string with all defaults.
    #[must_use]
    pub fn new(connection_string: impl Into<String>) -> Self {
        Self {
            connection_string: connection_string.into(),
            idle_timeout_secs: default_idle_timeout_secs(),
            max_retries: default_max_retries(),
            managed_identity: false,
            validate_environment: true,
            strict_validation: true,
        }
    }

    /// Set the idle eviction timeout in seconds.
    #[must_use]
    pub fn idle_timeout_secs(mut self, secs: u64) -> Self {
        self.idle_timeout_secs = secs;
        self
    }

    /// Set the default retry count.
    #[must_use]
    pub fn max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    /// Force managed-identity authentication.
    #[must_use]
    pub fn managed_identity(mut self, enabled: bool) -> Self {
        self.managed_identity = enabled;
        self
    }

    /// Enable or disable environment validation.
    #[must_use]
    pub fn validate_environment(mut self, enabled: bool) -> Self {
        self.validate_environment = enabled;
        self
    }

    /// Choose strict or lenient handling of undeterminable environments.
    #[must_use]
    pub fn strict_validation(mut self, strict: bool) -> Self {
        self.strict_validation = strict;
        self
    }

    /// The idle eviction timeout as a [`Duration`].
    #[must_use]
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    /// Validate the settings.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] when the connection string is missing or
    /// unparseable.
    pub fn validate(&self) -> Result<()> {
        if self.connection_string.trim().is_empty() {
            return Err(Error::Config("connection_string is required".into()));
        }
        ConnectionString::parse(&self.connection_string)?;
        Ok(())
    }
}

/// Recognized Azure SQL endpoint suffixes.
const AZURE_SQL_SUFFIXES: &[&str] = &[
    ".database.windows.net",
    ".database.usgovcloudapi.net",
    ".database.chinacloudapi.cn",
];

/// A parsed ADO.NET-style connection string.
#[derive(Debug, Clone)]
pub struct ConnectionString {
    raw: String,
    pairs: Vec<(String, String)>,
}

impl ConnectionString {
    /// Parse a `Key=Value;` connection string.
    ///
    /// Empty entries are skipped; keys are matched case-insensitively.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for entries without an `=`.
    pub fn parse(raw: &str) -> Result<Self> {
        let mut pairs = Vec::new();
        for entry in raw.split(';') {
            let entry = entry.trim();
            if entry.is_empty() {
                continue;
            }
            let Some((key, value)) = entry.split_once('=') else {
                return Err(Error::Config(format!(
                    "malformed connection string entry '{entry}'"
                )));
            };
            pairs.push((key.trim().to_string(), value.trim().to_string()));
        }
        Ok(Self {
            raw: raw.to_string(),
            pairs,
        })
    }

    /// Look up a value by key, case-insensitively. Last entry wins.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.pairs
            .iter()
            .rev()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    /// The raw connection string.
    #[must_use]
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// The target server hostname, with any `tcp:` prefix and `,port`
    /// suffix stripped.
    #[must_use]
    pub fn host(&self) -> Option<&str> {
        let server = self
            .get("Server")
            .or_else(|| self.get("Data Source"))
            .or_else(|| self.get("Address"))
            .or_else(|| self.get("Addr"))?;
        let server = server.strip_prefix("tcp:").unwrap_or(server);
        Some(server.split(',').next().unwrap_or(server))
    }

    /// The initial database, if one is specified.
    #[must_use]
    pub fn database(&self) -> Option<&str> {
        self.get("Database").or_else(|| self.get("Initial Catalog"))
    }

    /// The embedded SQL username, if one is specified.
    #[must_use]
    pub fn user_id(&self) -> Option<&str> {
        self.get("User ID").or_else(|| self.get("UID"))
    }

    /// Whether a password is embedded.
    #[must_use]
    pub fn has_password(&self) -> bool {
        self.get("Password").is_some() || self.get("PWD").is_some()
    }

    /// Whether the target is a recognized Azure SQL endpoint.
    #[must_use]
    pub fn is_azure_endpoint(&self) -> bool {
        self.host().is_some_and(|host| {
            let host = host.to_ascii_lowercase();
            AZURE_SQL_SUFFIXES.iter().any(|s| host.ends_with(s))
        })
    }

    /// The managed-identity heuristic: no embedded credentials and a
    /// recognized cloud endpoint.
    #[must_use]
    pub fn implies_managed_identity(&self) -> bool {
        self.user_id().is_none() && !self.has_password() && self.is_azure_endpoint()
    }

    /// The connection string with any password value masked, for logging
    /// and diagnostics.
    #[must_use]
    pub fn redacted(&self) -> String {
        self.pairs
            .iter()
            .map(|(k, v)| {
                if k.eq_ignore_ascii_case("Password") || k.eq_ignore_ascii_case("PWD") {
                    format!("{k}=***")
                } else {
                    format!("{k}={v}")
                }
            })
            .collect::<Vec<_>>()
            .join(";")
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const AZURE_CS: &str = "Server=tcp:orders-prod-sql.database.windows.net,1433;Database=orders";
    const LOCAL_CS: &str = "Server=localhost;Database=test;User ID=sa;Password=Secret1!";

    #[test]
    fn settings_defaults() {
        let settings = DatabaseSettings::new(LOCAL_CS);
        assert_eq!(settings.idle_timeout_secs, 120);
        assert_eq!(settings.max_retries, 3);
        assert!(!settings.managed_identity);
        assert!(settings.validate_environment);
        assert!(settings.strict_validation);
    }

    #[test]
    fn settings_deserialize_with_defaults() {
        let settings: DatabaseSettings = serde_json::from_str(
            r#"{"connection_string": "Server=localhost", "max_retries": 5}"#,
        )
        .unwrap();
        assert_eq!(settings.max_retries, 5);
        assert_eq!(settings.idle_timeout_secs, 120);
        assert!(settings.validate_environment);
    }

    #[test]
    fn empty_connection_string_fails_validation() {
        let settings = DatabaseSettings::new("  ");
        assert!(matches!(settings.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn host_strips_prefix_and_port() {
        let cs = ConnectionString::parse(AZURE_CS).unwrap();
        assert_eq!(cs.host(), Some("orders-prod-sql.database.windows.net"));
        assert_eq!(cs.database(), Some("orders"));
    }

    #[test]
    fn azure_endpoint_detection() {
        assert!(ConnectionString::parse(AZURE_CS).unwrap().is_azure_endpoint());
        assert!(!ConnectionString::parse(LOCAL_CS).unwrap().is_azure_endpoint());
    }

    #[test]
    fn managed_identity_heuristic() {
        // Azure endpoint without credentials: managed identity.
        assert!(ConnectionString::parse(AZURE_CS).unwrap().implies_managed_identity());
        // Credentials present: no.
        let with_creds = format!("{AZURE_CS};User ID=app;Password=x");
        assert!(!ConnectionString::parse(&with_creds).unwrap().implies_managed_identity());
        // On-premises host: no.
        assert!(!ConnectionString::parse(LOCAL_CS).unwrap().implies_managed_identity());
    }

    #[test]
    fn redacted_masks_password_only() {
        let cs = ConnectionString::parse(LOCAL_CS).unwrap();
        let redacted = cs.redacted();
        assert!(redacted.contains("Password=***"));
        assert!(!redacted.contains("Secret1!"));
        assert!(redacted.contains("User ID=sa"));
    }

    #[test]
    fn malformed_entry_rejected() {
        assert!(ConnectionString::parse("Server=x;garbage").is_err());
    }

    #[test]
    fn key_lookup_is_case_insensitive() {
        let cs = ConnectionString::parse("SERVER=x;database=y").unwrap();
        assert_eq!(cs.host(), Some("x"));
        assert_eq!(cs.database(), Some("y"));
    }
}
