//! Deployment-environment validation.
//!
//! A production application accidentally pointed at a development database
//! (or the reverse) should fail at startup, not at 3am. The factory compares
//! the application's deployment environment against the environment inferred
//! from the database server hostname and refuses mismatched pairings.

use std::fmt;

/// A deployment environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeployEnvironment {
    /// Local or shared development.
    Development,
    /// Automated or manual test.
    Test,
    /// Pre-production staging.
    Staging,
    /// Production.
    Production,
    /// Anything else, carried verbatim.
    Other(String),
}

impl fmt::Display for DeployEnvironment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Development => f.write_str("Development"),
            Self::Test => f.write_str("Test"),
            Self::Staging => f.write_str("Staging"),
            Self::Production => f.write_str("Production"),
            Self::Other(name) => f.write_str(name),
        }
    }
}

/// Outcome of comparing an application environment to a database environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvVerdict {
    /// The pairing is allowed.
    Match,
    /// The pairing is forbidden.
    Mismatch,
    /// The comparison could not be decided.
    Unknown,
}

/// Policy seam for environment inference and comparison.
///
/// The default [`HostnameEnvironmentPolicy`] reads structured hints out of
/// the server hostname; hosts with different naming conventions supply their
/// own implementation.
pub trait EnvironmentPolicy: Send + Sync {
    /// Infer the database's environment from its server hostname.
    ///
    /// Returns `None` when the hostname carries no recognizable hint.
    fn database_environment(&self, host: &str) -> Option<DeployEnvironment>;

    /// Compare an application environment to a database environment.
    fn compare(&self, application: &DeployEnvironment, database: &DeployEnvironment)
    -> EnvVerdict;
}

/// Default policy: the first hostname label is split on `-` and each token
/// is matched against well-known environment spellings.
///
/// `orders-prod-sql.database.windows.net` is Production;
/// `inventory-dev.internal` is Development; `db01.internal` is unknown.
#[derive(Debug, Clone, Copy, Default)]
pub struct HostnameEnvironmentPolicy;

impl EnvironmentPolicy for HostnameEnvironmentPolicy {
    fn database_environment(&self, host: &str) -> Option<DeployEnvironment> {
        let label = host.split('.').next()?;
        for token in label.split('-') {
            let env = match token.to_ascii_lowercase().as_str() {
                "dev" | "development" => DeployEnvironment::Development,
                "test" | "tst" | "qa" => DeployEnvironment::Test,
                "stage" | "stg" | "staging" => DeployEnvironment::Staging,
                "prod" | "prd" | "production" => DeployEnvironment::Production,
                _ => continue,
            };
            return Some(env);
        }
        None
    }

    fn compare(
        &self,
        application: &DeployEnvironment,
        database: &DeployEnvironment,
    ) -> EnvVerdict {
        match (application, database) {
            (DeployEnvironment::Other(_), _) | (_, DeployEnvironment::Other(_)) => {
                EnvVerdict::Unknown
            }
            (a, d) if a == d => EnvVerdict::Match,
            _ => EnvVerdict::Mismatch,
        }
    }
}
