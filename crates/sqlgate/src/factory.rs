//! Connection factory: profiles, the shared connection source, and the
//! pool map.
//!
//! A [`DatabaseProfile`] describes one logical database: its settings name,
//! default owner, per-connection initialization and teardown, and optional
//! error analysis. The [`ConnectionFactory`] owns one pool per
//! [`ConnectionKey`] and hands out [`ConnectionProxy`] guards.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use sqlgate_auth::ManagedIdentityAuth;

use crate::connection::Connection;
use crate::driver::{ConnectOptions, Driver};
use crate::environment::{DeployEnvironment, EnvVerdict, EnvironmentPolicy};
use crate::error::{Error, Result};
use crate::pool::{ConnectionKey, ConnectionPool, PoolStatus};
use crate::proxy::ConnectionProxy;
use crate::settings::{ConnectionString, DatabaseSettings};

/// Behavior hooks for one logical database.
///
/// Implementations are cheap, stateless descriptors; the factory holds one
/// behind an `Arc` and consults it on every connect and check-in.
#[async_trait]
pub trait DatabaseProfile: Send + Sync + 'static {
    /// Name of the configuration section this profile reads.
    fn settings_name(&self) -> &str;

    /// Owner used when the caller does not pass one explicitly.
    fn default_owner(&self) -> Option<String> {
        None
    }

    /// Runs once on every freshly opened connection, before first use.
    ///
    /// # Errors
    ///
    /// Any error fails the checkout that triggered the open.
    async fn initialize(&self, _connection: &mut Connection) -> Result<()> {
        Ok(())
    }

    /// Runs on every check-in, before the connection rejoins the idle set.
    ///
    /// # Errors
    ///
    /// An error disposes the connection instead of pooling it; it is never
    /// propagated to the caller.
    fn teardown(&self, _connection: &mut Connection) -> Result<()> {
        Ok(())
    }

    /// Default command timeout for this database, when the query does not
    /// set one.
    fn command_timeout(&self) -> Option<Duration> {
        None
    }

    /// Optionally substitute a more specific error for one raised during
    /// post-execution checks. Returning `None` keeps the original.
    fn analyze_error(&self, _error: &Error) -> Option<Error> {
        None
    }
}

/// Everything needed to open one physical connection: driver, profile,
/// settings, and the token source when managed identity is active.
pub(crate) struct ConnectionSource {
    driver: Arc<dyn Driver>,
    profile: Arc<dyn DatabaseProfile>,
    settings: DatabaseSettings,
    redacted: String,
    auth: Option<ManagedIdentityAuth>,
}

impl ConnectionSource {
    pub(crate) fn profile(&self) -> &dyn DatabaseProfile {
        self.profile.as_ref()
    }

    pub(crate) fn settings(&self) -> &DatabaseSettings {
        &self.settings
    }

    /// Open, wrap, and initialize one connection for the given key.
    pub(crate) async fn create(&self, key: &ConnectionKey) -> Result<Connection> {
        let access_token = match &self.auth {
            Some(auth) => Some(auth.get_token().await?),
            None => None,
        };

        let options = ConnectOptions {
            connection_string: key.connection_string.clone(),
            owner: key.owner.clone(),
            access_token,
        };
        let driver_conn = self
            .driver
            .connect(&options)
            .await
            .map_err(|error| match error {
                already @ Error::Connection { .. } => already,
                other => Error::Connection {
                    connection_string: self.redacted.clone(),
                    reason: other.to_string(),
                },
            })?;

        let mut connection = Connection::new(
            driver_conn,
            self.redacted.clone(),
            key.owner.clone(),
            self.auth.is_some(),
        );
        self.profile.initialize(&mut connection).await?;

        tracing::debug!(
            connection_id = %connection.id(),
            settings = %self.profile.settings_name(),
            owner = key.owner.as_deref().unwrap_or("(none)"),
            "opened connection"
        );
        Ok(connection)
    }
}

/// Creates and pools connections for one logical database.
pub struct ConnectionFactory {
    source: Arc<ConnectionSource>,
    pools: RwLock<HashMap<ConnectionKey, Arc<ConnectionPool>>>,
}

impl ConnectionFactory {
    /// Build a factory without deployment-environment validation.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for invalid settings, or an auth error when
    /// managed identity is selected but the token broker environment is
    /// absent.
    pub fn new(
        driver: Arc<dyn Driver>,
        profile: Arc<dyn DatabaseProfile>,
        settings: DatabaseSettings,
    ) -> Result<Self> {
        Self::build(driver, profile, settings, None)
    }

    /// Build a factory that validates the deployment environment pairing
    /// before anything connects.
    ///
    /// # Errors
    ///
    /// In addition to the [`ConnectionFactory::new`] failure modes, returns
    /// [`Error::EnvironmentMismatch`] for a forbidden pairing, and
    /// [`Error::EnvironmentUnknown`] when strict validation is on and the
    /// database environment cannot be inferred.
    pub fn with_environment(
        driver: Arc<dyn Driver>,
        profile: Arc<dyn DatabaseProfile>,
        settings: DatabaseSettings,
        application: DeployEnvironment,
        policy: Arc<dyn EnvironmentPolicy>,
    ) -> Result<Self> {
        Self::build(driver, profile, settings, Some((application, policy)))
    }

    fn build(
        driver: Arc<dyn Driver>,
        profile: Arc<dyn DatabaseProfile>,
        settings: DatabaseSettings,
        environment: Option<(DeployEnvironment, Arc<dyn EnvironmentPolicy>)>,
    ) -> Result<Self> {
        settings.validate()?;
        let cs = ConnectionString::parse(&settings.connection_string)?;

        if let Some((application, policy)) = environment {
            if settings.validate_environment {
                validate_environment(&cs, &application, policy.as_ref(), settings.strict_validation)?;
            }
        }

        let managed = settings.managed_identity || cs.implies_managed_identity();
        let auth = if managed {
            Some(ManagedIdentityAuth::system_assigned()?)
        } else {
            None
        };

        tracing::info!(
            settings = %profile.settings_name(),
            host = cs.host().unwrap_or("(unknown)"),
            managed_identity = managed,
            "connection factory ready"
        );

        Ok(Self {
            source: Arc::new(ConnectionSource {
                driver,
                profile,
                settings,
                redacted: cs.redacted(),
                auth,
            }),
            pools: RwLock::new(HashMap::new()),
        })
    }

    /// Check out a connection for the given owner.
    ///
    /// Falls back to the profile's default owner when none is passed. The
    /// returned proxy checks the connection back in on drop.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Programming`] when the resolved owner is empty, and
    /// propagates connection-open failures.
    pub async fn get_connection(&self, owner: Option<&str>) -> Result<ConnectionProxy> {
        let owner = match owner.map(str::to_string).or_else(|| self.source.profile.default_owner()) {
            Some(owner) if owner.trim().is_empty() => {
                return Err(Error::Programming("owner resolved to an empty string".into()));
            }
            resolved => resolved,
        };

        let key = ConnectionKey::new(owner.as_deref(), &self.source.settings.connection_string);
        let pool = self.pool_for(key);
        let connection = pool.get_connection().await?;
        Ok(ConnectionProxy::new(connection, pool, Arc::clone(&self.source)))
    }

    fn pool_for(&self, key: ConnectionKey) -> Arc<ConnectionPool> {
        if let Some(pool) = self.pools.read().get(&key) {
            return Arc::clone(pool);
        }
        let mut pools = self.pools.write();
        Arc::clone(pools.entry(key.clone()).or_insert_with(|| {
            Arc::new(ConnectionPool::new(
                key,
                Arc::clone(&self.source),
                self.source.settings.idle_timeout(),
            ))
        }))
    }

    /// Remove a connection from whichever pool knows it.
    ///
    /// An idle connection is closed immediately; an active one is closed
    /// instead of re-pooled when its proxy checks it back in. Returns
    /// `true` when any pool knew the id.
    pub fn remove_connection(&self, id: uuid::Uuid) -> bool {
        let pools: Vec<Arc<ConnectionPool>> = self.pools.read().values().cloned().collect();
        pools.iter().any(|pool| pool.remove_connection(id))
    }

    /// Counts per pool, keyed by pool identity.
    #[must_use]
    pub fn status(&self) -> Vec<(ConnectionKey, PoolStatus)> {
        self.pools
            .read()
            .iter()
            .map(|(key, pool)| (key.clone(), pool.status()))
            .collect()
    }
}

fn validate_environment(
    cs: &ConnectionString,
    application: &DeployEnvironment,
    policy: &dyn EnvironmentPolicy,
    strict: bool,
) -> Result<()> {
    let host = cs.host().unwrap_or_default().to_string();
    let database = policy.database_environment(&host);

    let verdict = match &database {
        Some(database) => policy.compare(application, database),
        None => EnvVerdict::Unknown,
    };

    match verdict {
        EnvVerdict::Match => Ok(()),
        EnvVerdict::Mismatch => Err(Error::EnvironmentMismatch {
            application: application.to_string(),
            database: database.map(|d| d.to_string()).unwrap_or_default(),
            host,
        }),
        EnvVerdict::Unknown if strict => Err(Error::EnvironmentUnknown { host }),
        EnvVerdict::Unknown => {
            tracing::warn!(
                host = %host,
                application = %application,
                "could not determine database environment; proceeding"
            );
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environment::HostnameEnvironmentPolicy;

    #[test]
    fn mismatched_environments_are_rejected() {
        let cs = ConnectionString::parse("Server=orders-dev.internal;Database=orders")
            .expect("parse");
        let result = validate_environment(
            &cs,
            &DeployEnvironment::Production,
            &HostnameEnvironmentPolicy,
            true,
        );
        assert!(matches!(result, Err(Error::EnvironmentMismatch { .. })));
    }

    #[test]
    fn unknown_environment_fails_only_when_strict() {
        let cs = ConnectionString::parse("Server=db01.internal").expect("parse");
        let strict = validate_environment(
            &cs,
            &DeployEnvironment::Production,
            &HostnameEnvironmentPolicy,
            true,
        );
        assert!(matches!(strict, Err(Error::EnvironmentUnknown { .. })));

        let lenient = validate_environment(
            &cs,
            &DeployEnvironment::Production,
            &HostnameEnvironmentPolicy,
            false,
        );
        assert!(lenient.is_ok());
    }

    #[test]
    fn matched_environments_pass() {
        let cs = ConnectionString::parse("Server=orders-prod-sql.database.windows.net")
            .expect("parse");
        let result = validate_environment(
            &cs,
            &DeployEnvironment::Production,
            &HostnameEnvironmentPolicy,
            true,
        );
        assert!(result.is_ok());
    }
}
