//! Pooled, retrying SQL Server access layer.
//!
//! This crate sits between an application and a wire-level SQL driver. It
//! owns the concerns the driver does not: per-owner connection pooling,
//! query construction with typed multi-result-set mapping, whole-unit
//! retries, post-execution server-message checks, managed-identity
//! authentication, and deployment-environment validation.
//!
//! # Architecture
//!
//! - [`ConnectionFactory`] validates configuration once, then hands out
//!   [`ConnectionProxy`] guards, one pool per (owner, connection string).
//! - [`ConnectionProxy`] owns a checked-out [`Connection`] and returns it
//!   to its pool on drop.
//! - [`QueryBuilder`] collects the statement, parameters, and readers, and
//!   drives execution: missing optional result sets become defaults,
//!   missing mandatory ones fail, and retryable failures re-run the whole
//!   unit.
//! - The wire driver plugs in behind the [`driver::Driver`] trait.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use sqlgate::{ConnectionFactory, DatabaseSettings, Rows};
//! # use sqlgate::{DatabaseProfile, driver::Driver};
//! # async fn demo(driver: Arc<dyn Driver>, profile: Arc<dyn DatabaseProfile>) -> sqlgate::Result<()> {
//! let settings = DatabaseSettings::new("Server=orders-dev.internal;Database=orders");
//! let factory = ConnectionFactory::new(driver, profile, settings)?;
//!
//! let mut conn = factory.get_connection(Some("svc-orders")).await?;
//! let results = conn
//!     .query_procedure("dbo.GetOrder")?
//!     .with_parameter("id", 42)?
//!     .read_required(|rows: Rows| rows.scalar::<String>())
//!     .execute_query::<(String,)>()
//!     .await?;
//! let (status,) = results.into_inner();
//! # let _ = status;
//! # Ok(())
//! # }
//! ```

pub mod connection;
pub mod driver;
pub mod environment;
pub mod error;
pub mod factory;
pub mod pool;
pub mod proxy;
pub mod query;
pub mod results;
pub mod settings;
pub mod value;

pub use connection::Connection;
pub use driver::{Command, CommandKind, Row, Rows, ServerMessage};
pub use environment::{DeployEnvironment, EnvVerdict, EnvironmentPolicy, HostnameEnvironmentPolicy};
pub use error::{Error, Result};
pub use factory::{ConnectionFactory, DatabaseProfile};
pub use pool::{ConnectionKey, ConnectionPool, PoolStatus};
pub use proxy::ConnectionProxy;
pub use query::QueryBuilder;
pub use results::{FromQueryResults, QueryResults};
pub use settings::{ConnectionString, DatabaseSettings};
pub use value::{FromSql, SqlValue, TableValue};

pub use sqlgate_auth as auth;
pub use sqlgate_ident::{Identifier, ParameterName, ParseError};
