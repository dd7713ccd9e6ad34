//! # sqlgate-auth
//!
//! Azure managed-identity token acquisition for sqlgate.
//!
//! When a connection string carries no username or password and targets an
//! Azure SQL endpoint, sqlgate authenticates with a managed identity instead.
//! This crate wraps the `azure_identity` credential flow and validates that
//! the platform token broker (endpoint + secret environment variables) is
//! actually available before any connection is attempted.

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod error;
pub mod managed_identity;

pub use error::AuthError;
pub use managed_identity::{BrokerEnvironment, ManagedIdentityAuth};
