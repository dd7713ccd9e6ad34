//! # sqlgate-ident
//!
//! SQL identifier and parameter-name normalization.
//!
//! Raw SQL names arrive in many spellings: bare (`dbo.Users`), bracketed
//! (`[dbo].[Users]`), quoted (`"dbo"."Users"`), or a mix. [`Identifier`]
//! rewrites any of these into one canonical bracket-quoted form so the rest
//! of the stack can interpolate object names into command text without
//! opening an injection hole. [`ParameterName`] does the same for `@`-prefixed
//! parameter names.
//!
//! Both types are pure values: parsing is a single pass over the input with
//! no I/O, and the same input always produces the same output.
//!
//! ## Example
//!
//! ```rust
//! use sqlgate_ident::Identifier;
//!
//! let ident = Identifier::new("dbo.Users")?;
//! assert_eq!(ident.as_str(), "[dbo].[Users]");
//!
//! // Already-normalized input is a fixed point.
//! let again = Identifier::new(ident.as_str())?;
//! assert_eq!(again, ident);
//! # Ok::<(), sqlgate_ident::ParseError>(())
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod error;
pub mod identifier;
pub mod parameter;

pub use error::ParseError;
pub use identifier::Identifier;
pub use parameter::ParameterName;
