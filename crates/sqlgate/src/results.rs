//! Typed mapping of multi-result-set executions.
//!
//! A query that registers N readers produces an N-tuple: one slot per
//! result set, in registration order. [`FromQueryResults`] is implemented
//! for tuples of arity 1 through 10, which covers every procedure shape
//! this layer supports.

use std::any::Any;
use std::ops::Deref;

use crate::error::{Error, Result};

/// The typed outcome of a multi-result-set execution.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryResults<R>(R);

impl<R> QueryResults<R> {
    pub(crate) fn new(inner: R) -> Self {
        Self(inner)
    }

    /// Unwrap the result tuple.
    pub fn into_inner(self) -> R {
        self.0
    }
}

impl<R> Deref for QueryResults<R> {
    type Target = R;

    fn deref(&self) -> &R {
        &self.0
    }
}

/// A type assembled from the boxed outputs of a query's readers.
///
/// `ARITY` must equal the number of readers the query registered; the
/// builder checks this before executing anything.
pub trait FromQueryResults: Sized {
    /// Number of result-set slots this type consumes.
    const ARITY: usize;

    /// Assemble from boxed reader outputs, one per slot in order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Programming`] when a slot is missing or holds a
    /// value of the wrong type. Both indicate a bug in the caller's reader
    /// registration, not a runtime condition.
    fn from_slots(slots: Vec<Box<dyn Any + Send>>) -> Result<Self>;
}

macro_rules! impl_from_query_results {
    ($arity:expr => $($T:ident),+) => {
        impl<$($T: Send + 'static),+> FromQueryResults for ($($T,)+) {
            const ARITY: usize = $arity;

            fn from_slots(slots: Vec<Box<dyn Any + Send>>) -> Result<Self> {
                let mut slots = slots.into_iter();
                Ok(($(
                    *slots
                        .next()
                        .ok_or_else(|| {
                            Error::Programming("fewer result slots than readers".into())
                        })?
                        .downcast::<$T>()
                        .map_err(|_| {
                            Error::Programming(format!(
                                "result slot does not hold a {}",
                                std::any::type_name::<$T>()
                            ))
                        })?,
                )+))
            }
        }
    };
}

impl_from_query_results!(1 => T1);
impl_from_query_results!(2 => T1, T2);
impl_from_query_results!(3 => T1, T2, T3);
impl_from_query_results!(4 => T1, T2, T3, T4);
impl_from_query_results!(5 => T1, T2, T3, T4, T5);
impl_from_query_results!(6 => T1, T2, T3, T4, T5, T6);
impl_from_query_results!(7 => T1, T2, T3, T4, T5, T6, T7);
impl_from_query_results!(8 => T1, T2, T3, T4, T5, T6, T7, T8);
impl_from_query_results!(9 => T1, T2, T3, T4, T5, T6, T7, T8, T9);
impl_from_query_results!(10 => T1, T2, T3, T4, T5, T6, T7, T8, T9, T10);
