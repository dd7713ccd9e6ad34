//! Query construction and execution.
//!
//! [`QueryBuilder`] collects the statement, parameters, readers, and retry
//! policy, then drives the whole execution: one driver call, the result-set
//! pipeline in reader registration order, the post-execution message check,
//! and retries of the entire unit when the failure is marked retryable.

use std::any::Any;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use sqlgate_ident::ParameterName;

use crate::driver::{Command, CommandKind, Row, Rows};
use crate::error::{Error, Result};
use crate::proxy::ConnectionProxy;
use crate::results::{FromQueryResults, QueryResults};
use crate::value::{FromSql, SqlValue};

/// Command timeout used when neither the query nor the profile sets one.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

type ReaderFn = Box<dyn Fn(Rows) -> Result<Box<dyn Any + Send>> + Send + Sync>;
type DefaultFn = Box<dyn Fn() -> Box<dyn Any + Send> + Send + Sync>;

/// What to do when a reader's result set is missing or empty.
enum MissingPolicy {
    /// Substitute a default value.
    UseDefault(DefaultFn),
    /// Fail the execution.
    Fail,
}

struct ResultReader {
    run: ReaderFn,
    on_missing: MissingPolicy,
}

/// A single query against one checked-out connection.
///
/// Readers run against fully-read result sets in registration order, so a
/// retry can re-run them from scratch. The builder consumes itself on
/// execution; a query is used at most once.
#[must_use = "a query does nothing until executed"]
pub struct QueryBuilder<'a> {
    proxy: &'a mut ConnectionProxy,
    text: String,
    kind: CommandKind,
    parameters: Vec<(ParameterName, SqlValue)>,
    timeout: Option<Duration>,
    retries: Option<u32>,
    cancellation: Option<CancellationToken>,
    readers: Vec<ResultReader>,
}

impl<'a> QueryBuilder<'a> {
    pub(crate) fn new(proxy: &'a mut ConnectionProxy, text: String, kind: CommandKind) -> Self {
        Self {
            proxy,
            text,
            kind,
            parameters: Vec::new(),
            timeout: None,
            retries: None,
            cancellation: None,
            readers: Vec::new(),
        }
    }

    /// Bind a parameter.
    ///
    /// The name is normalized (`id` and `@id` are the same parameter) and
    /// compared case-insensitively against earlier bindings.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Parse`] for an invalid parameter name and
    /// [`Error::DuplicateParameter`] when the name is already bound.
    pub fn with_parameter(mut self, name: &str, value: impl Into<SqlValue>) -> Result<Self> {
        let name = ParameterName::new(name)?;
        if self.parameters.iter().any(|(bound, _)| *bound == name) {
            return Err(Error::DuplicateParameter {
                name: name.to_string(),
            });
        }
        self.parameters.push((name, value.into()));
        Ok(self)
    }

    /// Override the command timeout for this query.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Override the total attempt count for this query.
    ///
    /// Zero is treated as one: the query always executes at least once.
    pub fn with_retries(mut self, attempts: u32) -> Self {
        self.retries = Some(attempts);
        self
    }

    /// Cancel the execution when the token fires.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    /// Register a whole-set reader for the next result set.
    ///
    /// When the result set is missing, the slot receives `T::default()`.
    pub fn read<T, F>(mut self, reader: F) -> Self
    where
        T: Default + Send + 'static,
        F: Fn(Rows) -> Result<T> + Send + Sync + 'static,
    {
        self.readers.push(ResultReader {
            run: Box::new(move |rows| reader(rows).map(|v| Box::new(v) as Box<dyn Any + Send>)),
            on_missing: MissingPolicy::UseDefault(Box::new(|| {
                Box::new(T::default()) as Box<dyn Any + Send>
            })),
        });
        self
    }

    /// Register a whole-set reader whose result set must be present and
    /// non-empty.
    pub fn read_required<T, F>(mut self, reader: F) -> Self
    where
        T: Send + 'static,
        F: Fn(Rows) -> Result<T> + Send + Sync + 'static,
    {
        self.readers.push(ResultReader {
            run: Box::new(move |rows| reader(rows).map(|v| Box::new(v) as Box<dyn Any + Send>)),
            on_missing: MissingPolicy::Fail,
        });
        self
    }

    /// Register a per-row reader; the slot receives a `Vec<T>`.
    ///
    /// A missing result set yields an empty vector.
    pub fn read_each<T, F>(mut self, reader: F) -> Self
    where
        T: Send + 'static,
        F: Fn(&Row) -> Result<T> + Send + Sync + 'static,
    {
        self.readers.push(ResultReader {
            run: Box::new(move |rows| {
                let mut items = Vec::with_capacity(rows.len());
                for row in &rows {
                    items.push(reader(row)?);
                }
                Ok(Box::new(items) as Box<dyn Any + Send>)
            }),
            on_missing: MissingPolicy::UseDefault(Box::new(|| {
                Box::new(Vec::<T>::new()) as Box<dyn Any + Send>
            })),
        });
        self
    }

    /// Register a per-row reader whose result set must be present and
    /// non-empty; the slot receives a `Vec<T>`.
    pub fn read_each_required<T, F>(mut self, reader: F) -> Self
    where
        T: Send + 'static,
        F: Fn(&Row) -> Result<T> + Send + Sync + 'static,
    {
        self.readers.push(ResultReader {
            run: Box::new(move |rows| {
                let mut items = Vec::with_capacity(rows.len());
                for row in &rows {
                    items.push(reader(row)?);
                }
                Ok(Box::new(items) as Box<dyn Any + Send>)
            }),
            on_missing: MissingPolicy::Fail,
        });
        self
    }

    /// Execute and assemble the registered readers' outputs into `R`.
    ///
    /// The whole unit (driver call, result-set pipeline, readers) retries
    /// on retryable failures up to the configured attempt count.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ReaderCountMismatch`] before executing anything
    /// when `R::ARITY` differs from the number of registered readers, and
    /// otherwise the last execution failure.
    pub async fn execute_query<R: FromQueryResults>(self) -> Result<QueryResults<R>> {
        if self.readers.len() != R::ARITY {
            return Err(Error::ReaderCountMismatch {
                registered: self.readers.len(),
                requested: R::ARITY,
            });
        }

        let command = self.build_command();
        let attempts = total_attempts(self.retries, self.proxy.settings().max_retries);
        let Self {
            proxy,
            cancellation,
            readers,
            ..
        } = self;

        let mut attempt = 1_u32;
        loop {
            let outcome = run_cancellable(
                cancellation.as_ref(),
                run_pipeline(proxy, &command, &readers),
            )
            .await;

            match outcome {
                Ok(slots) => return R::from_slots(slots).map(QueryResults::new),
                Err(error) if error.is_retryable() && attempt < attempts => {
                    tracing::warn!(
                        statement = %command.text,
                        attempt,
                        attempts,
                        error = %error,
                        "retrying query"
                    );
                    attempt += 1;
                }
                Err(error) => return Err(error),
            }
        }
    }

    /// Execute a statement that returns no result sets; yields rows
    /// affected. Retries like [`execute_query`].
    ///
    /// [`execute_query`]: QueryBuilder::execute_query
    ///
    /// # Errors
    ///
    /// Returns the last execution failure.
    pub async fn execute_non_query(self) -> Result<u64> {
        let command = self.build_command();
        let attempts = total_attempts(self.retries, self.proxy.settings().max_retries);
        let Self {
            proxy,
            cancellation,
            ..
        } = self;

        let mut attempt = 1_u32;
        loop {
            let outcome = run_cancellable(
                cancellation.as_ref(),
                run_non_query(proxy, &command),
            )
            .await;

            match outcome {
                Ok(rows) => return Ok(rows),
                Err(error) if error.is_retryable() && attempt < attempts => {
                    tracing::warn!(
                        statement = %command.text,
                        attempt,
                        attempts,
                        error = %error,
                        "retrying statement"
                    );
                    attempt += 1;
                }
                Err(error) => return Err(error),
            }
        }
    }

    /// Execute and read the first column of the first row of the first
    /// result set. Runs exactly once; scalar reads are not retried.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MandatoryResultSet`] when no result set arrives
    /// and [`Error::Type`] when the set is empty or the value does not
    /// convert.
    pub async fn execute_scalar<T: FromSql>(self) -> Result<T> {
        let command = self.build_command();
        let Self {
            proxy,
            cancellation,
            ..
        } = self;

        let rows = run_cancellable(
            cancellation.as_ref(),
            run_single_set(proxy, &command),
        )
        .await?;
        rows.scalar()
    }

    fn build_command(&self) -> Command {
        let timeout = self
            .timeout
            .or_else(|| self.proxy.profile_command_timeout())
            .unwrap_or(DEFAULT_COMMAND_TIMEOUT);
        Command {
            text: self.text.clone(),
            kind: self.kind,
            parameters: self.parameters.clone(),
            timeout,
        }
    }
}

/// Total attempts: the query's override, else the configured default,
/// floored at one.
fn total_attempts(explicit: Option<u32>, configured: u32) -> u32 {
    explicit.unwrap_or(configured).max(1)
}

async fn run_cancellable<F, T>(token: Option<&CancellationToken>, work: F) -> Result<T>
where
    F: std::future::Future<Output = Result<T>>,
{
    match token {
        Some(token) => tokio::select! {
            () = token.cancelled() => Err(Error::Cancelled),
            result = work => result,
        },
        None => work.await,
    }
}

/// One full attempt: execute, walk result sets in reader order, run the
/// readers, then the completion check.
async fn run_pipeline(
    proxy: &mut ConnectionProxy,
    command: &Command,
    readers: &[ResultReader],
) -> Result<Vec<Box<dyn Any + Send>>> {
    let started = Instant::now();
    let span = tracing::debug_span!("sql.execute", statement = %command.text);

    let result = async {
        let mut stream = proxy.execute_stream(command).await?;
        let mut slots = Vec::with_capacity(readers.len());

        for (position, reader) in readers.iter().enumerate() {
            let present = if position == 0 {
                stream.has_result_set()
            } else {
                stream.advance().await?
            };

            if !present {
                match &reader.on_missing {
                    MissingPolicy::UseDefault(default) => {
                        slots.push(default());
                        continue;
                    }
                    MissingPolicy::Fail => {
                        return Err(Error::MandatoryResultSet { position });
                    }
                }
            }

            let mut rows = Vec::new();
            while let Some(row) = stream.next_row().await? {
                rows.push(row);
            }
            if rows.is_empty() && matches!(reader.on_missing, MissingPolicy::Fail) {
                return Err(Error::MandatoryResultSet { position });
            }
            slots.push((reader.run)(Rows::new(rows))?);
        }

        Ok(slots)
    }
    .instrument(span)
    .await;

    proxy.finish_execution(command, started, result)
}

async fn run_non_query(proxy: &mut ConnectionProxy, command: &Command) -> Result<u64> {
    let started = Instant::now();
    let span = tracing::debug_span!("sql.execute", statement = %command.text);
    let result = proxy
        .execute_rows_affected(command)
        .instrument(span)
        .await;
    proxy.finish_execution(command, started, result)
}

async fn run_single_set(proxy: &mut ConnectionProxy, command: &Command) -> Result<Rows> {
    let started = Instant::now();
    let span = tracing::debug_span!("sql.execute", statement = %command.text);

    let result = async {
        let mut stream = proxy.execute_stream(command).await?;
        if !stream.has_result_set() {
            return Err(Error::MandatoryResultSet { position: 0 });
        }
        let mut rows = Vec::new();
        while let Some(row) = stream.next_row().await? {
            rows.push(row);
        }
        Ok(Rows::new(rows))
    }
    .instrument(span)
    .await;

    proxy.finish_execution(command, started, result)
}
