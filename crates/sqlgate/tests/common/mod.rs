//! In-memory driver fake shared by the integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use sqlgate::driver::{
    ConnectOptions, Driver, DriverConnection, MessageSink, ResultStream,
};
use sqlgate::{
    Command, ConnectionFactory, DatabaseProfile, DatabaseSettings, Error, Result, Row,
    ServerMessage, SqlValue,
};

/// What the fake should do for every execution on every connection.
#[derive(Default, Clone)]
pub struct Script {
    /// Result sets returned by `execute`, in order.
    pub result_sets: Vec<Vec<Row>>,
    /// Number of executions that fail before one succeeds.
    pub failures_before_success: usize,
    /// Whether scripted failures are marked retryable.
    pub retryable_failures: bool,
    /// Messages pushed through the sink on every execution.
    pub messages: Vec<ServerMessage>,
    /// Rows affected reported by `execute_non_query`.
    pub rows_affected: u64,
    /// Never complete an execution; used to exercise cancellation.
    pub hang: bool,
    /// Refuse every connection attempt.
    pub fail_connect: bool,
}

#[derive(Default)]
pub struct FakeState {
    pub script: Script,
    pub connects: usize,
    pub executes: usize,
}

/// Scriptable in-memory driver. Cloning shares the state and counters.
#[derive(Clone, Default)]
pub struct FakeDriver {
    pub state: Arc<Mutex<FakeState>>,
}

impl FakeDriver {
    pub fn scripted(script: Script) -> Self {
        Self {
            state: Arc::new(Mutex::new(FakeState {
                script,
                connects: 0,
                executes: 0,
            })),
        }
    }

    pub fn connects(&self) -> usize {
        self.state.lock().connects
    }

    pub fn executes(&self) -> usize {
        self.state.lock().executes
    }
}

#[async_trait]
impl Driver for FakeDriver {
    async fn connect(&self, _options: &ConnectOptions) -> Result<Box<dyn DriverConnection>> {
        let mut state = self.state.lock();
        state.connects += 1;
        if state.script.fail_connect {
            return Err(Error::query("scripted connect refusal"));
        }
        drop(state);
        Ok(Box::new(FakeConnection {
            state: Arc::clone(&self.state),
            sink: None,
            open: true,
        }))
    }
}

struct FakeConnection {
    state: Arc<Mutex<FakeState>>,
    sink: Option<MessageSink>,
    open: bool,
}

impl FakeConnection {
    /// Count the execution, emit scripted messages, and decide failure.
    fn begin_execution(&self) -> Result<Script> {
        let script = {
            let mut state = self.state.lock();
            state.executes += 1;
            if state.script.failures_before_success > 0 {
                state.script.failures_before_success -= 1;
                let retryable = state.script.retryable_failures;
                return Err(if retryable {
                    Error::retryable_query("scripted transient failure")
                } else {
                    Error::query("scripted failure")
                });
            }
            state.script.clone()
        };

        if let Some(sink) = &self.sink {
            for message in &script.messages {
                sink(message.clone());
            }
        }
        Ok(script)
    }
}

#[async_trait]
impl DriverConnection for FakeConnection {
    fn is_open(&self) -> bool {
        self.open
    }

    fn set_message_sink(&mut self, sink: MessageSink) {
        self.sink = Some(sink);
    }

    async fn execute(&mut self, _command: &Command) -> Result<Box<dyn ResultStream>> {
        let script = self.begin_execution()?;
        if script.hang {
            std::future::pending::<()>().await;
        }
        let mut sets: VecDeque<VecDeque<Row>> = script
            .result_sets
            .into_iter()
            .map(VecDeque::from)
            .collect();
        let current = sets.pop_front();
        Ok(Box::new(FakeStream { sets, current }))
    }

    async fn execute_non_query(&mut self, _command: &Command) -> Result<u64> {
        let script = self.begin_execution()?;
        if script.hang {
            std::future::pending::<()>().await;
        }
        Ok(script.rows_affected)
    }

    fn close(&mut self) {
        self.open = false;
    }
}

struct FakeStream {
    sets: VecDeque<VecDeque<Row>>,
    current: Option<VecDeque<Row>>,
}

#[async_trait]
impl ResultStream for FakeStream {
    fn has_result_set(&self) -> bool {
        self.current.is_some()
    }

    async fn next_row(&mut self) -> Result<Option<Row>> {
        Ok(self.current.as_mut().and_then(VecDeque::pop_front))
    }

    async fn advance(&mut self) -> Result<bool> {
        self.current = self.sets.pop_front();
        Ok(self.current.is_some())
    }
}

/// Profile with no hooks, pointed at a test settings section.
pub struct TestProfile;

#[async_trait]
impl DatabaseProfile for TestProfile {
    fn settings_name(&self) -> &str {
        "TestDatabase"
    }
}

pub const TEST_CS: &str = "Server=orders-dev.internal;Database=orders";

pub fn test_settings() -> DatabaseSettings {
    DatabaseSettings::new(TEST_CS)
}

pub fn factory_with(driver: &FakeDriver, settings: DatabaseSettings) -> ConnectionFactory {
    match ConnectionFactory::new(Arc::new(driver.clone()), Arc::new(TestProfile), settings) {
        Ok(factory) => factory,
        Err(error) => panic!("factory construction failed: {error}"),
    }
}

pub fn row(columns: &[&str], values: Vec<SqlValue>) -> Row {
    Row::new(
        Arc::new(columns.iter().map(ToString::to_string).collect()),
        values,
    )
}

pub fn info_message(text: &str) -> ServerMessage {
    ServerMessage {
        number: 50000,
        class: 0,
        state: 1,
        message: text.to_string(),
        procedure: None,
        line: 1,
    }
}

pub fn error_message(text: &str) -> ServerMessage {
    ServerMessage {
        number: 50000,
        class: 17,
        state: 1,
        message: text.to_string(),
        procedure: None,
        line: 1,
    }
}
