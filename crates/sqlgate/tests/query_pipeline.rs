//! Query builder, result-set pipeline, retries, and the post-execution
//! message check.

mod common;

use common::{
    FakeDriver, Script, error_message, factory_with, info_message, row, test_settings,
};
use sqlgate::{Error, Rows, SqlValue};
use tokio_util::sync::CancellationToken;

fn orders_script() -> Script {
    Script {
        result_sets: vec![
            vec![row(
                &["id", "status"],
                vec![SqlValue::Int(42), SqlValue::from("shipped")],
            )],
            vec![
                row(&["line"], vec![SqlValue::Int(1)]),
                row(&["line"], vec![SqlValue::Int(2)]),
            ],
        ],
        ..Script::default()
    }
}

#[tokio::test]
async fn readers_map_result_sets_in_order() {
    let driver = FakeDriver::scripted(orders_script());
    let factory = factory_with(&driver, test_settings());
    let mut conn = factory.get_connection(None).await.expect("checkout");

    let results = conn
        .query_procedure("dbo.GetOrder")
        .expect("valid name")
        .with_parameter("id", 42)
        .expect("valid parameter")
        .read_required(|rows: Rows| rows.scalar::<i32>())
        .read_each(|row| row.get_named_as::<i32>("line"))
        .execute_query::<(i32, Vec<i32>)>()
        .await
        .expect("query succeeds");

    let (order_id, lines) = results.into_inner();
    assert_eq!(order_id, 42);
    assert_eq!(lines, vec![1, 2]);
}

#[tokio::test]
async fn arity_mismatch_fails_before_executing() {
    let driver = FakeDriver::scripted(orders_script());
    let factory = factory_with(&driver, test_settings());
    let mut conn = factory.get_connection(None).await.expect("checkout");

    let result = conn
        .query_text("SELECT 1")
        .read(|rows: Rows| Ok(rows.len()))
        .read(|rows: Rows| Ok(rows.len()))
        .execute_query::<(usize,)>()
        .await;

    assert!(matches!(
        result,
        Err(Error::ReaderCountMismatch {
            registered: 2,
            requested: 1,
        })
    ));
    assert_eq!(driver.executes(), 0, "nothing may execute on a mismatch");
}

#[tokio::test]
async fn missing_optional_result_set_yields_default() {
    // No result sets at all.
    let driver = FakeDriver::scripted(Script::default());
    let factory = factory_with(&driver, test_settings());
    let mut conn = factory.get_connection(None).await.expect("checkout");

    let results = conn
        .query_text("EXEC dbo.MaybeNothing")
        .read(|_rows: Rows| Ok(99_i32))
        .read_each(|row| row.get_as::<i32>(0))
        .execute_query::<(i32, Vec<i32>)>()
        .await
        .expect("optional readers tolerate missing sets");

    let (scalar, items) = results.into_inner();
    assert_eq!(scalar, 0, "missing set takes the default, not the reader");
    assert!(items.is_empty());
}

#[tokio::test]
async fn missing_mandatory_result_set_names_its_position() {
    let script = Script {
        result_sets: vec![vec![row(&["id"], vec![SqlValue::Int(1)])]],
        ..Script::default()
    };
    let driver = FakeDriver::scripted(script);
    let factory = factory_with(&driver, test_settings());
    let mut conn = factory.get_connection(None).await.expect("checkout");

    let result = conn
        .query_text("EXEC dbo.TwoSets")
        .read_required(|rows: Rows| rows.scalar::<i32>())
        .read_required(|rows: Rows| rows.scalar::<i32>())
        .execute_query::<(i32, i32)>()
        .await;

    assert!(matches!(
        result,
        Err(Error::MandatoryResultSet { position: 1 })
    ));
}

#[tokio::test]
async fn empty_mandatory_result_set_fails() {
    let script = Script {
        result_sets: vec![Vec::new()],
        ..Script::default()
    };
    let driver = FakeDriver::scripted(script);
    let factory = factory_with(&driver, test_settings());
    let mut conn = factory.get_connection(None).await.expect("checkout");

    let result = conn
        .query_text("EXEC dbo.MustHaveRows")
        .read_required(|rows: Rows| rows.scalar::<i32>())
        .execute_query::<(i32,)>()
        .await;

    assert!(matches!(
        result,
        Err(Error::MandatoryResultSet { position: 0 })
    ));
}

#[tokio::test]
async fn retryable_failures_rerun_the_whole_unit() {
    let script = Script {
        failures_before_success: 2,
        retryable_failures: true,
        ..orders_script()
    };
    let driver = FakeDriver::scripted(script);
    let factory = factory_with(&driver, test_settings().max_retries(3));
    let mut conn = factory.get_connection(None).await.expect("checkout");

    let results = conn
        .query_procedure("dbo.GetOrder")
        .expect("valid name")
        .read_required(|rows: Rows| rows.scalar::<i32>())
        .read_each(|row| row.get_named_as::<i32>("line"))
        .execute_query::<(i32, Vec<i32>)>()
        .await
        .expect("third attempt succeeds");

    assert_eq!(results.into_inner().0, 42);
    assert_eq!(driver.executes(), 3);
}

#[tokio::test]
async fn retries_stop_at_the_attempt_limit() {
    let script = Script {
        failures_before_success: 10,
        retryable_failures: true,
        ..Script::default()
    };
    let driver = FakeDriver::scripted(script);
    let factory = factory_with(&driver, test_settings());
    let mut conn = factory.get_connection(None).await.expect("checkout");

    let result = conn
        .query_text("SELECT 1")
        .with_retries(2)
        .read(|rows: Rows| Ok(rows.len()))
        .execute_query::<(usize,)>()
        .await;

    assert!(matches!(result, Err(Error::Query { retryable: true, .. })));
    assert_eq!(driver.executes(), 2);
}

#[tokio::test]
async fn non_retryable_failures_execute_once() {
    let script = Script {
        failures_before_success: 10,
        retryable_failures: false,
        ..Script::default()
    };
    let driver = FakeDriver::scripted(script);
    let factory = factory_with(&driver, test_settings().max_retries(5));
    let mut conn = factory.get_connection(None).await.expect("checkout");

    let result = conn
        .query_text("SELECT 1")
        .read(|rows: Rows| Ok(rows.len()))
        .execute_query::<(usize,)>()
        .await;

    assert!(matches!(result, Err(Error::Query { retryable: false, .. })));
    assert_eq!(driver.executes(), 1);
}

#[tokio::test]
async fn error_class_messages_fail_a_successful_execution() {
    let script = Script {
        result_sets: vec![vec![row(&["id"], vec![SqlValue::Int(1)])]],
        messages: vec![
            info_message("3 rows examined"),
            error_message("constraint trouble upstream"),
        ],
        ..Script::default()
    };
    let driver = FakeDriver::scripted(script);
    let factory = factory_with(&driver, test_settings());
    let mut conn = factory.get_connection(None).await.expect("checkout");

    let result = conn
        .query_procedure("dbo.Boom")
        .expect("valid name")
        .with_parameter("id", 7)
        .expect("valid parameter")
        .read_required(|rows: Rows| rows.scalar::<i32>())
        .execute_query::<(i32,)>()
        .await;

    let Err(Error::UnreportedServerError { details }) = result else {
        panic!("expected an unreported server error, got {result:?}");
    };
    assert!(details.contains("constraint trouble upstream"));
    assert!(details.contains("[dbo].[Boom]"), "dump names the statement");
    assert!(details.contains("@id = 7"), "dump renders the parameters");
}

#[tokio::test]
async fn informational_messages_do_not_fail_execution() {
    let script = Script {
        result_sets: vec![vec![row(&["id"], vec![SqlValue::Int(1)])]],
        messages: vec![info_message("plan recompiled")],
        ..Script::default()
    };
    let driver = FakeDriver::scripted(script);
    let factory = factory_with(&driver, test_settings());
    let mut conn = factory.get_connection(None).await.expect("checkout");

    conn.query_text("SELECT 1")
        .read_required(|rows: Rows| rows.scalar::<i32>())
        .execute_query::<(i32,)>()
        .await
        .expect("informational messages are harmless");
}

#[tokio::test]
async fn duplicate_parameters_are_rejected() {
    let driver = FakeDriver::scripted(orders_script());
    let factory = factory_with(&driver, test_settings());
    let mut conn = factory.get_connection(None).await.expect("checkout");

    // Same name, different spelling.
    let builder = conn
        .query_procedure("dbo.GetOrder")
        .expect("valid name")
        .with_parameter("id", 1)
        .expect("first binding");
    let result = builder.with_parameter("@ID", 2);
    assert!(matches!(result, Err(Error::DuplicateParameter { .. })));
}

#[tokio::test]
async fn execute_non_query_reports_rows_affected() {
    let script = Script {
        rows_affected: 7,
        ..Script::default()
    };
    let driver = FakeDriver::scripted(script);
    let factory = factory_with(&driver, test_settings());
    let mut conn = factory.get_connection(None).await.expect("checkout");

    let affected = conn
        .query_text("DELETE FROM dbo.Stale")
        .execute_non_query()
        .await
        .expect("statement succeeds");
    assert_eq!(affected, 7);
}

#[tokio::test]
async fn execute_scalar_reads_the_first_cell() {
    let script = Script {
        result_sets: vec![vec![row(&["n"], vec![SqlValue::BigInt(123)])]],
        ..Script::default()
    };
    let driver = FakeDriver::scripted(script);
    let factory = factory_with(&driver, test_settings());
    let mut conn = factory.get_connection(None).await.expect("checkout");

    let n: i64 = conn
        .query_text("SELECT COUNT(*) FROM dbo.Orders")
        .execute_scalar()
        .await
        .expect("scalar succeeds");
    assert_eq!(n, 123);
}

#[tokio::test]
async fn cancellation_aborts_a_hung_execution() {
    let script = Script {
        hang: true,
        ..Script::default()
    };
    let driver = FakeDriver::scripted(script);
    let factory = factory_with(&driver, test_settings());
    let mut conn = factory.get_connection(None).await.expect("checkout");

    let token = CancellationToken::new();
    let cancel = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        cancel.cancel();
    });

    let result = conn
        .query_text("WAITFOR DELAY '01:00:00'")
        .with_cancellation(token)
        .read(|rows: Rows| Ok(rows.len()))
        .execute_query::<(usize,)>()
        .await;

    assert!(matches!(result, Err(Error::Cancelled)));
}

#[tokio::test]
async fn malformed_procedure_names_are_rejected() {
    let driver = FakeDriver::scripted(Script::default());
    let factory = factory_with(&driver, test_settings());
    let mut conn = factory.get_connection(None).await.expect("checkout");

    assert!(matches!(
        conn.query_procedure("dbo."),
        Err(Error::Parse(_))
    ));
    assert!(matches!(
        conn.query_procedure("[unterminated"),
        Err(Error::Parse(_))
    ));
}
