//! Case execution against real worker processes (the loopback shim).

mod common;

use std::sync::Arc;
use std::time::{Duration, Instant};

use amqp_interop::catalog::TypeCatalog;
use amqp_interop::executor::{CaseExecutor, WorkerLimits};
use amqp_interop::matrix::{CaseId, TestCase};
use amqp_interop::report::Outcome;
use amqp_interop::shims::{ShimRegistry, ShimSpec, WorkerCommand};
use amqp_interop::types::{AmqpType, TestValue};

use common::{
    assert_elapsed_under, assert_message_contains, assert_outcome, executor_config, fast_limits,
    loopback_shim, Broker, CountingSpawner,
};

fn executor(
    broker: &Broker,
    shims: Vec<ShimSpec>,
    limits: WorkerLimits,
) -> (CaseExecutor, Arc<CountingSpawner>) {
    let spawner = CountingSpawner::new();
    let registry = Arc::new(ShimRegistry::new(shims).unwrap());
    let executor =
        CaseExecutor::with_spawner(executor_config(broker, limits), registry, spawner.clone());
    (executor, spawner)
}

fn case(ty: AmqpType, sender: &str, receiver: &str, values: Vec<TestValue>) -> TestCase {
    TestCase::new(CaseId::new(ty, sender, receiver), Arc::new(values))
}

fn ubyte_case(sender: &str, receiver: &str) -> TestCase {
    let values = TypeCatalog::amqp_primitives().values(AmqpType::Ubyte).unwrap();
    case(AmqpType::Ubyte, sender, receiver, values)
}

#[tokio::test]
async fn test_ubyte_round_trip_passes() {
    let broker = Broker::new();
    let (executor, spawner) = executor(&broker, vec![loopback_shim("X", "none", "none")], fast_limits());

    let result = executor.execute(&ubyte_case("X", "X")).await;

    assert_outcome(&result, Outcome::Pass);
    assert!(!result.no_op);
    assert_eq!(spawner.launches(), 2);
    assert_eq!(broker.pending(), 0);
}

#[tokio::test]
async fn test_different_sender_and_receiver_shims() {
    let broker = Broker::new();
    let (executor, _) = executor(
        &broker,
        vec![loopback_shim("A", "none", "none"), loopback_shim("B", "none", "none")],
        fast_limits(),
    );

    let result = executor.execute(&ubyte_case("A", "B")).await;
    assert_outcome(&result, Outcome::Pass);
}

#[tokio::test]
async fn test_empty_list_round_trip() {
    let broker = Broker::new();
    let (executor, _) = executor(&broker, vec![loopback_shim("X", "none", "none")], fast_limits());

    let result = executor
        .execute(&case(AmqpType::List, "X", "X", vec![TestValue::empty_list()]))
        .await;
    assert_outcome(&result, Outcome::Pass);
}

#[tokio::test]
async fn test_empty_value_sequence_spawns_nothing() {
    let broker = Broker::new();
    let (executor, spawner) = executor(&broker, vec![loopback_shim("X", "none", "none")], fast_limits());

    let result = executor.execute(&case(AmqpType::Uuid, "X", "X", Vec::new())).await;

    assert_outcome(&result, Outcome::Pass);
    assert!(result.no_op);
    assert_eq!(spawner.launches(), 0);
}

#[tokio::test]
async fn test_sender_error_text_is_the_diagnostic() {
    let broker = Broker::new();
    let (executor, spawner) =
        executor(&broker, vec![loopback_shim("X", "refuse", "none")], fast_limits());

    let result = executor.execute(&ubyte_case("X", "X")).await;

    assert_outcome(&result, Outcome::Fail);
    assert_eq!(result.message.as_deref(), Some("connection refused"));
    assert_eq!(spawner.launches(), 2);
}

#[tokio::test]
async fn test_receiver_hang_is_contained() {
    let broker = Broker::new();
    let limits = WorkerLimits {
        timeout: Duration::from_secs(1),
        kill_grace: Duration::from_secs(2),
    };
    let (executor, _) = executor(&broker, vec![loopback_shim("X", "none", "hang")], limits);

    let start = Instant::now();
    let result = executor.execute(&ubyte_case("X", "X")).await;

    assert_outcome(&result, Outcome::Error);
    assert_message_contains(&result, "receiver shim 'X' timed out after 1s");
    assert!(!result.message.as_deref().unwrap_or("").contains("leak"));
    assert_elapsed_under(start, Duration::from_secs(8), "hung receiver");
}

#[tokio::test]
async fn test_sender_hang_is_contained() {
    let broker = Broker::new();
    let limits = WorkerLimits {
        timeout: Duration::from_secs(1),
        kill_grace: Duration::from_secs(2),
    };
    let (executor, _) = executor(&broker, vec![loopback_shim("X", "hang", "none")], limits);

    let result = executor.execute(&ubyte_case("X", "X")).await;

    assert_outcome(&result, Outcome::Error);
    assert_message_contains(&result, "sender shim 'X' timed out");
}

#[tokio::test]
async fn test_missing_receiver_binary() {
    let broker = Broker::new();
    let ghost = ShimSpec::new(
        "Ghost",
        WorkerCommand::new("/nonexistent/amqp-send"),
        WorkerCommand::new("/nonexistent/amqp-recv"),
    );
    let (executor, spawner) = executor(&broker, vec![ghost], fast_limits());

    let result = executor.execute(&ubyte_case("Ghost", "Ghost")).await;

    assert_outcome(&result, Outcome::Error);
    assert_message_contains(&result, "failed to launch receiver shim 'Ghost'");
    assert_eq!(spawner.launches(), 1);
}

#[tokio::test]
async fn test_missing_sender_binary_stops_receiver() {
    let broker = Broker::new();
    let ghost = ShimSpec::new(
        "Ghost",
        WorkerCommand::new("/nonexistent/amqp-send"),
        WorkerCommand::new("/nonexistent/amqp-recv"),
    );
    let (executor, spawner) = executor(
        &broker,
        vec![ghost, loopback_shim("X", "none", "none")],
        fast_limits(),
    );

    let start = Instant::now();
    let result = executor.execute(&ubyte_case("Ghost", "X")).await;

    assert_outcome(&result, Outcome::Error);
    assert_message_contains(&result, "failed to launch sender shim 'Ghost'");
    assert_eq!(spawner.launches(), 2);
    // The receiver would otherwise wait out its full receive window.
    assert_elapsed_under(start, Duration::from_secs(10), "receiver teardown");
}

#[tokio::test]
async fn test_garbled_receiver_output_is_error() {
    let broker = Broker::new();
    let (executor, _) = executor(&broker, vec![loopback_shim("X", "none", "garble")], fast_limits());

    let result = executor.execute(&ubyte_case("X", "X")).await;

    assert_outcome(&result, Outcome::Error);
    assert_message_contains(&result, "receive shim 'X' returned an unexpected result");
}

#[tokio::test]
async fn test_dropped_value_is_value_mismatch() {
    let broker = Broker::new();
    let (executor, _) = executor(&broker, vec![loopback_shim("X", "none", "drop")], fast_limits());

    let result = executor.execute(&ubyte_case("X", "X")).await;

    assert_outcome(&result, Outcome::Fail);
    assert_message_contains(&result, "value mismatch");
    assert_message_contains(&result, r#"sent: ["0x0","0x7f","0x80","0xff"]"#);
    assert_message_contains(&result, r#"received: ["0x0","0x7f","0x80"]"#);
}

#[tokio::test]
async fn test_wrong_type_tag_is_type_mismatch() {
    let broker = Broker::new();
    let (executor, _) = executor(&broker, vec![loopback_shim("X", "none", "retag")], fast_limits());

    let result = executor.execute(&ubyte_case("X", "X")).await;

    assert_outcome(&result, Outcome::Fail);
    assert_message_contains(&result, "type mismatch");
    assert_message_contains(&result, "received: string");
}

#[tokio::test]
async fn test_unknown_shim_in_case() {
    let broker = Broker::new();
    let (executor, spawner) = executor(&broker, vec![loopback_shim("X", "none", "none")], fast_limits());

    let result = executor.execute(&ubyte_case("X", "Y")).await;

    assert_outcome(&result, Outcome::Error);
    assert_message_contains(&result, "shim `Y` is not in the registry");
    assert_eq!(spawner.launches(), 0);
}

#[cfg(target_os = "linux")]
#[tokio::test]
async fn test_timed_out_wrapper_shim_leaves_no_processes() {
    use common::assert_process_exited;
    use tempfile::TempDir;

    let broker = Broker::new();
    let scratch = TempDir::new().unwrap();
    let pid_file = scratch.path().join("client.pid");
    // A wrapper that starts the real client and waits on it.
    let script = format!("sleep 4327 & echo $! > '{}'; wait", pid_file.display());
    let mut wrapped = loopback_shim("Wrapped", "none", "none");
    wrapped.receiver = WorkerCommand::new("/bin/sh").with_args(["-c", script.as_str()]);

    let limits = WorkerLimits {
        timeout: Duration::from_secs(1),
        kill_grace: Duration::from_secs(2),
    };
    let (executor, _) = executor(&broker, vec![wrapped], limits);

    let result = executor.execute(&ubyte_case("Wrapped", "Wrapped")).await;

    assert_outcome(&result, Outcome::Error);
    assert_message_contains(&result, "receiver shim 'Wrapped' timed out after 1s and was terminated");
    assert!(!result.message.as_deref().unwrap_or("").contains("leak"));

    let pid = std::fs::read_to_string(&pid_file).unwrap();
    assert_process_exited(pid.trim(), "wrapped client");
}
