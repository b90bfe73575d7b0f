//! Fixtures built around the `loopback-shim` binary.
//!
//! A loopback "broker" is a scratch directory. Each shim's sender and receiver
//! run the same binary with a role subcommand and an optional fault.

use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;

use amqp_interop::executor::{ExecutorConfig, WorkerLimits};
use amqp_interop::matrix::DEFAULT_QUEUE_PREFIX;
use amqp_interop::shims::{ShimSpec, WorkerCommand};

/// Seconds a loopback receiver waits for its message before giving up.
pub const RECEIVE_WAIT_SECS: &str = "3";

pub fn loopback_bin() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_loopback-shim"))
}

/// A loopback shim whose sender and receiver misbehave as named
/// (`none`, `hang`, `refuse`, `garble`, `drop`, `retag`).
pub fn loopback_shim(name: &str, sender_fault: &str, receiver_fault: &str) -> ShimSpec {
    ShimSpec::new(
        name,
        WorkerCommand::new(loopback_bin()).with_args(["--fault", sender_fault, "send"]),
        WorkerCommand::new(loopback_bin()).with_args([
            "--fault",
            receiver_fault,
            "--wait-secs",
            RECEIVE_WAIT_SECS,
            "receive",
        ]),
    )
}

/// Scratch directory standing in for a broker.
pub struct Broker {
    dir: TempDir,
}

impl Broker {
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().expect("create broker dir"),
        }
    }

    pub fn addr(&self) -> String {
        self.dir.path().display().to_string()
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Messages published but never consumed.
    #[allow(dead_code)]
    pub fn pending(&self) -> usize {
        std::fs::read_dir(self.dir.path())
            .map(|entries| entries.count())
            .unwrap_or(0)
    }
}

/// Generous enough for a loaded CI machine, short enough to keep hangs cheap.
pub fn fast_limits() -> WorkerLimits {
    WorkerLimits {
        timeout: Duration::from_secs(10),
        kill_grace: Duration::from_secs(2),
    }
}

pub fn executor_config(broker: &Broker, limits: WorkerLimits) -> ExecutorConfig {
    ExecutorConfig {
        sender_addr: broker.addr(),
        receiver_addr: broker.addr(),
        queue_prefix: DEFAULT_QUEUE_PREFIX.to_string(),
        limits,
    }
}

/// Write a shim registry file into `dir` and return its path.
#[allow(dead_code)]
pub fn write_shim_config(dir: &Path, shims: &[ShimSpec]) -> PathBuf {
    let path = dir.join("shims.json");
    let json = serde_json::to_string_pretty(shims).expect("serialize shims");
    std::fs::write(&path, json).expect("write shim config");
    path
}
