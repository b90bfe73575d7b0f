//! Runs one case against a sender and a receiver shim.
//!
//! The receiver is always started before the sender. Both are then awaited
//! concurrently, each under its own timeout.

mod group;
mod verdict;
mod worker;

use std::sync::Arc;
use std::time::Instant;

use amqp_interop_types::encode_values;

use crate::error::CaseFailure;
use crate::matrix::{TestCase, DEFAULT_QUEUE_PREFIX};
use crate::report::{Outcome, TestResult};
use crate::shims::{ShimRegistry, ShimSpec};

pub use verdict::judge;
pub use worker::{
    launch, ProcessSpawner, SupervisedWorker, WorkerExit, WorkerInvocation, WorkerLimits,
    WorkerRole, WorkerSpawner,
};

pub const DEFAULT_ADDR: &str = "localhost:5672";

#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    pub sender_addr: String,
    pub receiver_addr: String,
    pub queue_prefix: String,
    pub limits: WorkerLimits,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            sender_addr: DEFAULT_ADDR.to_string(),
            receiver_addr: DEFAULT_ADDR.to_string(),
            queue_prefix: DEFAULT_QUEUE_PREFIX.to_string(),
            limits: WorkerLimits::default(),
        }
    }
}

pub struct CaseExecutor {
    config: ExecutorConfig,
    shims: Arc<ShimRegistry>,
    spawner: Arc<dyn WorkerSpawner>,
}

impl CaseExecutor {
    pub fn new(config: ExecutorConfig, shims: Arc<ShimRegistry>) -> Self {
        Self::with_spawner(config, shims, Arc::new(ProcessSpawner))
    }

    pub fn with_spawner(
        config: ExecutorConfig,
        shims: Arc<ShimRegistry>,
        spawner: Arc<dyn WorkerSpawner>,
    ) -> Self {
        Self {
            config,
            shims,
            spawner,
        }
    }

    /// Execute `case` and produce its single result.
    ///
    /// An empty value sequence passes without spawning anything.
    pub async fn execute(&self, case: &TestCase) -> TestResult {
        if case.values().is_empty() {
            tracing::info!(case = %case.id(), "no test values; passing without spawning");
            return TestResult::no_op(case.id().clone());
        }

        let start = Instant::now();
        tracing::info!(case = %case.id(), "case started");

        let result = match self.run(case).await {
            Ok(()) => TestResult::pass(case.id().clone(), start.elapsed()),
            Err(failure) => TestResult::failed(case.id().clone(), &failure, start.elapsed()),
        };

        match result.outcome {
            Outcome::Pass => tracing::info!(
                case = %case.id(),
                elapsed_ms = result.duration_ms,
                "case passed"
            ),
            outcome => tracing::info!(
                case = %case.id(),
                %outcome,
                elapsed_ms = result.duration_ms,
                message = result.message.as_deref().unwrap_or(""),
                "case did not pass"
            ),
        }
        result
    }

    async fn run(&self, case: &TestCase) -> Result<(), CaseFailure> {
        let sender_shim = self.shim(case.sender())?;
        let receiver_shim = self.shim(case.receiver())?;
        let payload = encode_values(case.values()).map_err(CaseFailure::Encode)?;
        let queue = case.queue_name(&self.config.queue_prefix);
        let ty = case.ty().to_string();
        let limits = self.config.limits;

        let receiver_invocation = WorkerInvocation {
            role: WorkerRole::Receiver,
            shim: receiver_shim.name.clone(),
            command: receiver_shim.receiver.clone(),
            params: vec![
                self.config.receiver_addr.clone(),
                queue.clone(),
                ty.clone(),
                case.values().len().to_string(),
            ],
        };
        let sender_invocation = WorkerInvocation {
            role: WorkerRole::Sender,
            shim: sender_shim.name.clone(),
            command: sender_shim.sender.clone(),
            params: vec![self.config.sender_addr.clone(), queue, ty, payload],
        };

        let receiver = launch(self.spawner.as_ref(), &receiver_invocation, limits)?;
        let sender = match launch(self.spawner.as_ref(), &sender_invocation, limits) {
            Ok(sender) => sender,
            Err(e) => {
                tracing::debug!(case = %case.id(), "sender launch failed; stopping receiver");
                receiver.terminate().await;
                return Err(e.into());
            }
        };

        let (sender_result, receiver_result) = tokio::join!(sender.join(), receiver.join());
        judge(case, sender_result, receiver_result)
    }

    fn shim(&self, name: &str) -> Result<&ShimSpec, CaseFailure> {
        self.shims
            .get(name)
            .ok_or_else(|| CaseFailure::UnknownShim(name.to_string()))
    }
}
