//! Suite orchestration: catalog, skips and shims in, report out.

use chrono::Utc;
use futures::stream::{self, StreamExt};
use std::path::PathBuf;
use std::sync::Arc;

use crate::catalog::TypeCatalog;
use crate::error::HarnessError;
use crate::executor::{CaseExecutor, ExecutorConfig};
use crate::matrix::{MatrixGenerator, MatrixPlan, TypeSelection};
use crate::report::{ResultAggregator, SuiteReport};
use crate::shims::{ShimRegistry, ShimSelection};
use crate::skip::SkipRuleResolver;

/// Where the skip rules come from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum SkipSource {
    #[default]
    Builtin,
    File(PathBuf),
}

/// Fully validated run settings.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub types: TypeSelection,
    pub shims: ShimSelection,
    pub shim_config: PathBuf,
    pub skip_rules: SkipSource,
    pub broker: String,
    pub executor: ExecutorConfig,
    pub jobs: usize,
}

/// Built once per run and read-only afterwards.
pub struct Suite {
    pub catalog: TypeCatalog,
    pub skips: SkipRuleResolver,
    pub shims: Arc<ShimRegistry>,
}

impl Suite {
    /// Load the shim registry and skip rules named by `config`.
    pub fn load(config: &RunConfig) -> Result<Self, HarnessError> {
        let registry = ShimRegistry::load(&config.shim_config)?;
        let shims = registry.select(&config.shims)?;
        let skips = match &config.skip_rules {
            SkipSource::Builtin => SkipRuleResolver::amqp_defaults(),
            SkipSource::File(path) => SkipRuleResolver::load(path)?,
        };
        tracing::debug!(
            shims = shims.len(),
            config = %config.shim_config.display(),
            "loaded shim registry"
        );
        Ok(Self {
            catalog: TypeCatalog::amqp_primitives(),
            skips,
            shims: Arc::new(shims),
        })
    }

    pub fn plan(&self, config: &RunConfig) -> Result<MatrixPlan, HarnessError> {
        MatrixGenerator::new(&self.catalog, &self.skips).generate(
            &config.types,
            &config.broker,
            &self.shims,
        )
    }

    pub fn executor(&self, config: &RunConfig) -> CaseExecutor {
        CaseExecutor::new(config.executor.clone(), Arc::clone(&self.shims))
    }
}

/// Execute `plan`, at most `jobs` cases at a time.
///
/// Skips are recorded first, then executed cases in plan order regardless of
/// the order they finish in.
pub async fn run_plan(
    plan: &MatrixPlan,
    executor: &CaseExecutor,
    jobs: usize,
    broker: &str,
) -> SuiteReport {
    let started_at = Utc::now();
    let mut aggregator = ResultAggregator::new();
    aggregator.extend(plan.skipped.iter().cloned());

    tracing::info!(
        cases = plan.cases.len(),
        skipped = plan.skipped.len(),
        jobs,
        digest = plan.digest(),
        "running plan"
    );

    let results: Vec<_> = stream::iter(plan.cases.iter())
        .map(|case| executor.execute(case))
        .buffered(jobs.max(1))
        .collect()
        .await;
    aggregator.extend(results);

    let report = aggregator.finish(broker, plan.digest(), started_at);
    tracing::info!(
        pass = report.counts.pass,
        fail = report.counts.fail,
        error = report.counts.error,
        skip = report.counts.skip,
        "suite finished"
    );
    report
}
