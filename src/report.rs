//! Per-case results and the suite report.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::path::Path;
use std::time::Duration;

use crate::error::CaseFailure;
use crate::matrix::CaseId;
use crate::skip::SkipReason;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Pass,
    Fail,
    Skip,
    Error,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Pass => "pass",
            Outcome::Fail => "fail",
            Outcome::Skip => "skip",
            Outcome::Error => "error",
        }
    }
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal result of one case.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestResult {
    #[serde(flatten)]
    pub case: CaseId,
    pub outcome: Outcome,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Passed without spawning anything because there were no values to send.
    #[serde(default)]
    pub no_op: bool,
    pub duration_ms: u64,
}

impl TestResult {
    pub fn pass(case: CaseId, elapsed: Duration) -> Self {
        Self {
            case,
            outcome: Outcome::Pass,
            message: None,
            no_op: false,
            duration_ms: elapsed.as_millis() as u64,
        }
    }

    pub fn no_op(case: CaseId) -> Self {
        Self {
            case,
            outcome: Outcome::Pass,
            message: Some("no test values; nothing sent".to_string()),
            no_op: true,
            duration_ms: 0,
        }
    }

    pub fn skipped(case: CaseId, reason: &SkipReason) -> Self {
        Self {
            case,
            outcome: Outcome::Skip,
            message: Some(reason.to_string()),
            no_op: false,
            duration_ms: 0,
        }
    }

    pub fn failed(case: CaseId, failure: &CaseFailure, elapsed: Duration) -> Self {
        Self {
            case,
            outcome: failure.outcome(),
            message: Some(failure.to_string()),
            no_op: false,
            duration_ms: elapsed.as_millis() as u64,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutcomeCounts {
    pub pass: usize,
    pub fail: usize,
    pub skip: usize,
    pub error: usize,
    /// Subset of `pass` with no values exchanged.
    pub no_op: usize,
}

impl OutcomeCounts {
    pub fn total(&self) -> usize {
        self.pass + self.fail + self.skip + self.error
    }

    fn record(&mut self, result: &TestResult) {
        match result.outcome {
            Outcome::Pass => self.pass += 1,
            Outcome::Fail => self.fail += 1,
            Outcome::Skip => self.skip += 1,
            Outcome::Error => self.error += 1,
        }
        if result.no_op {
            self.no_op += 1;
        }
    }
}

/// Collects results in the order they are recorded.
#[derive(Debug, Default)]
pub struct ResultAggregator {
    results: Vec<TestResult>,
    counts: OutcomeCounts,
}

impl ResultAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, result: TestResult) {
        self.counts.record(&result);
        self.results.push(result);
    }

    pub fn extend<I: IntoIterator<Item = TestResult>>(&mut self, results: I) {
        for result in results {
            self.record(result);
        }
    }

    pub fn counts(&self) -> OutcomeCounts {
        self.counts
    }

    pub fn results(&self) -> &[TestResult] {
        &self.results
    }

    /// No `fail` and no `error`. Skips never count against the suite.
    pub fn is_success(&self) -> bool {
        self.counts.fail == 0 && self.counts.error == 0
    }

    pub fn exit_code(&self) -> i32 {
        if self.is_success() {
            0
        } else {
            1
        }
    }

    pub fn finish(
        self,
        broker: impl Into<String>,
        plan_digest: impl Into<String>,
        started_at: DateTime<Utc>,
    ) -> SuiteReport {
        SuiteReport {
            broker: broker.into(),
            plan_digest: plan_digest.into(),
            started_at,
            finished_at: Utc::now(),
            counts: self.counts,
            success: self.is_success(),
            exit_code: self.exit_code(),
            results: self.results,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuiteReport {
    pub broker: String,
    pub plan_digest: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub counts: OutcomeCounts,
    pub success: bool,
    pub exit_code: i32,
    pub results: Vec<TestResult>,
}

impl SuiteReport {
    /// One block per non-pass result, then the totals line.
    pub fn format_summary(&self) -> String {
        let mut out = String::new();
        for result in self.results.iter().filter(|r| r.outcome != Outcome::Pass) {
            let _ = writeln!(
                out,
                "{:<5} {}: {}",
                result.outcome.as_str().to_uppercase(),
                result.case,
                result.message.as_deref().unwrap_or("")
            );
        }

        let c = &self.counts;
        let _ = write!(
            out,
            "Ran {} cases against {}: {} passed ({} no-op), {} failed, {} errors, {} skipped",
            c.total(),
            self.broker,
            c.pass,
            c.no_op,
            c.fail,
            c.error,
            c.skip
        );
        out
    }

    pub fn write_json(&self, path: &Path) -> anyhow::Result<()> {
        use anyhow::Context;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create report directory {}", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(self).context("serialize suite report")?;
        std::fs::write(path, json).with_context(|| format!("write report {}", path.display()))
    }
}
