//! Error taxonomy for the interop harness.
//!
//! | Error               | Scope      | Effect                                   |
//! |---------------------|------------|------------------------------------------|
//! | [`CatalogError`]    | request    | the single lookup fails                  |
//! | [`ConfigError`]     | run        | run aborts before any case executes      |
//! | [`WorkerError`]     | case       | case outcome `error`                     |
//! | [`CaseFailure`]     | case       | case outcome `fail` or `error`           |
//!
//! Skips are not errors; they are recorded as results with outcome `skip`.

use std::fmt;
use std::io;
use std::path::PathBuf;
use std::time::Duration;

use amqp_interop_types::{AmqpType, TagError, UnknownTypeError};

use crate::executor::WorkerRole;
use crate::report::Outcome;

/// Catalog lookups and synthesis.
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error(transparent)]
    UnknownType(#[from] UnknownTypeError),

    #[error("no test values registered for `{0}`")]
    MissingEntry(AmqpType),

    #[error("cannot synthesize an array of `{0}`")]
    InvalidArrayElement(AmqpType),

    #[error("array values are synthesized and cannot be registered directly")]
    ArrayEntry,

    #[error("canonical `{ty}` value is malformed: {source}")]
    MalformedValue {
        ty: AmqpType,
        #[source]
        source: TagError,
    },
}

/// Problems with the run configuration. Always fatal to the whole run.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("--include-type and --exclude-type are mutually exclusive")]
    ConflictingTypeFilters,

    #[error("--include-shim and --exclude-shim are mutually exclusive")]
    ConflictingShimFilters,

    #[error("unknown type `{0}` in type filter")]
    UnknownType(String),

    #[error("unknown shim `{0}`; not present in the shim registry")]
    UnknownShim(String),

    #[error("shim `{0}` is registered more than once")]
    DuplicateShim(String),

    #[error("no shims selected; nothing to test")]
    NoShims,

    #[error("{0}")]
    Invalid(String),

    #[error("failed to read {}: {source}", .path.display())]
    ReadFile {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse {}: {source}", .path.display())]
    ParseFile {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// How a timed-out worker ended after it was killed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    Clean,
    Leaked,
}

impl fmt::Display for Termination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Termination::Clean => Ok(()),
            Termination::Leaked => {
                f.write_str(" (still running after kill; possible resource leak)")
            }
        }
    }
}

/// Failures while driving a single worker process.
#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    #[error("failed to launch {role} shim '{shim}' ({}): {source}", .program.display())]
    Launch {
        role: WorkerRole,
        shim: String,
        program: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("{role} shim '{shim}' timed out after {timeout:?} and was terminated{termination}")]
    Timeout {
        role: WorkerRole,
        shim: String,
        timeout: Duration,
        termination: Termination,
    },

    #[error("waiting on {role} shim '{shim}' failed: {source}")]
    Wait {
        role: WorkerRole,
        shim: String,
        #[source]
        source: io::Error,
    },

    #[error("supervisor for {role} shim '{shim}' stopped unexpectedly: {message}")]
    Supervisor {
        role: WorkerRole,
        shim: String,
        message: String,
    },
}

/// Why an executed case did not pass.
#[derive(Debug, thiserror::Error)]
pub enum CaseFailure {
    #[error(transparent)]
    Worker(#[from] WorkerError),

    /// The sender's own report, kept verbatim.
    #[error("{message}")]
    SenderReported { shim: String, message: String },

    #[error("receive shim '{shim}' returned an unexpected result: {output}")]
    ProtocolMismatch { shim: String, output: String },

    #[error("type mismatch:\n    sent: {sent}\nreceived: {received}")]
    TypeMismatch { sent: String, received: String },

    #[error("value mismatch:\n    sent: {sent}\nreceived: {received}")]
    ValueMismatch { sent: String, received: String },

    #[error("shim `{0}` is not in the registry")]
    UnknownShim(String),

    #[error("failed to encode test values: {0}")]
    Encode(#[source] serde_json::Error),
}

impl CaseFailure {
    /// Correctness failures are `fail`; infrastructure problems are `error`.
    pub fn outcome(&self) -> Outcome {
        match self {
            CaseFailure::SenderReported { .. }
            | CaseFailure::TypeMismatch { .. }
            | CaseFailure::ValueMismatch { .. } => Outcome::Fail,
            CaseFailure::Worker(_)
            | CaseFailure::ProtocolMismatch { .. }
            | CaseFailure::UnknownShim(_)
            | CaseFailure::Encode(_) => Outcome::Error,
        }
    }
}

/// Top-level error for library entry points that span several concerns.
#[derive(Debug, thiserror::Error)]
pub enum HarnessError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Catalog(#[from] CatalogError),
}
