use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

use amqp_interop_types::env_utils::{env_path, env_secs_or};

use crate::error::ConfigError;
use crate::executor::{ExecutorConfig, WorkerLimits, DEFAULT_ADDR};
use crate::matrix::{TypeSelection, DEFAULT_QUEUE_PREFIX};
use crate::runner::{RunConfig, SkipSource};
use crate::shims::ShimSelection;

pub const SHIM_CONFIG_ENV: &str = "AMQP_INTEROP_SHIM_CONFIG";
pub const WORKER_TIMEOUT_ENV: &str = "AMQP_INTEROP_WORKER_TIMEOUT_SECS";

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Parser)]
#[command(
    name = "amqp-types-test",
    author,
    version,
    about = "AMQP primitive type interoperability suite"
)]
pub struct Args {
    /// AMQP type to include. Can be provided multiple times.
    #[arg(long, value_name = "AMQP-TYPE")]
    pub include_type: Vec<String>,

    /// AMQP type to exclude. Can be provided multiple times. Not compatible with --include-type.
    #[arg(long, value_name = "AMQP-TYPE")]
    pub exclude_type: Vec<String>,

    /// Shim to include. Can be provided multiple times.
    #[arg(long, value_name = "SHIM")]
    pub include_shim: Vec<String>,

    /// Shim to exclude. Can be provided multiple times. Not compatible with --include-shim.
    #[arg(long, value_name = "SHIM")]
    pub exclude_shim: Vec<String>,

    /// Address the sender shims connect to.
    #[arg(long, default_value = DEFAULT_ADDR)]
    pub sender: String,

    /// Address the receiver shims connect to.
    #[arg(long, default_value = DEFAULT_ADDR)]
    pub receiver: String,

    /// Broker or intermediary identity, used only to look up skip rules.
    #[arg(long, default_value = "unknown")]
    pub broker_type: String,

    /// Shim registry JSON (default: $AMQP_INTEROP_SHIM_CONFIG, then ~/.amqp-interop/shims.json).
    #[arg(long, value_name = "PATH")]
    pub shim_config: Option<PathBuf>,

    /// Skip rules JSON replacing the built-in known-issue tables.
    #[arg(long, value_name = "PATH")]
    pub skip_rules: Option<PathBuf>,

    /// Prefix for per-case queue names.
    #[arg(long, default_value = DEFAULT_QUEUE_PREFIX)]
    pub queue_prefix: String,

    /// Per-worker timeout in seconds (default: $AMQP_INTEROP_WORKER_TIMEOUT_SECS, then 10).
    #[arg(long, value_name = "SECS")]
    pub timeout_secs: Option<u64>,

    /// Time a killed worker gets to exit before it is reported as leaked.
    #[arg(long, value_name = "SECS", default_value_t = 5)]
    pub kill_grace_secs: u64,

    /// Number of cases to run concurrently.
    #[arg(long, default_value_t = 1)]
    pub jobs: usize,

    /// Print the plan without spawning any shim.
    #[arg(long, default_value_t = false)]
    pub dry_run: bool,

    /// Print the supported type names and exit.
    #[arg(long, default_value_t = false)]
    pub list_types: bool,

    /// Print the suite report as JSON instead of the text summary.
    #[arg(long, default_value_t = false)]
    pub json: bool,

    /// Also write the JSON suite report to this path.
    #[arg(long, value_name = "PATH")]
    pub report: Option<PathBuf>,

    /// Debug logging.
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,
}

impl Args {
    /// Validate flag combinations and resolve environment fallbacks.
    pub fn to_run_config(&self) -> Result<RunConfig, ConfigError> {
        if self.jobs == 0 {
            return Err(ConfigError::Invalid("--jobs must be at least 1".to_string()));
        }
        let timeout = self
            .timeout_secs
            .map(Duration::from_secs)
            .unwrap_or_else(|| env_secs_or(WORKER_TIMEOUT_ENV, DEFAULT_TIMEOUT));
        if timeout.is_zero() {
            return Err(ConfigError::Invalid("worker timeout must be non-zero".to_string()));
        }

        let types = TypeSelection::from_lists(&self.include_type, &self.exclude_type)?;
        let shims = ShimSelection::from_lists(&self.include_shim, &self.exclude_shim)?;

        Ok(RunConfig {
            types,
            shims,
            shim_config: self.resolve_shim_config()?,
            skip_rules: self
                .skip_rules
                .clone()
                .map_or(SkipSource::Builtin, SkipSource::File),
            broker: self.broker_type.clone(),
            executor: ExecutorConfig {
                sender_addr: self.sender.clone(),
                receiver_addr: self.receiver.clone(),
                queue_prefix: self.queue_prefix.clone(),
                limits: WorkerLimits {
                    timeout,
                    kill_grace: Duration::from_secs(self.kill_grace_secs),
                },
            },
            jobs: self.jobs,
        })
    }

    fn resolve_shim_config(&self) -> Result<PathBuf, ConfigError> {
        self.shim_config
            .clone()
            .or_else(|| env_path(SHIM_CONFIG_ENV))
            .or_else(|| dirs::home_dir().map(|h| h.join(".amqp-interop").join("shims.json")))
            .ok_or_else(|| {
                ConfigError::Invalid(format!(
                    "no shim registry: pass --shim-config or set {SHIM_CONFIG_ENV}"
                ))
            })
    }
}
