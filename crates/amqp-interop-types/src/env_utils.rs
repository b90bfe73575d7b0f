//! Environment variable helpers for harness and worker configuration.
//!
//! ```
//! use amqp_interop_types::env_utils::env_secs_or;
//! use std::time::Duration;
//!
//! let timeout = env_secs_or("AMQP_INTEROP_WORKER_TIMEOUT_SECS", Duration::from_secs(10));
//! # let _ = timeout;
//! ```

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Parse an environment variable, returning `None` when unset or unparsable.
pub fn env_var<T: FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

/// Read a whole number of seconds, falling back to `default`.
pub fn env_secs_or(key: &str, default: Duration) -> Duration {
    env_var::<u64>(key)
        .map(Duration::from_secs)
        .unwrap_or(default)
}

/// Read a non-empty path.
pub fn env_path(key: &str) -> Option<PathBuf> {
    std::env::var_os(key)
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
}
