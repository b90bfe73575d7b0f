#![allow(unused_imports)]
//! Shared test utilities for integration tests.
//!
//! # Modules
//!
//! - `fixtures`: loopback shims, scratch brokers and shim registry files
//! - `spawners`: worker spawners that count launches
//! - `assertions`: assertion helpers with readable failure output

pub mod assertions;
pub mod fixtures;
pub mod spawners;

pub use assertions::{assert_elapsed_under, assert_message_contains, assert_outcome};
#[cfg(target_os = "linux")]
pub use assertions::assert_process_exited;
pub use fixtures::{
    executor_config, fast_limits, loopback_bin, loopback_shim, write_shim_config, Broker,
};
pub use spawners::CountingSpawner;
