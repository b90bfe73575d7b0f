//! Shared types for the amqp-interop workspace.
//!
//! This crate holds the value grammar that travels between the harness and the
//! worker processes it drives:
//!
//! - [`AmqpType`] - the closed vocabulary of AMQP primitive type names
//! - [`TestValue`] - a literal, list or map, nested arbitrarily
//! - [`TypedValue`] - a `"<type>:<literal>"` element inside a composite
//!
//! Workers written in Rust can depend on this crate directly to parse the JSON
//! payload they receive on the command line.

pub mod env_utils;
pub mod tag;
pub mod value;

pub use tag::{AmqpType, UnknownTypeError};
pub use value::{TagError, TestValue, TypedValue};

/// Encode a value sequence as the compact JSON array handed to a sender worker.
pub fn encode_values(values: &[TestValue]) -> serde_json::Result<String> {
    serde_json::to_string(values)
}

/// Decode a JSON array of values as printed by a receiver worker.
pub fn decode_values(json: &str) -> serde_json::Result<Vec<TestValue>> {
    serde_json::from_str(json)
}
