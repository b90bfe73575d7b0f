//! AMQP Type Interoperability Suite
//!
//! Checks that independently written AMQP 1.0 clients agree on the meaning of
//! the protocol's primitive types:
//!
//! - **Catalog**: canonical test values per type, with arrays synthesized
//! - **Skip rules**: known broker and client limitations, resolved before anything runs
//! - **Matrix**: every type x sender shim x receiver shim, in a fixed order
//! - **Executor**: drives a receiver shim and a sender shim per case, under a timeout
//! - **Report**: pass/fail/skip/error counts and the process exit status
//!
//! See [`runner`] for the end-to-end flow.

#![allow(clippy::result_large_err)]

pub mod args;
pub mod catalog;
pub mod error;
pub mod executor;
pub mod logging;
pub mod matrix;
pub mod report;
pub mod runner;
pub mod shims;
pub mod skip;

pub use amqp_interop_types as types;
