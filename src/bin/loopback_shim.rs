//! Reference shim that speaks the worker contract without a real broker.
//!
//! The connection address is a directory. `send` writes the value sequence to
//! a file named after the queue; `receive` waits for that file, consumes it and
//! prints the type tag and the values as two lines.
//!
//! ```text
//! loopback-shim send    <dir> <queue> <type> <json-values>
//! loopback-shim receive <dir> <queue> <type> <count>
//! ```
//!
//! `--fault` makes the shim misbehave in one specific way, for exercising the
//! harness's failure handling.

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::{Duration, Instant};

use amqp_interop_types::env_utils::env_secs_or;
use amqp_interop_types::{decode_values, encode_values, AmqpType, TestValue};

const RECEIVE_WAIT_ENV: &str = "LOOPBACK_RECEIVE_WAIT_SECS";
const POLL_INTERVAL: Duration = Duration::from_millis(20);

#[derive(Debug, Copy, Clone, PartialEq, Eq, ValueEnum)]
enum Fault {
    /// Behave correctly.
    None,
    /// Never exit.
    Hang,
    /// Report "connection refused" and exit 1.
    Refuse,
    /// Receiver prints the type line only.
    Garble,
    /// Receiver loses the last value.
    Drop,
    /// Receiver reports a different type tag.
    Retag,
}

#[derive(Debug, Parser)]
#[command(name = "loopback-shim")]
struct Args {
    #[arg(long, value_enum, default_value_t = Fault::None)]
    fault: Fault,

    /// Seconds a receiver waits for its message (default: $LOOPBACK_RECEIVE_WAIT_SECS, then 30).
    #[arg(long, value_name = "SECS")]
    wait_secs: Option<u64>,

    #[command(subcommand)]
    command: Role,
}

#[derive(Debug, Subcommand)]
enum Role {
    Send {
        addr: PathBuf,
        queue: String,
        amqp_type: String,
        values: String,
    },
    Receive {
        addr: PathBuf,
        queue: String,
        amqp_type: String,
        count: usize,
    },
}

#[derive(Debug, Serialize, Deserialize)]
struct Message {
    #[serde(rename = "type")]
    ty: AmqpType,
    values: Vec<TestValue>,
}

fn main() -> ExitCode {
    let args = Args::parse();

    match args.fault {
        Fault::Hang => loop {
            std::thread::sleep(Duration::from_secs(3600));
        },
        Fault::Refuse => {
            println!("connection refused");
            return ExitCode::FAILURE;
        }
        _ => {}
    }

    let result = match &args.command {
        Role::Send {
            addr,
            queue,
            amqp_type,
            values,
        } => send(addr, queue, amqp_type, values),
        Role::Receive {
            addr,
            queue,
            amqp_type,
            count,
        } => {
            let wait = args
                .wait_secs
                .map(Duration::from_secs)
                .unwrap_or_else(|| env_secs_or(RECEIVE_WAIT_ENV, Duration::from_secs(30)));
            receive(addr, queue, amqp_type, *count, wait, args.fault)
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            // Errors go to stdout: that is where the harness reads shim reports.
            println!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

fn queue_path(addr: &Path, queue: &str) -> PathBuf {
    let file: String = queue
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || "._-".contains(c) { c } else { '_' })
        .collect();
    addr.join(format!("{file}.json"))
}

fn send(addr: &Path, queue: &str, amqp_type: &str, values: &str) -> Result<()> {
    let ty: AmqpType = amqp_type.parse()?;
    let values = decode_values(values).context("invalid test values")?;
    // Array values lead with a bare element type, so only lists and maps are
    // checked.
    if matches!(ty, AmqpType::List | AmqpType::Map) {
        for value in &values {
            value.validate_tags()?;
        }
    }

    let path = queue_path(addr, queue);
    let tmp = path.with_extension("tmp");
    let body = serde_json::to_vec(&Message { ty, values })?;
    std::fs::write(&tmp, body).with_context(|| format!("write {}", tmp.display()))?;
    std::fs::rename(&tmp, &path).with_context(|| format!("publish to {queue}"))?;
    Ok(())
}

fn receive(
    addr: &Path,
    queue: &str,
    amqp_type: &str,
    count: usize,
    wait: Duration,
    fault: Fault,
) -> Result<()> {
    let expected: AmqpType = amqp_type.parse()?;
    let path = queue_path(addr, queue);
    let deadline = Instant::now() + wait;

    while !path.exists() {
        if Instant::now() >= deadline {
            bail!("timed out after {wait:?} waiting for a message on {queue}");
        }
        std::thread::sleep(POLL_INTERVAL);
    }

    let body = std::fs::read(&path).with_context(|| format!("read {}", path.display()))?;
    std::fs::remove_file(&path).with_context(|| format!("consume {}", path.display()))?;
    let mut message: Message =
        serde_json::from_slice(&body).with_context(|| format!("malformed message on {queue}"))?;

    if message.ty != expected {
        return Err(anyhow!(
            "expected {expected} message on {queue}, got {}",
            message.ty
        ));
    }
    if message.values.len() != count {
        // Left for the harness to judge.
        eprintln!("expected {count} values, received {}", message.values.len());
    }

    let tag = match fault {
        Fault::Retag if message.ty == AmqpType::String => AmqpType::Symbol,
        Fault::Retag => AmqpType::String,
        _ => message.ty,
    };
    if fault == Fault::Drop {
        message.values.pop();
    }

    println!("{tag}");
    if fault != Fault::Garble {
        println!("{}", encode_values(&message.values)?);
    }
    Ok(())
}
