//! Turning two worker exits into a case verdict.

use amqp_interop_types::{decode_values, TestValue};

use super::worker::WorkerExit;
use crate::error::{CaseFailure, WorkerError};
use crate::matrix::TestCase;

/// Check, in order: sender infrastructure, sender report, receiver
/// infrastructure, receiver output shape, type tag, values.
pub fn judge(
    case: &TestCase,
    sender: Result<WorkerExit, WorkerError>,
    receiver: Result<WorkerExit, WorkerError>,
) -> Result<(), CaseFailure> {
    let sender = sender?;
    if let Some(message) = sender_report(&sender) {
        return Err(CaseFailure::SenderReported {
            shim: case.sender().to_string(),
            message,
        });
    }

    let receiver = receiver?;
    let (tag, received) = parse_receiver_output(&receiver).map_err(|output| {
        CaseFailure::ProtocolMismatch {
            shim: case.receiver().to_string(),
            output,
        }
    })?;

    if tag != case.ty().as_str() {
        return Err(CaseFailure::TypeMismatch {
            sent: case.ty().to_string(),
            received: tag,
        });
    }

    if received.as_slice() != case.values() {
        return Err(CaseFailure::ValueMismatch {
            sent: render(case.values()),
            received: render(&received),
        });
    }

    Ok(())
}

/// Non-empty output is the sender's error report. A silent non-zero exit
/// reports its stderr instead.
fn sender_report(exit: &WorkerExit) -> Option<String> {
    let stdout = exit.stdout.trim();
    if !stdout.is_empty() {
        return Some(stdout.to_string());
    }
    if exit.success {
        return None;
    }
    let stderr = exit.stderr.trim();
    Some(if stderr.is_empty() {
        exit_description(exit)
    } else {
        stderr.to_string()
    })
}

/// Expect exactly two lines: the type tag, then a JSON array of values.
/// On any other shape, return the raw output for the diagnostic.
fn parse_receiver_output(exit: &WorkerExit) -> Result<(String, Vec<TestValue>), String> {
    if !exit.success {
        let detail = match exit.stderr.trim() {
            "" => exit.stdout.trim(),
            stderr => stderr,
        };
        return Err(format!("{}: {}", exit_description(exit), detail));
    }

    let lines: Vec<&str> = exit
        .stdout
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();

    match lines.as_slice() {
        [tag, json] => decode_values(json)
            .map(|values| (tag.to_string(), values))
            .map_err(|e| format!("{} ({e})", exit.stdout.trim())),
        _ => Err(exit.stdout.trim().to_string()),
    }
}

fn exit_description(exit: &WorkerExit) -> String {
    match exit.code {
        Some(code) => format!("exited with status {code}"),
        None => "terminated by signal".to_string(),
    }
}

fn render(values: &[TestValue]) -> String {
    serde_json::to_string(values).unwrap_or_else(|_| format!("{values:?}"))
}
