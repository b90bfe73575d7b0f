//! Custom assertion utilities for tests.

use std::time::{Duration, Instant};

use amqp_interop::report::{Outcome, TestResult};

/// Assert a result's outcome, showing its diagnostic on mismatch.
#[allow(dead_code)]
pub fn assert_outcome(result: &TestResult, expected: Outcome) {
    assert_eq!(
        result.outcome,
        expected,
        "{}: expected {}, got {} ({})",
        result.case,
        expected,
        result.outcome,
        result.message.as_deref().unwrap_or("no message")
    );
}

/// Assert that a result's diagnostic contains `expected_text`.
#[allow(dead_code)]
pub fn assert_message_contains(result: &TestResult, expected_text: &str) {
    let message = result.message.as_deref().unwrap_or("");
    assert!(
        message.contains(expected_text),
        "{}: message should contain '{}', got: {}",
        result.case,
        expected_text,
        message
    );
}

/// Assert that no more than `limit` has passed since `start`.
#[allow(dead_code)]
pub fn assert_elapsed_under(start: Instant, limit: Duration, context: &str) {
    let elapsed = start.elapsed();
    assert!(
        elapsed < limit,
        "{}: took {:?}, expected under {:?}",
        context,
        elapsed,
        limit
    );
}

/// Assert that process `pid` has exited (or is a zombie awaiting its reaper).
#[cfg(target_os = "linux")]
#[allow(dead_code)]
pub fn assert_process_exited(pid: &str, context: &str) {
    let running = || {
        std::fs::read_to_string(format!("/proc/{pid}/stat"))
            .ok()
            .and_then(|stat| {
                let rest = &stat[stat.rfind(')')? + 1..];
                rest.split_whitespace().next()?.chars().next()
            })
            .is_some_and(|state| !matches!(state, 'Z' | 'X' | 'x'))
    };
    for _ in 0..50 {
        if !running() {
            return;
        }
        std::thread::sleep(Duration::from_millis(20));
    }
    panic!("{}: process {} is still running", context, pid);
}
