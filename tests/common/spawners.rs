//! Spawners for observing how many workers a run starts.

use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::process::Child;

use amqp_interop::executor::{ProcessSpawner, WorkerInvocation, WorkerSpawner};

/// Delegates to [`ProcessSpawner`] and counts every launch attempt.
#[derive(Debug, Default)]
pub struct CountingSpawner {
    launches: AtomicUsize,
}

impl CountingSpawner {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn launches(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }
}

impl WorkerSpawner for CountingSpawner {
    fn spawn(&self, invocation: &WorkerInvocation) -> io::Result<Child> {
        self.launches.fetch_add(1, Ordering::SeqCst);
        ProcessSpawner.spawn(invocation)
    }
}
