//! Launching and supervising one shim process.

use parking_lot::Mutex;
use serde::Serialize;
use std::fmt;
use std::io;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use super::group;
use crate::error::{Termination, WorkerError};
use crate::shims::WorkerCommand;

const GROUP_POLL: Duration = Duration::from_millis(20);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerRole {
    Sender,
    Receiver,
}

impl fmt::Display for WorkerRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            WorkerRole::Sender => "sender",
            WorkerRole::Receiver => "receiver",
        })
    }
}

/// Per-worker time limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerLimits {
    /// Ceiling on a single worker's run time, applied to sender and receiver
    /// independently.
    pub timeout: Duration,
    /// How long a killed worker gets to exit before it is reported as leaked.
    pub kill_grace: Duration,
}

impl Default for WorkerLimits {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            kill_grace: Duration::from_secs(5),
        }
    }
}

/// Everything needed to start one worker.
#[derive(Debug, Clone)]
pub struct WorkerInvocation {
    pub role: WorkerRole,
    pub shim: String,
    pub command: WorkerCommand,
    /// Case parameters, appended after the command's own arguments.
    pub params: Vec<String>,
}

impl WorkerInvocation {
    pub fn argv(&self) -> impl Iterator<Item = &str> {
        self.command
            .args
            .iter()
            .chain(self.params.iter())
            .map(String::as_str)
    }
}

/// Starts worker processes.
///
/// The returned child must have piped stdout and stderr.
pub trait WorkerSpawner: Send + Sync {
    fn spawn(&self, invocation: &WorkerInvocation) -> io::Result<Child>;
}

/// Spawns the configured program as the leader of a new process group.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessSpawner;

impl WorkerSpawner for ProcessSpawner {
    fn spawn(&self, invocation: &WorkerInvocation) -> io::Result<Child> {
        let mut command = Command::new(&invocation.command.program);
        command
            .args(invocation.argv())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        command.process_group(0);
        command.spawn()
    }
}

/// What a worker printed before it exited.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkerExit {
    pub success: bool,
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl WorkerExit {
    fn from_parts(status: ExitStatus, stdout: Vec<u8>, stderr: Vec<u8>) -> Self {
        Self {
            success: status.success(),
            code: status.code(),
            stdout: String::from_utf8_lossy(&stdout).into_owned(),
            stderr: String::from_utf8_lossy(&stderr).into_owned(),
        }
    }
}

/// A running worker owned by its own task.
pub struct SupervisedWorker {
    role: WorkerRole,
    shim: String,
    handle: JoinHandle<Result<WorkerExit, WorkerError>>,
    kill: Option<oneshot::Sender<()>>,
}

impl SupervisedWorker {
    /// Wait for the worker to finish, time out, or be killed.
    pub async fn join(mut self) -> Result<WorkerExit, WorkerError> {
        // Keep the kill channel open until the task is done.
        let _kill = self.kill.take();
        match (&mut self.handle).await {
            Ok(result) => result,
            Err(e) => Err(WorkerError::Supervisor {
                role: self.role,
                shim: self.shim.clone(),
                message: e.to_string(),
            }),
        }
    }

    /// Kill the worker now and wait for its supervisor to wind down.
    pub async fn terminate(mut self) {
        if let Some(kill) = self.kill.take() {
            let _ = kill.send(());
        }
        let _ = (&mut self.handle).await;
    }
}

enum Waited {
    Exited(ExitStatus),
    Failed(io::Error),
    TimedOut,
    Killed,
}

/// Start `invocation` and hand the child to a supervising task.
pub fn launch(
    spawner: &dyn WorkerSpawner,
    invocation: &WorkerInvocation,
    limits: WorkerLimits,
) -> Result<SupervisedWorker, WorkerError> {
    let child = spawner
        .spawn(invocation)
        .map_err(|source| WorkerError::Launch {
            role: invocation.role,
            shim: invocation.shim.clone(),
            program: invocation.command.program.clone(),
            source,
        })?;

    tracing::debug!(
        role = %invocation.role,
        shim = %invocation.shim,
        pid = child.id(),
        program = %invocation.command.program.display(),
        "worker started"
    );

    let (kill_tx, kill_rx) = oneshot::channel();
    let handle = tokio::spawn(supervise(
        child,
        invocation.role,
        invocation.shim.clone(),
        limits,
        kill_rx,
    ));

    Ok(SupervisedWorker {
        role: invocation.role,
        shim: invocation.shim.clone(),
        handle,
        kill: Some(kill_tx),
    })
}

async fn supervise(
    mut child: Child,
    role: WorkerRole,
    shim: String,
    limits: WorkerLimits,
    mut kill_rx: oneshot::Receiver<()>,
) -> Result<WorkerExit, WorkerError> {
    // Read before waiting: the id is gone once the child is reaped.
    let leader = child.id();
    let stdout_buf = Captured::default();
    let stderr_buf = Captured::default();
    let stdout = tokio::spawn(drain(child.stdout.take(), stdout_buf.clone()));
    let stderr = tokio::spawn(drain(child.stderr.take(), stderr_buf.clone()));

    let waited = tokio::select! {
        res = tokio::time::timeout(limits.timeout, child.wait()) => match res {
            Ok(Ok(status)) => Waited::Exited(status),
            Ok(Err(source)) => Waited::Failed(source),
            Err(_) => Waited::TimedOut,
        },
        Ok(()) = &mut kill_rx => Waited::Killed,
    };

    if !matches!(waited, Waited::Exited(_)) {
        stdout.abort();
        stderr.abort();
    }

    let status = match waited {
        Waited::Exited(status) => status,
        Waited::Failed(source) => {
            kill(&mut child, leader, limits.kill_grace).await;
            return Err(WorkerError::Wait { role, shim, source });
        }
        Waited::Killed => {
            if kill(&mut child, leader, limits.kill_grace).await == Termination::Leaked {
                tracing::warn!(%role, %shim, "worker still running after kill");
            }
            tracing::debug!(%role, %shim, "worker terminated by harness");
            return Err(WorkerError::Supervisor {
                role,
                shim,
                message: "terminated before completion".to_string(),
            });
        }
        Waited::TimedOut => {
            tracing::warn!(%role, %shim, timeout = ?limits.timeout, "worker timed out");
            let termination = kill(&mut child, leader, limits.kill_grace).await;
            if termination == Termination::Leaked {
                tracing::warn!(%role, %shim, "worker still running after kill");
            }
            return Err(WorkerError::Timeout {
                role,
                shim,
                timeout: limits.timeout,
                termination,
            });
        }
    };

    // Nothing the worker started may outlive it.
    if group::alive(leader) {
        tracing::debug!(%role, %shim, "stopping processes left behind by worker");
        group::kill(leader);
    }

    // A process outside the group holding the pipes open must not stall the
    // case.
    let stdout = collect(stdout, &stdout_buf, limits.kill_grace).await;
    let stderr = collect(stderr, &stderr_buf, limits.kill_grace).await;

    tracing::debug!(%role, %shim, code = ?status.code(), "worker exited");
    Ok(WorkerExit::from_parts(status, stdout, stderr))
}

/// Kill the worker's whole process group and wait for it to disappear.
async fn kill(child: &mut Child, leader: Option<u32>, grace: Duration) -> Termination {
    let deadline = Instant::now() + grace;
    group::kill(leader);
    let _ = child.start_kill();
    if tokio::time::timeout_at(deadline, child.wait()).await.is_err() {
        return Termination::Leaked;
    }

    loop {
        if !group::alive(leader) {
            return Termination::Clean;
        }
        if Instant::now() >= deadline {
            return Termination::Leaked;
        }
        // Catches anything forked after the first signal.
        group::kill(leader);
        tokio::time::sleep(GROUP_POLL).await;
    }
}

/// Bytes read from one pipe so far.
#[derive(Debug, Clone, Default)]
struct Captured(Arc<Mutex<Vec<u8>>>);

impl Captured {
    fn take(&self) -> Vec<u8> {
        std::mem::take(&mut *self.0.lock())
    }
}

async fn drain<R: AsyncRead + Unpin>(pipe: Option<R>, sink: Captured) {
    let Some(mut pipe) = pipe else {
        return;
    };
    let mut chunk = [0u8; 4096];
    loop {
        match pipe.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => sink.0.lock().extend_from_slice(&chunk[..n]),
        }
    }
}

/// Wait up to `limit` for the pipe to close, then take whatever was read.
async fn collect(mut task: JoinHandle<()>, sink: &Captured, limit: Duration) -> Vec<u8> {
    if tokio::time::timeout(limit, &mut task).await.is_err() {
        task.abort();
    }
    sink.take()
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::time::Instant;

    fn sh(role: WorkerRole, script: &str) -> WorkerInvocation {
        WorkerInvocation {
            role,
            shim: "sh".into(),
            command: WorkerCommand::new("/bin/sh").with_args(["-c", script]),
            params: Vec::new(),
        }
    }

    fn limits(timeout_ms: u64) -> WorkerLimits {
        WorkerLimits {
            timeout: Duration::from_millis(timeout_ms),
            kill_grace: Duration::from_secs(2),
        }
    }

    #[tokio::test]
    async fn test_collects_output() {
        let worker = launch(
            &ProcessSpawner,
            &sh(WorkerRole::Receiver, "echo ubyte; echo oops >&2"),
            limits(5_000),
        )
        .unwrap();
        let exit = worker.join().await.unwrap();
        assert!(exit.success);
        assert_eq!(exit.stdout, "ubyte\n");
        assert_eq!(exit.stderr, "oops\n");
    }

    #[tokio::test]
    async fn test_nonzero_exit() {
        let worker = launch(&ProcessSpawner, &sh(WorkerRole::Sender, "exit 3"), limits(5_000))
            .unwrap();
        let exit = worker.join().await.unwrap();
        assert!(!exit.success);
        assert_eq!(exit.code, Some(3));
    }

    #[tokio::test]
    async fn test_timeout_kills_worker() {
        let start = Instant::now();
        let worker = launch(&ProcessSpawner, &sh(WorkerRole::Receiver, "sleep 30"), limits(200))
            .unwrap();
        let err = worker.join().await.unwrap_err();
        assert!(matches!(
            err,
            WorkerError::Timeout {
                role: WorkerRole::Receiver,
                termination: Termination::Clean,
                ..
            }
        ));
        assert!(start.elapsed() < Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_terminate() {
        let worker = launch(&ProcessSpawner, &sh(WorkerRole::Receiver, "sleep 30"), limits(30_000))
            .unwrap();
        let start = Instant::now();
        worker.terminate().await;
        assert!(start.elapsed() < Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_collect_keeps_partial_output() {
        use tokio::io::AsyncWriteExt;

        let (mut writer, reader) = tokio::io::duplex(64);
        writer.write_all(b"ubyte\n").await.unwrap();
        let sink = Captured::default();
        let task = tokio::spawn(drain(Some(reader), sink.clone()));
        tokio::time::sleep(Duration::from_millis(50)).await;

        // The writer stays open, so the drain never finishes on its own.
        let out = collect(task, &sink, Duration::from_millis(200)).await;
        assert_eq!(out, b"ubyte\n");
        drop(writer);
    }

    #[test]
    fn test_missing_program_is_launch_error() {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        rt.block_on(async {
            let invocation = WorkerInvocation {
                role: WorkerRole::Sender,
                shim: "ghost".into(),
                command: WorkerCommand::new("/nonexistent/amqp-sender"),
                params: vec!["localhost:5672".into()],
            };
            let err = launch(&ProcessSpawner, &invocation, limits(1_000)).err().unwrap();
            assert!(matches!(err, WorkerError::Launch { role: WorkerRole::Sender, .. }));
            assert!(err.to_string().contains("ghost"));
        });
    }

    #[cfg(target_os = "linux")]
    mod process_tree {
        use super::*;
        use crate::executor::group::{is_running, parse_stat};
        use tempfile::TempDir;

        fn running(pid: &str) -> bool {
            std::fs::read_to_string(format!("/proc/{pid}/stat"))
                .ok()
                .and_then(|stat| parse_stat(&stat))
                .is_some_and(|(state, _)| is_running(state))
        }

        /// Allows for the moment between a process closing its pipes and
        /// becoming a zombie.
        async fn exited(pid: &str) -> bool {
            for _ in 0..50 {
                if !running(pid) {
                    return true;
                }
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
            false
        }

        async fn read_pid(path: &std::path::Path) -> String {
            for _ in 0..100 {
                if let Ok(pid) = std::fs::read_to_string(path) {
                    if !pid.trim().is_empty() {
                        return pid.trim().to_string();
                    }
                }
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
            panic!("{} never written", path.display());
        }

        #[tokio::test]
        async fn test_timeout_kills_background_children() {
            let dir = TempDir::new().unwrap();
            let pid_file = dir.path().join("child.pid");
            let script = format!("sleep 4327 & echo $! > '{}'; wait", pid_file.display());

            let worker = launch(
                &ProcessSpawner,
                &sh(WorkerRole::Receiver, &script),
                WorkerLimits {
                    timeout: Duration::from_millis(500),
                    kill_grace: Duration::from_secs(2),
                },
            )
            .unwrap();
            let err = worker.join().await.unwrap_err();
            let pid = read_pid(&pid_file).await;

            assert!(matches!(
                err,
                WorkerError::Timeout {
                    termination: Termination::Clean,
                    ..
                }
            ));
            assert!(exited(&pid).await, "background sleep {pid} survived the worker");
        }

        #[tokio::test]
        async fn test_exit_stops_leftover_children() {
            let dir = TempDir::new().unwrap();
            let pid_file = dir.path().join("child.pid");
            let script = format!("sleep 4327 & echo $! > '{}'; echo ok", pid_file.display());

            let start = Instant::now();
            let worker = launch(&ProcessSpawner, &sh(WorkerRole::Sender, &script), limits(5_000))
                .unwrap();
            let exit = worker.join().await.unwrap();
            let pid = read_pid(&pid_file).await;

            assert!(exit.success);
            // The leftover sleep held stdout open; output still arrives promptly.
            assert_eq!(exit.stdout, "ok\n");
            assert!(start.elapsed() < Duration::from_secs(2));
            assert!(exited(&pid).await, "leftover sleep {pid} survived the worker");
        }

        #[tokio::test]
        async fn test_terminate_kills_background_children() {
            let dir = TempDir::new().unwrap();
            let pid_file = dir.path().join("child.pid");
            let script = format!("sleep 4327 & echo $! > '{}'; wait", pid_file.display());

            let worker = launch(
                &ProcessSpawner,
                &sh(WorkerRole::Receiver, &script),
                limits(30_000),
            )
            .unwrap();
            let pid = read_pid(&pid_file).await;
            assert!(running(&pid));

            worker.terminate().await;
            assert!(exited(&pid).await, "background sleep {pid} survived terminate");
        }
    }

}
