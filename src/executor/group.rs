//! Process-group control for worker trees.
//!
//! Each worker is started as the leader of its own process group, so a shim
//! that wraps the real client (`sh`, `python3 Receiver.py`, ...) can be stopped
//! together with everything it started.

/// Group id for a worker whose pid was `leader`.
#[cfg(unix)]
fn pgid(leader: Option<u32>) -> Option<libc::pid_t> {
    leader
        .and_then(|pid| libc::pid_t::try_from(pid).ok())
        .filter(|pid| *pid > 0)
}

/// SIGKILL every process in the group. Returns false when the group is gone.
#[cfg(unix)]
pub(crate) fn kill(leader: Option<u32>) -> bool {
    let Some(pgid) = pgid(leader) else {
        return false;
    };
    // SAFETY: a negative pid addresses the group; the signal number is valid.
    unsafe { libc::kill(-pgid, libc::SIGKILL) == 0 }
}

/// Whether any process in the group is still running.
#[cfg(unix)]
pub(crate) fn alive(leader: Option<u32>) -> bool {
    let Some(pgid) = pgid(leader) else {
        return false;
    };
    // SAFETY: signal 0 performs the permission and existence checks only.
    if unsafe { libc::kill(-pgid, 0) } != 0 {
        return false;
    }
    has_running_members(pgid)
}

/// Zombies waiting to be reaped by init still answer signal 0; skip them.
#[cfg(target_os = "linux")]
fn has_running_members(pgid: libc::pid_t) -> bool {
    let Ok(entries) = std::fs::read_dir("/proc") else {
        return true;
    };
    entries.flatten().any(|entry| {
        let is_pid = entry
            .file_name()
            .to_str()
            .is_some_and(|name| name.bytes().all(|b| b.is_ascii_digit()));
        is_pid
            && std::fs::read_to_string(entry.path().join("stat"))
                .ok()
                .and_then(|stat| parse_stat(&stat))
                .is_some_and(|(state, pgrp)| pgrp == pgid && is_running(state))
    })
}

#[cfg(all(unix, not(target_os = "linux")))]
fn has_running_members(_pgid: libc::pid_t) -> bool {
    true
}

/// `(state, pgrp)` from a `/proc/<pid>/stat` line.
#[cfg(target_os = "linux")]
pub(crate) fn parse_stat(stat: &str) -> Option<(char, libc::pid_t)> {
    // The command name is parenthesised and may itself contain spaces.
    let rest = &stat[stat.rfind(')')? + 1..];
    let mut fields = rest.split_whitespace();
    let state = fields.next()?.chars().next()?;
    let _ppid = fields.next()?;
    let pgrp = fields.next()?.parse().ok()?;
    Some((state, pgrp))
}

#[cfg(target_os = "linux")]
pub(crate) fn is_running(state: char) -> bool {
    !matches!(state, 'Z' | 'X' | 'x')
}

#[cfg(not(unix))]
pub(crate) fn kill(_leader: Option<u32>) -> bool {
    false
}

#[cfg(not(unix))]
pub(crate) fn alive(_leader: Option<u32>) -> bool {
    false
}
