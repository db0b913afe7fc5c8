//! Graceful process termination with TERM -> KILL escalation.
//!
//! Unlike a parent reaping its own child, the targets here are arbitrary
//! pids found by the locator, so confirmation comes from polling the
//! process table rather than `wait()`.

use std::time::Duration;

use tokio::time::Instant;
use tracing::{info, warn};

use super::locator;

const POLL_INTERVAL: Duration = Duration::from_millis(100);

#[cfg(unix)]
fn send_signal_to_process_group_or_pid(pid: u32, signal: i32) -> bool {
    // pid 0 would signal our own group; pids beyond pid_t range would
    // alias onto negative values (kill(-1) signals everything).
    if pid == 0 || pid > i32::MAX as u32 {
        return false;
    }
    let raw_pid = pid as libc::pid_t;
    // Prefer the process group (negative pid) so a detached bot's children
    // go down with it, falling back to the pid itself.
    let group_ok = unsafe { libc::kill(-raw_pid, signal) == 0 };
    if group_ok {
        return true;
    }
    unsafe { libc::kill(raw_pid, signal) == 0 }
}

/// Send SIGTERM to a process group (or fallback process pid).
#[cfg(unix)]
pub fn send_sigterm(pid: u32) -> bool {
    send_signal_to_process_group_or_pid(pid, libc::SIGTERM)
}

/// Send SIGKILL to a process group (or fallback process pid).
#[cfg(unix)]
pub fn send_sigkill(pid: u32) -> bool {
    send_signal_to_process_group_or_pid(pid, libc::SIGKILL)
}

/// Graceful termination via taskkill.
#[cfg(windows)]
pub fn send_sigterm(pid: u32) -> bool {
    if pid == 0 {
        return false;
    }
    std::process::Command::new("taskkill")
        .args(["/PID", &pid.to_string()])
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

/// Force-kill via taskkill /F.
#[cfg(windows)]
pub fn send_sigkill(pid: u32) -> bool {
    if pid == 0 {
        return false;
    }
    std::process::Command::new("taskkill")
        .args(["/F", "/PID", &pid.to_string()])
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

/// Terminate a process: graceful signal, poll up to `grace`, then force-kill.
///
/// Returns whether the process is confirmed gone. Idempotent — a pid that is
/// already dead (or vanished between check and signal) is a no-op success.
pub async fn terminate(pid: u32, grace: Duration) -> bool {
    if !locator::is_alive(pid) {
        return true;
    }

    if !send_sigterm(pid) && !locator::is_alive(pid) {
        // vanished between the liveness check and the signal
        return true;
    }

    let deadline = Instant::now() + grace;
    while Instant::now() < deadline {
        if !locator::is_alive(pid) {
            info!(pid, "Process exited after SIGTERM");
            return true;
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }

    warn!(
        pid,
        grace_secs = grace.as_secs(),
        "Process did not exit in time, escalating to SIGKILL"
    );
    let _ = send_sigkill(pid);
    tokio::time::sleep(Duration::from_secs(1)).await;
    !locator::is_alive(pid)
}

/// Terminate a batch of pids, returning how many are confirmed gone.
pub async fn terminate_all(pids: &[u32], grace: Duration) -> usize {
    let mut gone = 0;
    for &pid in pids {
        if terminate(pid, grace).await {
            gone += 1;
        } else {
            warn!(pid, "Failed to terminate process");
        }
    }
    gone
}
