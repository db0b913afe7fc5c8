//! Process discovery over the OS process table.
//!
//! Replaces the shell-outs to `ps`/`pkill -f` and their text parsing: the
//! process table is queried directly, and the keyword set comes from one
//! place (config) instead of per-script copies.

use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, System, UpdateKind};

fn refresh_kind() -> ProcessRefreshKind {
    ProcessRefreshKind::new()
        .with_cmd(UpdateKind::Always)
        .with_memory()
}

/// Return the pids of every process whose command line contains any of the
/// given keywords.
///
/// The calling process and its parent are always excluded, so a supervisor
/// whose own command line mentions "telegram" never targets itself or the
/// wrapper that launched it. Inaccessible and kernel processes (empty
/// command line) are skipped silently; the scan itself never fails.
pub fn find_bot_processes(keywords: &[String]) -> Vec<u32> {
    let mut system = System::new();
    system.refresh_processes_specifics(ProcessesToUpdate::All, true, refresh_kind());

    let own_pid = std::process::id();
    let parent_pid = sysinfo::get_current_pid()
        .ok()
        .and_then(|pid| system.process(pid))
        .and_then(|process| process.parent())
        .map(|pid| pid.as_u32());

    let mut pids = Vec::new();
    for (pid, process) in system.processes() {
        let pid = pid.as_u32();
        if pid == own_pid || Some(pid) == parent_pid {
            continue;
        }
        let cmdline = process
            .cmd()
            .iter()
            .map(|part| part.to_string_lossy())
            .collect::<Vec<_>>()
            .join(" ");
        if cmdline.is_empty() {
            continue;
        }
        if keywords.iter().any(|keyword| cmdline.contains(keyword.as_str())) {
            pids.push(pid);
        }
    }
    pids
}

/// Whether a pid is present in the process table right now.
pub fn is_alive(pid: u32) -> bool {
    let mut system = System::new();
    let target = Pid::from_u32(pid);
    system.refresh_processes_specifics(
        ProcessesToUpdate::Some(&[target]),
        true,
        ProcessRefreshKind::new(),
    );
    system.process(target).is_some()
}

/// Memory used by a process as a percentage of total system memory.
///
/// Returns `None` when the process is gone or total memory is unknown.
pub fn process_memory_percent(pid: u32) -> Option<f64> {
    let mut system = System::new();
    system.refresh_memory();
    let total = system.total_memory();
    if total == 0 {
        return None;
    }
    let target = Pid::from_u32(pid);
    system.refresh_processes_specifics(ProcessesToUpdate::Some(&[target]), true, refresh_kind());
    system
        .process(target)
        .map(|process| process.memory() as f64 * 100.0 / total as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn own_pid_is_never_returned() {
        // match on our own executable path so the scan would otherwise
        // include this very process
        let own_exe = std::env::args().next().unwrap();
        let keywords = vec![own_exe];
        let own_pid = std::process::id();
        let pids = find_bot_processes(&keywords);
        assert!(!pids.contains(&own_pid));
    }

    #[test]
    fn no_keywords_matches_nothing() {
        assert!(find_bot_processes(&[]).is_empty());
    }

    #[test]
    fn unmatchable_keyword_matches_nothing() {
        let keywords = vec!["runcoachd-test-no-such-process-0xdeadbeef".to_string()];
        assert!(find_bot_processes(&keywords).is_empty());
    }

    #[test]
    fn liveness_of_self_and_of_nonsense_pid() {
        assert!(is_alive(std::process::id()));
        // far beyond any real pid range
        assert!(!is_alive(999_999_999));
    }

    #[test]
    fn memory_percent_of_self_is_sane() {
        let pct = process_memory_percent(std::process::id()).unwrap();
        assert!(pct >= 0.0 && pct < 100.0, "pct={}", pct);
    }

    #[test]
    fn memory_percent_of_dead_pid_is_none() {
        assert!(process_memory_percent(999_999_999).is_none());
    }
}
