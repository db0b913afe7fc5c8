//! Launches the supervised bot detached into its own process group, with
//! output appended to log files and a grace-period check that catches
//! crash-on-start.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use tracing::{info, warn};

/// Put the child in its own process group (Unix) so signals aimed at the
/// supervisor never propagate to the bot, and group kills take the bot's
/// own children down with it.
#[cfg(unix)]
fn detach_into_process_group(command: &mut tokio::process::Command) {
    // SAFETY: pre_exec runs in the child after fork and before exec; setpgid
    // is async-signal-safe.
    unsafe {
        command.pre_exec(|| {
            if libc::setpgid(0, 0) != 0 {
                return Err(std::io::Error::last_os_error());
            }
            Ok(())
        });
    }
}

#[cfg(not(unix))]
fn detach_into_process_group(command: &mut tokio::process::Command) {
    let _ = command;
}

pub struct Launcher {
    command: Vec<String>,
    log_dir: PathBuf,
    start_grace: Duration,
}

impl Launcher {
    pub fn new(command: Vec<String>, log_dir: impl Into<PathBuf>, start_grace: Duration) -> Self {
        Self {
            command,
            log_dir: log_dir.into(),
            start_grace,
        }
    }

    /// Start the bot and return its pid once it has survived the grace
    /// period. An immediate exit (crash-on-start) is an error here, not a
    /// "running" state the next cycle has to discover.
    pub async fn launch(&self) -> anyhow::Result<u32> {
        let (program, args) = self
            .command
            .split_first()
            .ok_or_else(|| anyhow::anyhow!("bot_command is empty"))?;

        std::fs::create_dir_all(&self.log_dir)?;
        let stdout = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.log_dir.join("bot.out.log"))?;
        let stderr = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.log_dir.join("bot.err.log"))?;

        let mut command = tokio::process::Command::new(program);
        command
            .args(args)
            .stdin(Stdio::null())
            .stdout(stdout)
            .stderr(stderr);
        detach_into_process_group(&mut command);

        let mut child = command.spawn()?;
        let pid = child
            .id()
            .ok_or_else(|| anyhow::anyhow!("child exited before its pid could be read"))?;
        info!(pid, command = ?self.command, "Launched bot process");

        tokio::time::sleep(self.start_grace).await;

        if let Ok(Some(status)) = child.try_wait() {
            warn!(pid, %status, "Bot exited during the start grace period");
            anyhow::bail!("bot crashed on start with {}", status);
        }

        // Reap in the background so the child never lingers as a zombie;
        // liveness from here on is judged via the process table.
        tokio::spawn(async move {
            let _ = child.wait().await;
        });

        Ok(pid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::supervisor::{locator, terminator};

    fn launcher_for(command: &[&str], dir: &std::path::Path) -> Launcher {
        Launcher::new(
            command.iter().map(|s| s.to_string()).collect(),
            dir.to_path_buf(),
            Duration::from_millis(300),
        )
    }

    #[tokio::test]
    async fn empty_command_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let launcher = launcher_for(&[], dir.path());
        assert!(launcher.launch().await.is_err());
    }

    #[tokio::test]
    async fn missing_program_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let launcher = launcher_for(&["runcoachd-no-such-program-0xdeadbeef"], dir.path());
        assert!(launcher.launch().await.is_err());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn crash_on_start_is_caught_by_the_grace_check() {
        let dir = tempfile::tempdir().unwrap();
        let launcher = launcher_for(&["sh", "-c", "exit 3"], dir.path());
        assert!(launcher.launch().await.is_err());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn surviving_process_yields_a_live_pid() {
        let dir = tempfile::tempdir().unwrap();
        let launcher = launcher_for(&["sleep", "30"], dir.path());
        let pid = launcher.launch().await.unwrap();
        assert!(locator::is_alive(pid));
        assert!(terminator::terminate(pid, Duration::from_secs(5)).await);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn output_is_appended_to_log_files() {
        let dir = tempfile::tempdir().unwrap();
        let launcher = Launcher::new(
            vec!["sh".into(), "-c".into(), "echo started; sleep 30".into()],
            dir.path().to_path_buf(),
            Duration::from_millis(300),
        );
        let pid = launcher.launch().await.unwrap();
        let out = std::fs::read_to_string(dir.path().join("bot.out.log")).unwrap();
        assert!(out.contains("started"));
        let _ = terminator::terminate(pid, Duration::from_secs(5)).await;
    }
}
