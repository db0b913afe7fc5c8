//! Bot process supervision: locate, judge, terminate, reset, relaunch.
//!
//! One loop owns the whole cycle. All bookkeeping lives in an explicit
//! [`SupervisorState`] passed through the cycle — there is no module-global
//! mutable state, and nothing a cycle does can crash the loop.

mod backoff;
mod launcher;
pub mod locator;
pub mod terminator;

pub use backoff::Backoff;
pub use launcher::Launcher;

use std::time::Duration;

use tokio::time::Instant;
use tracing::{error, info, warn};

use crate::config::{HealthConfig, SupervisorConfig};
use crate::health::{self, HealthStatus, HealthThresholds};
use crate::lock::InstanceLock;
use crate::telegram::BotApi;

/// Lifecycle of the supervised bot as this supervisor sees it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BotState {
    Stopped,
    Starting,
    Running,
    Crashed,
    Unresponsive,
    /// Terminal: the consecutive-failure cap was reached. Requires manual
    /// intervention; the loop exits instead of burning API rate limits on a
    /// crash loop.
    Halted,
}

impl BotState {
    pub fn as_str(&self) -> &'static str {
        match self {
            BotState::Stopped => "stopped",
            BotState::Starting => "starting",
            BotState::Running => "running",
            BotState::Crashed => "crashed",
            BotState::Unresponsive => "unresponsive",
            BotState::Halted => "halted",
        }
    }
}

/// Per-cycle supervision bookkeeping.
#[derive(Debug)]
pub struct SupervisorState {
    pub bot_state: BotState,
    /// Pid of the child this supervisor launched, if any. Preferred over
    /// keyword rescans for liveness checks.
    pub child_pid: Option<u32>,
    pub consecutive_failures: u32,
    pub last_restart: Option<Instant>,
    pub restarts: u64,
}

impl SupervisorState {
    pub fn new() -> Self {
        Self {
            bot_state: BotState::Stopped,
            child_pid: None,
            consecutive_failures: 0,
            last_restart: None,
            restarts: 0,
        }
    }
}

impl Default for SupervisorState {
    fn default() -> Self {
        Self::new()
    }
}

/// What the failure bookkeeping decided for this recovery round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureAction {
    Retry { delay: Duration },
    Halt,
}

/// Record a failure and decide whether to retry.
///
/// Failures inside the cooldown window count as consecutive; a restart that
/// stayed up longer than the cooldown resets the streak. Reaching the cap
/// halts supervision entirely.
pub fn register_failure(
    state: &mut SupervisorState,
    now: Instant,
    cooldown: Duration,
    cap: u32,
    backoff: &Backoff,
) -> FailureAction {
    let within_cooldown = state
        .last_restart
        .map(|last| now.duration_since(last) < cooldown)
        .unwrap_or(false);

    if within_cooldown {
        state.consecutive_failures = state.consecutive_failures.saturating_add(1);
    } else {
        state.consecutive_failures = 1;
    }

    if state.consecutive_failures > cap {
        state.bot_state = BotState::Halted;
        return FailureAction::Halt;
    }

    FailureAction::Retry {
        // first failure in a streak retries immediately, later ones back off
        delay: backoff.delay(state.consecutive_failures - 1),
    }
}

/// Why a cycle judged the bot unhealthy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Verdict {
    Healthy,
    ProcessGone,
    SentinelStale,
    MemoryExcess,
}

pub struct Supervisor {
    config: SupervisorConfig,
    thresholds: HealthThresholds,
    sentinel_path: std::path::PathBuf,
    api: BotApi,
    launcher: Launcher,
    backoff: Backoff,
    lock: InstanceLock,
}

impl Supervisor {
    pub fn new(
        config: SupervisorConfig,
        health_config: &HealthConfig,
        api: BotApi,
        lock: InstanceLock,
    ) -> Self {
        let launcher = Launcher::new(
            config.bot_command.clone(),
            config.log_dir.clone(),
            Duration::from_secs(config.start_grace_secs),
        );
        let backoff = Backoff::new(
            Duration::from_secs(config.backoff_base_secs),
            Duration::from_secs(config.backoff_cap_secs),
        );
        Self {
            thresholds: HealthThresholds::from_config(health_config),
            sentinel_path: std::path::PathBuf::from(&health_config.sentinel_path),
            config,
            api,
            launcher,
            backoff,
            lock,
        }
    }

    /// Run the supervision loop. Blocks until the failure cap halts it.
    pub async fn run(mut self) -> anyhow::Result<()> {
        info!(
            command = ?self.config.bot_command,
            check_interval_secs = self.config.check_interval_secs,
            failure_cap = self.config.max_consecutive_failures,
            "Supervisor started"
        );

        let mut state = SupervisorState::new();
        let check_interval = Duration::from_secs(self.config.check_interval_secs);

        loop {
            let verdict = self.evaluate(&state);
            match verdict {
                Verdict::Healthy => {
                    if state.bot_state != BotState::Running {
                        info!(from = state.bot_state.as_str(), "Bot is running");
                        state.bot_state = BotState::Running;
                    }
                    tokio::time::sleep(check_interval).await;
                }
                unhealthy => {
                    state.bot_state = match unhealthy {
                        Verdict::SentinelStale => BotState::Unresponsive,
                        _ => BotState::Crashed,
                    };
                    warn!(
                        verdict = ?unhealthy,
                        state = state.bot_state.as_str(),
                        "Bot judged unhealthy, starting recovery"
                    );
                    self.recover(&mut state).await;
                    if state.bot_state == BotState::Halted {
                        error!(
                            failures = state.consecutive_failures,
                            "Consecutive-failure cap reached; supervision halted. \
                             Manual intervention required."
                        );
                        return Ok(());
                    }
                }
            }
        }
    }

    /// Judge the bot's health. Read-only; never fails.
    fn evaluate(&self, state: &SupervisorState) -> Verdict {
        // Owned child first: an exact pid beats a keyword rescan.
        let running = match state.child_pid {
            Some(pid) if locator::is_alive(pid) => true,
            Some(pid) => {
                warn!(pid, "Launched bot process is gone");
                false
            }
            None => !locator::find_bot_processes(&self.config.process_keywords).is_empty(),
        };
        if !running {
            return Verdict::ProcessGone;
        }

        let (status, elapsed) = health::check_sentinel(&self.sentinel_path, &self.thresholds);
        match status {
            HealthStatus::Critical => {
                warn!(?elapsed, "Health sentinel is critical");
                return Verdict::SentinelStale;
            }
            HealthStatus::Warning => {
                warn!(?elapsed, "Health sentinel is getting stale");
            }
            HealthStatus::Healthy => {}
        }

        if let Some(pid) = state.child_pid {
            if let Some(pct) = locator::process_memory_percent(pid) {
                if pct > self.config.max_memory_percent {
                    warn!(pid, memory_percent = pct, "Bot is using too much memory");
                    return Verdict::MemoryExcess;
                }
            }
        }

        Verdict::Healthy
    }

    /// One recovery round: backoff bookkeeping, cleanup, session reset,
    /// relaunch. Every step is best-effort; errors are logged and the loop
    /// carries on (or halts via the cap, never via a panic or early return).
    async fn recover(&mut self, state: &mut SupervisorState) {
        let cooldown = Duration::from_secs(self.config.restart_cooldown_secs);
        let action = register_failure(
            state,
            Instant::now(),
            cooldown,
            self.config.max_consecutive_failures,
            &self.backoff,
        );
        let delay = match action {
            FailureAction::Halt => return,
            FailureAction::Retry { delay } => delay,
        };

        if delay > Duration::ZERO {
            info!(
                delay_secs = delay.as_secs(),
                failures = state.consecutive_failures,
                "Backing off before restart"
            );
            tokio::time::sleep(delay).await;
        }

        // Cleanup: everything that looks like a bot process goes away, not
        // just our own child — stray instances are what cause getUpdates
        // conflicts.
        let grace = Duration::from_secs(self.config.grace_timeout_secs);
        let mut targets = locator::find_bot_processes(&self.config.process_keywords);
        if let Some(pid) = state.child_pid.take() {
            if !targets.contains(&pid) {
                targets.push(pid);
            }
        }
        if !targets.is_empty() {
            info!(count = targets.len(), pids = ?targets, "Terminating bot processes");
            let gone = terminator::terminate_all(&targets, grace).await;
            if gone < targets.len() {
                warn!(
                    gone,
                    total = targets.len(),
                    "Some bot processes survived termination"
                );
            }
        }
        state.bot_state = BotState::Stopped;

        // Release the remote long-poll slot before starting a new consumer.
        if !self.api.reset_session().await {
            warn!("Session reset completed with errors (continuing anyway)");
        }

        state.bot_state = BotState::Starting;
        match self.launcher.launch().await {
            Ok(pid) => {
                state.child_pid = Some(pid);
                state.last_restart = Some(Instant::now());
                state.restarts += 1;
                state.bot_state = BotState::Running;
                if let Err(e) = self.lock.record_child(Some(pid)) {
                    warn!("Failed to record child pid in lock file: {}", e);
                }
                // fresh sentinel so the new process isn't judged by the old one
                if let Err(e) = health::write_sentinel(&self.sentinel_path) {
                    warn!("Failed to refresh sentinel after restart: {}", e);
                }
                info!(pid, restarts = state.restarts, "Bot restarted");
            }
            Err(e) => {
                error!("Failed to relaunch bot: {}", e);
                state.last_restart = Some(Instant::now());
                state.bot_state = BotState::Crashed;
            }
        }
    }
}
