//! Health sentinel: a single-line timestamp file written by whoever believes
//! the bot is alive, and a checker that classifies its staleness.
//!
//! The sentinel is deliberately dumb shared state — last writer wins, and the
//! staleness thresholds tolerate the races that result. The checker treats a
//! missing or unparseable sentinel as failure, never as success.

use std::path::Path;
use std::time::Duration;

use chrono::{Local, NaiveDateTime, TimeZone};
use tracing::{debug, error, info};

use crate::config::HealthConfig;

/// Timestamp format shared with the legacy sentinel files: local time,
/// `YYYY-MM-DD HH:MM:SS`, nothing else on the line.
pub const SENTINEL_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Sentinel timestamps this far in the future are treated as corrupt rather
/// than fresh (clock jumped backwards, or someone hand-edited the file).
const FORWARD_SKEW_TOLERANCE_SECS: i64 = 300;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthStatus {
    Healthy,
    Warning,
    Critical,
}

impl HealthStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            HealthStatus::Healthy => "healthy",
            HealthStatus::Warning => "warning",
            HealthStatus::Critical => "critical",
        }
    }

    /// Exit code for the `check-health` subcommand.
    pub fn exit_code(&self) -> i32 {
        match self {
            HealthStatus::Healthy => 0,
            HealthStatus::Warning => 1,
            HealthStatus::Critical => 2,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct HealthThresholds {
    pub warn_secs: i64,
    pub critical_secs: i64,
}

impl HealthThresholds {
    pub fn from_config(config: &HealthConfig) -> Self {
        Self {
            warn_secs: config.warn_threshold_secs,
            critical_secs: config.critical_threshold_secs,
        }
    }
}

impl Default for HealthThresholds {
    fn default() -> Self {
        Self {
            warn_secs: 60,
            critical_secs: 300,
        }
    }
}

/// Overwrite the sentinel with the current local time.
pub fn write_sentinel(path: &Path) -> anyhow::Result<()> {
    let stamp = Local::now().format(SENTINEL_FORMAT).to_string();
    std::fs::write(path, stamp)?;
    Ok(())
}

/// Classify an elapsed-seconds value against the thresholds.
///
/// The critical boundary is inclusive: exactly `critical_secs` of silence is
/// already critical, not a warning.
pub fn classify_elapsed(elapsed_secs: i64, thresholds: &HealthThresholds) -> HealthStatus {
    if elapsed_secs < -FORWARD_SKEW_TOLERANCE_SECS {
        // Sentinel claims to be from the future — not trustworthy.
        return HealthStatus::Critical;
    }
    if elapsed_secs >= thresholds.critical_secs {
        HealthStatus::Critical
    } else if elapsed_secs >= thresholds.warn_secs {
        HealthStatus::Warning
    } else {
        HealthStatus::Healthy
    }
}

/// Read the sentinel and report how stale it is.
///
/// Returns the status plus the elapsed seconds when the file was readable.
/// Missing file, unreadable file, and unparseable contents are all Critical.
pub fn check_sentinel(path: &Path, thresholds: &HealthThresholds) -> (HealthStatus, Option<i64>) {
    let raw = match std::fs::read_to_string(path) {
        Ok(s) => s,
        Err(e) => {
            debug!(path = %path.display(), "Sentinel not readable: {}", e);
            return (HealthStatus::Critical, None);
        }
    };

    let parsed = match NaiveDateTime::parse_from_str(raw.trim(), SENTINEL_FORMAT) {
        Ok(dt) => dt,
        Err(e) => {
            debug!(path = %path.display(), contents = %raw.trim(), "Sentinel corrupt: {}", e);
            return (HealthStatus::Critical, None);
        }
    };

    // Ambiguous local times (DST transitions) resolve to the earlier
    // instant; a nonexistent local time is treated as corrupt.
    let Some(written_at) = Local.from_local_datetime(&parsed).earliest() else {
        return (HealthStatus::Critical, None);
    };

    let elapsed = (Local::now() - written_at).num_seconds();
    (classify_elapsed(elapsed, thresholds), Some(elapsed))
}

/// Background task that refreshes the sentinel on a fixed period.
pub struct HealthReporter {
    path: std::path::PathBuf,
    interval: Duration,
}

impl HealthReporter {
    pub fn new(path: impl Into<std::path::PathBuf>, interval: Duration) -> Self {
        Self {
            path: path.into(),
            interval,
        }
    }

    /// Spawn the refresh loop. Writes once immediately so a freshly started
    /// supervisor is never judged by a stale file from a previous run.
    pub fn spawn(self) {
        tokio::spawn(async move {
            info!(
                path = %self.path.display(),
                interval_secs = self.interval.as_secs(),
                "Health reporter started"
            );
            loop {
                if let Err(e) = write_sentinel(&self.path) {
                    error!(path = %self.path.display(), "Failed to write sentinel: {}", e);
                }
                tokio::time::sleep(self.interval).await;
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t() -> HealthThresholds {
        HealthThresholds::default()
    }

    #[test]
    fn classify_boundaries() {
        assert_eq!(classify_elapsed(0, &t()), HealthStatus::Healthy);
        assert_eq!(classify_elapsed(59, &t()), HealthStatus::Healthy);
        assert_eq!(classify_elapsed(60, &t()), HealthStatus::Warning);
        assert_eq!(classify_elapsed(299, &t()), HealthStatus::Warning);
        // t == 300 must be critical, not warning
        assert_eq!(classify_elapsed(300, &t()), HealthStatus::Critical);
        assert_eq!(classify_elapsed(10_000, &t()), HealthStatus::Critical);
    }

    #[test]
    fn small_forward_skew_is_healthy_but_large_is_critical() {
        assert_eq!(classify_elapsed(-5, &t()), HealthStatus::Healthy);
        assert_eq!(classify_elapsed(-301, &t()), HealthStatus::Critical);
    }

    #[test]
    fn missing_sentinel_is_critical() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nope.txt");
        let (status, elapsed) = check_sentinel(&path, &t());
        assert_eq!(status, HealthStatus::Critical);
        assert!(elapsed.is_none());
    }

    #[test]
    fn corrupt_sentinel_is_critical() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("health.txt");
        std::fs::write(&path, "not a timestamp").unwrap();
        let (status, _) = check_sentinel(&path, &t());
        assert_eq!(status, HealthStatus::Critical);

        std::fs::write(&path, "").unwrap();
        let (status, _) = check_sentinel(&path, &t());
        assert_eq!(status, HealthStatus::Critical);
    }

    #[test]
    fn fresh_sentinel_round_trips_healthy() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("health.txt");
        write_sentinel(&path).unwrap();
        let (status, elapsed) = check_sentinel(&path, &t());
        assert_eq!(status, HealthStatus::Healthy);
        assert!(elapsed.unwrap() < 5);
    }

    #[test]
    fn stale_sentinel_is_classified_by_age() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("health.txt");

        let two_minutes_ago = Local::now() - chrono::Duration::seconds(120);
        std::fs::write(&path, two_minutes_ago.format(SENTINEL_FORMAT).to_string()).unwrap();
        let (status, elapsed) = check_sentinel(&path, &t());
        assert_eq!(status, HealthStatus::Warning);
        let elapsed = elapsed.unwrap();
        assert!((118..=125).contains(&elapsed), "elapsed={}", elapsed);

        let ten_minutes_ago = Local::now() - chrono::Duration::seconds(600);
        std::fs::write(&path, ten_minutes_ago.format(SENTINEL_FORMAT).to_string()).unwrap();
        let (status, _) = check_sentinel(&path, &t());
        assert_eq!(status, HealthStatus::Critical);
    }

    mod proptest_classify {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            // Staleness never improves the verdict: if a is older than b,
            // a's status is at least as severe as b's.
            #[test]
            fn monotone_in_elapsed(a in 0i64..100_000, b in 0i64..100_000) {
                let (older, newer) = if a >= b { (a, b) } else { (b, a) };
                let rank = |s: HealthStatus| match s {
                    HealthStatus::Healthy => 0,
                    HealthStatus::Warning => 1,
                    HealthStatus::Critical => 2,
                };
                prop_assert!(rank(classify_elapsed(older, &t())) >= rank(classify_elapsed(newer, &t())));
            }

            #[test]
            fn total_over_all_inputs(e in i64::MIN..i64::MAX) {
                // must classify without panicking, whatever the clock did
                let _ = classify_elapsed(e, &t());
            }
        }
    }
}
