use std::time::Duration;

/// Restart backoff shared by every supervision path.
///
/// The wait scales linearly with the consecutive-failure count and is capped;
/// the legacy scripts each re-implemented a variant of this with fixed
/// sleeps. Failure count 0 means "first attempt" and waits nothing.
#[derive(Debug, Clone, Copy)]
pub struct Backoff {
    base: Duration,
    cap: Duration,
}

impl Backoff {
    pub fn new(base: Duration, cap: Duration) -> Self {
        Self { base, cap }
    }

    pub fn delay(&self, consecutive_failures: u32) -> Duration {
        if consecutive_failures == 0 {
            return Duration::ZERO;
        }
        let scaled = self.base.saturating_mul(consecutive_failures);
        scaled.min(self.cap)
    }
}
