use std::time::Duration;

/// Bounded periodic retry for "join the network once the host has published it".
///
/// Time always accumulates; an attempt fires only while armed, once more than `interval` has
/// passed since the previous one.
#[derive(Debug, Clone)]
pub struct JoinRetry {
    elapsed: Duration,
    interval: Duration,
    max_attempts: u32,
    remaining: u32,
    target: Option<String>,
}

impl JoinRetry {
    pub fn new(interval: Duration, max_attempts: u32) -> Self {
        Self {
            elapsed: Duration::ZERO,
            interval,
            max_attempts,
            remaining: 0,
            target: None,
        }
    }

    /// Starts retrying for `target`, restoring the full attempt budget.
    pub fn arm(&mut self, target: impl Into<String>) {
        self.remaining = self.max_attempts;
        self.target = Some(target.into());
    }

    pub fn stop(&mut self) {
        self.remaining = 0;
    }

    pub fn is_armed(&self) -> bool {
        self.remaining > 0
    }

    pub fn remaining(&self) -> u32 {
        self.remaining
    }

    pub fn target(&self) -> Option<&str> {
        self.target.as_deref()
    }

    /// Advances the timer. Returns true when an attempt is due; the attempt is counted.
    pub fn tick(&mut self, delta: Duration) -> bool {
        self.elapsed += delta;
        if self.remaining == 0 || self.elapsed <= self.interval {
            return false;
        }
        self.elapsed = Duration::ZERO;
        self.remaining -= 1;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECOND: Duration = Duration::from_secs(1);

    #[test]
    fn idle_until_armed() {
        let mut retry = JoinRetry::new(2 * SECOND, 3);
        assert!(!retry.tick(5 * SECOND));
        retry.arm("Game");
        // time spent idle still counts
        assert!(retry.tick(Duration::ZERO));
        assert_eq!(retry.remaining(), 2);
        assert_eq!(retry.target(), Some("Game"));
    }

    #[test]
    fn fires_after_interval_until_budget_spent() {
        let mut retry = JoinRetry::new(2 * SECOND, 2);
        retry.arm("Game");

        assert!(!retry.tick(SECOND));
        assert!(!retry.tick(SECOND));
        assert!(retry.tick(SECOND));
        assert!(!retry.tick(SECOND));
        assert!(retry.tick(2 * SECOND));
        assert!(!retry.is_armed());
        assert!(!retry.tick(10 * SECOND));
    }

    #[test]
    fn stop_disarms() {
        let mut retry = JoinRetry::new(SECOND, 5);
        retry.arm("Game");
        retry.stop();
        assert!(!retry.tick(3 * SECOND));
        assert_eq!(retry.remaining(), 0);
    }
}
