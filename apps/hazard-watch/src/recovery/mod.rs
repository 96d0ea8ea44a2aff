use std::time::Duration;

/// Fixed-delay retry policy shared by every recoverable failure path: stream
/// open, stream read, per-iteration worker errors and the registry load.
/// Retries never give up; only the stop signal ends them.
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    delay: Duration,
    attempt: u32,
    total_retries: u64,
}

impl ReconnectPolicy {
    pub fn fixed(delay: Duration) -> Self {
        Self {
            delay,
            attempt: 0,
            total_retries: 0,
        }
    }

    /// Record a failure and return how long to wait before the next try.
    pub fn next_delay(&mut self) -> Duration {
        self.attempt = self.attempt.saturating_add(1);
        self.total_retries += 1;
        self.delay
    }

    /// Consecutive failures since the last success
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn total_retries(&self) -> u64 {
        self.total_retries
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    pub fn reset(&mut self) {
        self.attempt = 0;
    }
}
