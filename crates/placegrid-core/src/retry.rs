use std::time::Duration;

/// Retry configuration with exponential backoff.
///
/// Delay schedule with the defaults: 1s, 2s, 4s, 8s, then give up after the
/// fifth failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total number of attempts, including the first one.
    pub max_attempts: u32,
    /// Delay after the first failure; doubles after every further failure.
    pub initial_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, initial_delay: Duration) -> Self {
        Self {
            max_attempts,
            initial_delay,
        }
    }

    /// Delay to wait after failed attempt `attempt` (1-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.initial_delay.saturating_mul(1 << exponent)
    }

    /// Begin tracking the attempts of one call.
    pub fn start(&self) -> Backoff {
        Backoff {
            max_attempts: self.max_attempts.max(1),
            attempt: 0,
            current_delay: self.initial_delay,
        }
    }
}

/// Attempt counter for a single retried call.
///
/// Independent of how the caller waits, so the schedule can be checked
/// without time passing.
#[derive(Debug, Clone)]
pub struct Backoff {
    max_attempts: u32,
    attempt: u32,
    current_delay: Duration,
}

impl Backoff {
    /// Number of attempts made so far.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Record that an attempt is about to be made.
    pub fn begin_attempt(&mut self) -> u32 {
        self.attempt += 1;
        self.attempt
    }

    /// Record a failure of the current attempt.
    ///
    /// Returns the delay before the next attempt, or `None` when the attempt
    /// budget is spent.
    pub fn on_failure(&mut self) -> Option<Duration> {
        if self.attempt >= self.max_attempts {
            return None;
        }
        let delay = self.current_delay;
        self.current_delay = self.current_delay.saturating_mul(2);
        Some(delay)
    }
}
