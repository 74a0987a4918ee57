//! Pluggable retry backoff strategies.

use std::time::Duration;

/// Computes the wait before a retry attempt. `attempt` is 1-based: the delay
/// requested after the first failed try is `delay(1)`.
pub trait BackoffStrategy: Send + Sync {
    fn delay(&self, attempt: u32) -> Duration;
}

/// Linear backoff: `attempt * base`. No jitter, no cap.
#[derive(Debug, Clone)]
pub struct LinearBackoff {
    base: Duration,
}

impl LinearBackoff {
    pub fn new(base: Duration) -> Self {
        Self { base }
    }
}

impl Default for LinearBackoff {
    fn default() -> Self {
        Self::new(Duration::from_millis(1000))
    }
}

impl BackoffStrategy for LinearBackoff {
    fn delay(&self, attempt: u32) -> Duration {
        self.base * attempt
    }
}

/// Zero-delay strategy for tests and latency-sensitive callers.
#[derive(Debug, Clone, Default)]
pub struct NoBackoff;

impl BackoffStrategy for NoBackoff {
    fn delay(&self, _attempt: u32) -> Duration {
        Duration::ZERO
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn linear_backoff_scales_with_attempt() {
        let backoff = LinearBackoff::default();
        assert_eq!(backoff.delay(1), Duration::from_millis(1000));
        assert_eq!(backoff.delay(2), Duration::from_millis(2000));
        assert_eq!(backoff.delay(3), Duration::from_millis(3000));
    }

    #[test]
    fn no_backoff_is_always_zero() {
        assert_eq!(NoBackoff.delay(7), Duration::ZERO);
    }
}
