//! Retry policy

use std::time::Duration;

use tokio_util::sync::CancellationToken;

/// Delay inserted after a failed attempt
#[derive(Debug, Clone, PartialEq)]
pub enum Backoff {
    /// Same delay every time
    Fixed(Duration),
    /// `initial * factor^(attempt - 1)`, capped at `max`
    Exponential {
        initial: Duration,
        factor: f64,
        max: Duration,
    },
}

impl Backoff {
    /// Delay to wait after failed attempt number `attempt` (1-based)
    pub fn delay(&self, attempt: u32) -> Duration {
        match self {
            Backoff::Fixed(delay) => *delay,
            Backoff::Exponential {
                initial,
                factor,
                max,
            } => {
                let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
                let scaled = initial.as_nanos() as f64 * factor.powi(exponent);
                if !scaled.is_finite() || scaled >= max.as_nanos() as f64 {
                    *max
                } else {
                    Duration::from_nanos(scaled.max(0.0) as u64)
                }
            }
        }
    }
}

/// Bounds for one poll loop
///
/// With no `max_attempts`, `timeout` or `cancel`, polling goes on until the
/// condition is met.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub backoff: Backoff,
    pub max_attempts: Option<u32>,
    pub timeout: Option<Duration>,
    pub cancel: Option<CancellationToken>,
}

impl RetryPolicy {
    /// Fixed backoff, unbounded
    pub fn fixed(backoff: Duration) -> Self {
        Self {
            backoff: Backoff::Fixed(backoff),
            max_attempts: None,
            timeout: None,
            cancel: None,
        }
    }

    pub fn fixed_ms(backoff_ms: u64) -> Self {
        Self::fixed(Duration::from_millis(backoff_ms))
    }

    /// Exponential backoff, unbounded
    pub fn exponential(initial: Duration, factor: f64, max: Duration) -> Self {
        Self {
            backoff: Backoff::Exponential {
                initial,
                factor,
                max,
            },
            max_attempts: None,
            timeout: None,
            cancel: None,
        }
    }

    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = Some(attempts);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Stop polling when `token` is cancelled
    pub fn cancel_on(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::fixed_ms(100)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_backoff() {
        let backoff = Backoff::Fixed(Duration::from_millis(400));
        assert_eq!(backoff.delay(1), Duration::from_millis(400));
        assert_eq!(backoff.delay(9), Duration::from_millis(400));
    }

    #[test]
    fn test_exponential_backoff() {
        let policy = RetryPolicy::exponential(
            Duration::from_millis(100),
            2.0,
            Duration::from_secs(1),
        );
        assert_eq!(policy.backoff.delay(1), Duration::from_millis(100));
        assert_eq!(policy.backoff.delay(2), Duration::from_millis(200));
        assert_eq!(policy.backoff.delay(3), Duration::from_millis(400));
    }

    #[test]
    fn test_exponential_backoff_cap() {
        let backoff = Backoff::Exponential {
            initial: Duration::from_millis(100),
            factor: 2.0,
            max: Duration::from_secs(1),
        };
        assert_eq!(backoff.delay(10), Duration::from_secs(1));
        assert_eq!(backoff.delay(u32::MAX), Duration::from_secs(1));
    }

    #[test]
    fn test_builders() {
        let policy = RetryPolicy::fixed_ms(10).max_attempts(3).timeout(Duration::from_secs(2));
        assert_eq!(policy.max_attempts, Some(3));
        assert_eq!(policy.timeout, Some(Duration::from_secs(2)));
        assert!(policy.cancel.is_none());
    }
}
