//! The poll loop

use std::future::Future;

use tokio::time::{sleep, sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::error::RetryError;
use crate::policy::RetryPolicy;

/// A failed attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Failure<E> {
    /// Not met yet; try again after the backoff
    Pending(E),
    /// Will never be met; stop now
    Fatal(E),
}

impl<E> From<E> for Failure<E> {
    fn from(error: E) -> Self {
        Failure::Pending(error)
    }
}

/// Invoke `operation` until it succeeds or a bound in `policy` is hit
///
/// The backoff is slept after each failed attempt, before the next one. An
/// attempt still running when the timeout elapses is dropped.
///
/// # Examples
/// ```
/// use buildrig_poll::{retry, Failure, RetryPolicy};
///
/// # #[tokio::main]
/// # async fn main() {
/// let mut calls = 0;
/// let value = retry(&RetryPolicy::fixed_ms(10), || {
///     calls += 1;
///     let ready = calls == 3;
///     async move {
///         if ready { Ok(calls) } else { Err(Failure::Pending("not yet")) }
///     }
/// })
/// .await
/// .unwrap();
/// assert_eq!(value, 3);
/// # }
/// ```
pub async fn retry<T, E, F, Fut>(policy: &RetryPolicy, mut operation: F) -> Result<T, RetryError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, Failure<E>>>,
{
    let policy = policy.clone();
    let deadline = policy.timeout.map(|timeout| Instant::now() + timeout);
    let cancel = policy.cancel.as_ref();
    let mut attempts = 0u32;
    let mut last: Option<E> = None;

    loop {
        if cancel.is_some_and(CancellationToken::is_cancelled) {
            return Err(RetryError::Cancelled { attempts, last });
        }

        attempts += 1;
        let outcome = tokio::select! {
            biased;
            _ = cancelled(cancel) => return Err(RetryError::Cancelled { attempts, last }),
            _ = until(deadline) => return Err(RetryError::TimedOut { attempts, last }),
            outcome = operation() => outcome,
        };

        let error = match outcome {
            Ok(value) => {
                debug!(attempts, "Condition met");
                return Ok(value);
            }
            Err(Failure::Fatal(source)) => {
                debug!(attempts, "Condition can never be met");
                return Err(RetryError::Aborted { attempts, source });
            }
            Err(Failure::Pending(error)) => error,
        };

        if policy.max_attempts.is_some_and(|max| attempts >= max) {
            debug!(attempts, "Attempts exhausted");
            return Err(RetryError::Exhausted {
                attempts,
                last: error,
            });
        }
        last = Some(error);

        let mut delay = policy.backoff.delay(attempts);
        if let Some(deadline) = deadline {
            let now = Instant::now();
            if now >= deadline {
                return Err(RetryError::TimedOut { attempts, last });
            }
            delay = delay.min(deadline - now);
        }
        trace!(attempts, delay_ms = delay.as_millis() as u64, "Condition not met, backing off");

        tokio::select! {
            biased;
            _ = cancelled(cancel) => return Err(RetryError::Cancelled { attempts, last }),
            _ = sleep(delay) => {}
        }
    }
}

/// [`retry`] for operations whose every error means "not yet"
pub async fn retry_until<T, E, F, Fut>(policy: &RetryPolicy, mut operation: F) -> Result<T, RetryError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    retry(policy, || {
        let attempt = operation();
        async move { attempt.await.map_err(Failure::Pending) }
    })
    .await
}

async fn cancelled(token: Option<&CancellationToken>) {
    match token {
        Some(token) => token.cancelled().await,
        None => std::future::pending().await,
    }
}

async fn until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn test_succeeds_on_third_attempt_after_two_backoffs() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let started = std::time::Instant::now();

        let value = retry_until(&RetryPolicy::fixed_ms(400), move || async move {
            let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
            if n == 3 {
                Ok(n)
            } else {
                Err(format!("attempt {}", n))
            }
        })
        .await
        .unwrap();

        let elapsed = started.elapsed();
        assert_eq!(value, 3);
        assert!(elapsed >= Duration::from_millis(800), "elapsed {:?}", elapsed);
        assert!(elapsed < Duration::from_secs(5), "elapsed {:?}", elapsed);
    }

    #[tokio::test]
    async fn test_single_attempt_reports_its_failure() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let err = retry_until(&RetryPolicy::fixed_ms(10).max_attempts(1), move || async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Err::<(), _>("Log was not created")
        })
        .await
        .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(err.attempts(), 1);
        assert!(matches!(err, RetryError::Exhausted { last: "Log was not created", .. }));
    }

    #[tokio::test]
    async fn test_fatal_failure_stops_immediately() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let err = retry(&RetryPolicy::fixed_ms(10), move || async move {
            let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
            if n < 2 {
                Err::<(), _>(Failure::Pending("starting"))
            } else {
                Err(Failure::Fatal("process exited"))
            }
        })
        .await
        .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(err.into_last(), Some("process exited"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_keeps_last_failure() {
        let err = retry_until(
            &RetryPolicy::fixed_ms(100).timeout(Duration::from_millis(350)),
            || async { Err::<(), _>("Did not meet hello") },
        )
        .await
        .unwrap_err();

        assert!(matches!(err, RetryError::TimedOut { .. }));
        assert_eq!(err.last_error(), Some(&"Did not meet hello"));
        assert!(err.attempts() >= 4);
        assert!(err.to_string().contains("Did not meet hello"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_cuts_slow_attempt() {
        let err = retry_until(
            &RetryPolicy::fixed_ms(100).timeout(Duration::from_millis(50)),
            || async {
                sleep(Duration::from_secs(10)).await;
                Ok::<_, &str>(())
            },
        )
        .await
        .unwrap_err();

        assert!(matches!(err, RetryError::TimedOut { attempts: 1, last: None }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_token() {
        let token = CancellationToken::new();
        let trigger = token.clone();
        tokio::spawn(async move {
            sleep(Duration::from_millis(250)).await;
            trigger.cancel();
        });

        let err = retry_until(&RetryPolicy::fixed_ms(100).cancel_on(token), || async {
            Err::<(), _>("server not up")
        })
        .await
        .unwrap_err();

        assert!(matches!(err, RetryError::Cancelled { .. }));
        assert_eq!(err.last_error(), Some(&"server not up"));
    }

    #[tokio::test]
    async fn test_concurrent_polls_are_independent() {
        let shared = Arc::new(AtomicU32::new(0));
        let policy = RetryPolicy::fixed_ms(5).max_attempts(3);

        let a = {
            let shared = shared.clone();
            let policy = policy.clone();
            tokio::spawn(async move {
                retry_until(&policy, || {
                    shared.fetch_add(1, Ordering::SeqCst);
                    async { Err::<(), _>("a") }
                })
                .await
            })
        };
        let b = tokio::spawn(async move {
            retry_until(&policy, || async { Ok::<_, &str>("b") }).await
        });

        assert_eq!(a.await.unwrap().unwrap_err().attempts(), 3);
        assert_eq!(b.await.unwrap().unwrap(), "b");
        assert_eq!(shared.load(Ordering::SeqCst), 3);
    }
}
