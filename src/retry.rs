//! Bounded retry with exponential back-off for signaling sends.

use std::time::Duration;

use serde::Deserialize;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::{
    config::millis,
    port::{PortError, SignalingPort},
};

/// Retry policy applied to continuous-state and action sends.
///
/// The first attempt is immediate; each retry waits `initial_delay` doubled
/// per previous retry, capped at `max_delay`.
///
/// # Default Values
/// - `max_attempts`: 3 (one send plus two retries)
/// - `initial_delay`: 100 milliseconds
/// - `max_delay`: 2 seconds
///
/// # Invariants
/// - `max_attempts` is at least 1
/// - `initial_delay` must not exceed `max_delay`
/// - `initial_delay` must be at least 1 millisecond
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RetryPolicy {
    /// Total attempts, including the first send.
    pub max_attempts: u32,
    /// Delay before the first retry.
    #[serde(with = "millis")]
    pub initial_delay: Duration,
    /// Ceiling for the exponential delay.
    #[serde(with = "millis")]
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    /// Clamp values to sane bounds and ensure `initial_delay <= max_delay`.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::time::Duration;
    ///
    /// use tandem::retry::RetryPolicy;
    ///
    /// let policy = RetryPolicy {
    ///     max_attempts: 0,
    ///     initial_delay: Duration::from_millis(5),
    ///     max_delay: Duration::from_millis(1),
    /// }
    /// .normalized();
    ///
    /// assert_eq!(policy.max_attempts, 1);
    /// assert_eq!(policy.initial_delay, Duration::from_millis(1));
    /// assert_eq!(policy.max_delay, Duration::from_millis(5));
    /// ```
    #[must_use]
    pub fn normalized(mut self) -> Self {
        self.max_attempts = self.max_attempts.max(1);
        self.initial_delay = self.initial_delay.max(Duration::from_millis(1));
        self.max_delay = self.max_delay.max(Duration::from_millis(1));
        if self.initial_delay > self.max_delay {
            std::mem::swap(&mut self.initial_delay, &mut self.max_delay);
        }
        self
    }

    /// Delay to wait before retry number `retry` (1-based).
    #[must_use]
    pub fn delay_for(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(31);
        self.initial_delay
            .saturating_mul(1_u32 << exponent)
            .min(self.max_delay)
    }
}

/// Outcome of a send that never succeeded.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetryExhausted {
    /// Attempts made before giving up.
    pub attempts: u32,
    /// Error from the final attempt.
    pub last_error: PortError,
}

/// Send `payload`, retrying transient failures according to `policy`.
///
/// Returns the number of attempts used. Non-retryable errors (see
/// [`PortError::is_retryable`]) end the loop immediately.
///
/// # Errors
///
/// Returns [`RetryExhausted`] when every permitted attempt failed.
pub async fn send_with_retry(
    port: &dyn SignalingPort,
    policy: &RetryPolicy,
    message_type: &str,
    payload: &str,
) -> Result<u32, RetryExhausted> {
    let mut attempt = 1;
    loop {
        match port.send(message_type, payload.to_owned()).await {
            Ok(()) => return Ok(attempt),
            Err(err) if err.is_retryable() && attempt < policy.max_attempts => {
                let delay = policy.delay_for(attempt);
                debug!(message_type, attempt, ?delay, error = %err, "send failed; backing off");
                sleep(delay).await;
                attempt += 1;
            }
            Err(err) => {
                warn!(message_type, attempt, error = %err, "send failed; giving up");
                return Err(RetryExhausted {
                    attempts: attempt,
                    last_error: err,
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        Arc,
        atomic::{AtomicU32, Ordering},
    };

    use rstest::rstest;
    use tokio::time::Instant;
    use tracing_test::traced_test;

    use super::*;
    use crate::port::MockSignalingPort;

    #[rstest]
    #[case(1, 100)]
    #[case(2, 200)]
    #[case(3, 400)]
    #[case(6, 2_000)]
    #[case(40, 2_000)]
    fn delays_double_until_capped(#[case] retry: u32, #[case] expected_ms: u64) {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(retry), Duration::from_millis(expected_ms));
    }

    fn flaky_port(failures: u32) -> (MockSignalingPort, Arc<AtomicU32>) {
        let calls = Arc::new(AtomicU32::new(0));
        let mut port = MockSignalingPort::new();
        let counter = Arc::clone(&calls);
        port.expect_send().returning(move |_, _| {
            let call = counter.fetch_add(1, Ordering::SeqCst);
            if call < failures {
                Err(PortError::Rejected("busy".into()))
            } else {
                Ok(())
            }
        });
        (port, calls)
    }

    #[tokio::test(start_paused = true)]
    async fn retries_transient_failures_with_backoff() {
        let (port, calls) = flaky_port(2);
        let started = Instant::now();

        let attempts = send_with_retry(&port, &RetryPolicy::default(), "scroll-sync", "{}")
            .await
            .expect("third attempt succeeds");

        assert_eq!(attempts, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(started.elapsed(), Duration::from_millis(300));
    }

    #[tokio::test(start_paused = true)]
    async fn exhausts_after_max_attempts() {
        let (port, calls) = flaky_port(u32::MAX);

        let err = send_with_retry(&port, &RetryPolicy::default(), "scroll-sync", "{}")
            .await
            .expect_err("all attempts fail");

        assert_eq!(err.attempts, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(err.last_error, PortError::Rejected("busy".into()));
    }

    #[tokio::test(start_paused = true)]
    async fn non_retryable_errors_stop_immediately() {
        let mut port = MockSignalingPort::new();
        port.expect_send()
            .times(1)
            .returning(|_, _| Err(PortError::Closed));

        let err = send_with_retry(&port, &RetryPolicy::default(), "tab-changed", "{}")
            .await
            .expect_err("closed port fails");
        assert_eq!(err.attempts, 1);
    }

    #[traced_test]
    #[tokio::test(start_paused = true)]
    async fn giving_up_is_logged_with_the_attempt_count() {
        let (port, _) = flaky_port(u32::MAX);

        let _ = send_with_retry(&port, &RetryPolicy::default(), "scroll-sync", "{}").await;

        assert!(logs_contain("send failed; backing off"));
        assert!(logs_contain("send failed; giving up"));
        assert!(logs_contain("attempt=3"));
    }
}
