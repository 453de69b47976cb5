//! Retry policy for handing events to the bus.

use std::time::Duration;

use tracing::warn;

use instructor_events::{CourseEvent, EventPublisher, PublishError};

/// Backoff strategy between attempts.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum BackoffStrategy {
    /// Same delay every time.
    Fixed,
    /// Delay doubles each attempt, capped at `max_delay`.
    Exponential,
}

/// How many times, and how patiently, a publish is attempted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one (always at least 1).
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub base_delay: Duration,
    /// Upper bound for any single delay.
    pub max_delay: Duration,
    pub strategy: BackoffStrategy,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(5),
            strategy: BackoffStrategy::Exponential,
        }
    }
}

impl RetryPolicy {
    /// A single attempt, no retries.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Default::default()
        }
    }

    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay: delay,
            max_delay: delay,
            strategy: BackoffStrategy::Fixed,
        }
    }

    pub fn exponential(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay,
            strategy: BackoffStrategy::Exponential,
        }
    }

    /// Delay to wait after the given failed attempt (1-indexed).
    pub fn delay_after_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        let delay = match self.strategy {
            BackoffStrategy::Fixed => self.base_delay,
            BackoffStrategy::Exponential => {
                let factor = 2u32.saturating_pow(attempt - 1);
                self.base_delay.saturating_mul(factor)
            }
        };

        delay.min(self.max_delay)
    }

    /// Whether another attempt is allowed after `attempts` have been made.
    pub fn should_retry(&self, attempts: u32) -> bool {
        attempts < self.max_attempts
    }
}

/// Publish `event`, retrying transport failures per `policy`.
///
/// Returns the number of attempts it took. Non-retryable errors and the last
/// transport error are returned as-is.
pub async fn publish_with_retry<P>(
    publisher: &P,
    event: CourseEvent,
    policy: &RetryPolicy,
) -> Result<u32, PublishError>
where
    P: EventPublisher + ?Sized,
{
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        match publisher.publish(event.clone()).await {
            Ok(()) => return Ok(attempt),
            Err(err) if err.is_retryable() && policy.should_retry(attempt) => {
                let delay = policy.delay_after_attempt(attempt);
                warn!(
                    event_id = %event.event_id(),
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "publish failed, retrying"
                );
                tokio::time::sleep(delay).await;
            }
            Err(err) => return Err(err),
        }
    }
}
