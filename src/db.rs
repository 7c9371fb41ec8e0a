use crate::errors::JobError;
use failsafe::backoff;
use std::future::Future;
use std::time::Duration;

/// Longest wait between two connection attempts.
pub const MAX_BACKOFF: Duration = Duration::from_secs(60);

/// Bounded exponential backoff for establishing the store connection.
///
/// # Configuration
///
/// - **Attempts**: `max_attempts` connection attempts in total, including the first.
/// - **Backoff**: starts at `initial_delay` and doubles after each failed attempt,
///   capped at [`MAX_BACKOFF`]. Delays are whole seconds; an `initial_delay`
///   under one second retries immediately.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total connection attempts, including the first.
    pub max_attempts: u32,
    /// Wait after the first failed attempt.
    pub initial_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    /// Creates the sequence of waits between attempts.
    ///
    /// # Returns
    ///
    /// * `Box<dyn Iterator<Item = Duration> + Send>` - One delay per retry, so
    ///   `max_attempts - 1` items. Nothing is yielded after the last attempt.
    pub fn backoff(&self) -> Box<dyn Iterator<Item = Duration> + Send> {
        let retries = self.max_attempts.saturating_sub(1) as usize;
        if self.initial_delay.as_secs() == 0 {
            return Box::new(std::iter::repeat(Duration::ZERO).take(retries));
        }
        let max = MAX_BACKOFF.max(self.initial_delay);
        Box::new(backoff::exponential(self.initial_delay, max).take(retries))
    }
}

/// Runs `connect` until it succeeds or the policy's attempts are used up.
///
/// Waits between attempts follow [`RetryPolicy::backoff`]. Every failure is
/// logged with its attempt number.
///
/// # Arguments
///
/// * `policy` - Attempt budget and backoff schedule.
/// * `connect` - Produces a fresh connection attempt each time it is called.
///
/// # Returns
///
/// * `Result<T, JobError>` - The first successful connection, or
///   `JobError::ConnectionFailed` carrying the attempt count and the last error.
pub async fn connect_with_retry<T, F, Fut>(policy: &RetryPolicy, mut connect: F) -> Result<T, JobError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, JobError>>,
{
    let attempts = policy.max_attempts.max(1);
    let mut delays = policy.backoff();
    let mut last_error = String::new();

    for attempt in 1..=attempts {
        match connect().await {
            Ok(conn) => {
                tracing::info!("Database connection established");
                return Ok(conn);
            }
            Err(e) => {
                tracing::error!("Database connection attempt {} failed: {}", attempt, e);
                last_error = e.to_string();
                if let Some(delay) = delays.next() {
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    Err(JobError::ConnectionFailed {
        attempts,
        last_error,
    })
}
