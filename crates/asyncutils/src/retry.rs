use std::fmt::Debug;
use std::time::Duration;

/// Reconnect pings attempted before a broken remote session is declared lost.
pub const RECONNECT_ATTEMPTS: u32 = 3;
/// Fixed pause between two reconnect pings.
pub const RECONNECT_DELAY: Duration = Duration::from_secs(5);
/// One initial attempt plus exactly one retry.
pub const DIRECTORY_DELETE_ATTEMPTS: u32 = 2;
/// Stubborn directories (open handles, antivirus, NFS silly-renames) usually
/// let go within a second.
pub const DIRECTORY_DELETE_DELAY: Duration = Duration::from_secs(1);

/// Bounded retry with a fixed delay between attempts.
///
/// There is deliberately no back-off, jitter or timeout: an operation is tried
/// `attempts` times in total, with `delay` between consecutive tries, and the
/// last error is returned if every attempt failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    attempts: u32,
    delay: Duration,
}

impl RetryPolicy {
    /// Policy for pinging a remote store after a connection broke mid-session.
    pub const RECONNECT: Self = Self::new(RECONNECT_ATTEMPTS, RECONNECT_DELAY);
    /// Policy for deleting a directory tree during commit or rollback.
    pub const DIRECTORY_DELETE: Self = Self::new(DIRECTORY_DELETE_ATTEMPTS, DIRECTORY_DELETE_DELAY);

    /// A policy that tries `attempts` times in total (at least once).
    pub const fn new(attempts: u32, delay: Duration) -> Self {
        let attempts = if attempts == 0 { 1 } else { attempts };
        Self { attempts, delay }
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Run `op` until it succeeds or the attempts are exhausted.
    ///
    /// The closure receives the 1-based attempt number. `what` is only used
    /// for logging.
    pub async fn run<T, E, F, Fut>(&self, what: &str, mut op: F) -> Result<T, E>
    where
        E: Debug,
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut attempt = 1;
        loop {
            match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(err) if attempt >= self.attempts => {
                    tracing::error!(what, attempt, error = ?err, "giving up");
                    return Err(err);
                },
                Err(err) => {
                    tracing::warn!(what, attempt, of = self.attempts, error = ?err, "attempt failed; retrying");
                    tokio::time::sleep(self.delay).await;
                    attempt += 1;
                },
            }
        }
    }

    /// Blocking twin of [`run`](Self::run), for code paths that cannot await
    /// (destructors).
    pub fn run_blocking<T, E, F>(&self, what: &str, mut op: F) -> Result<T, E>
    where
        E: Debug,
        F: FnMut(u32) -> Result<T, E>,
    {
        let mut attempt = 1;
        loop {
            match op(attempt) {
                Ok(value) => return Ok(value),
                Err(err) if attempt >= self.attempts => {
                    tracing::error!(what, attempt, error = ?err, "giving up");
                    return Err(err);
                },
                Err(err) => {
                    tracing::warn!(what, attempt, of = self.attempts, error = ?err, "attempt failed; retrying");
                    std::thread::sleep(self.delay);
                    attempt += 1;
                },
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    const INSTANT: Duration = Duration::ZERO;

    #[test]
    fn test_named_policies() {
        assert_eq!(RetryPolicy::RECONNECT.attempts(), 3);
        assert_eq!(RetryPolicy::RECONNECT.delay(), Duration::from_secs(5));
        // One retry after the initial attempt.
        assert_eq!(RetryPolicy::DIRECTORY_DELETE.attempts(), 2);
    }

    #[test]
    fn test_zero_attempts_still_tries_once() {
        assert_eq!(RetryPolicy::new(0, INSTANT).attempts(), 1);
    }

    #[rstest]
    #[case(3, 1, Ok(1))]
    #[case(3, 3, Ok(3))]
    #[case(3, 4, Err(3))]
    #[case(1, 2, Err(1))]
    #[tokio::test]
    async fn test_run_stops_at_first_success(
        #[case] attempts: u32,
        #[case] succeeds_on: u32,
        #[case] expected: Result<u32, u32>,
    ) {
        let policy = RetryPolicy::new(attempts, INSTANT);
        let result = policy
            .run("test", |attempt| async move { if attempt >= succeeds_on { Ok(attempt) } else { Err(attempt) } })
            .await;
        assert_eq!(result, expected);
    }

    #[test]
    fn test_run_blocking_counts_attempts() {
        let policy = RetryPolicy::new(2, INSTANT);
        let mut calls = 0;
        let result: Result<(), &str> = policy.run_blocking("test", |_| {
            calls += 1;
            Err("nope")
        });
        assert!(result.is_err());
        assert_eq!(calls, 2);
    }
}
