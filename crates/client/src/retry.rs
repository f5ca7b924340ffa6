use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::ClientError;

/// Pause between two attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Backoff {
    #[default]
    None,
    Fixed(Duration),
}

/// How often a failing call is attempted.
///
/// The default makes a single attempt. With more attempts every error is
/// retried unless a predicate says otherwise, except [`ClientError::Cancelled`]
/// which always ends the loop.
#[derive(Clone)]
pub struct RetryPolicy {
    max_attempts: usize,
    backoff: Backoff,
    predicate: Arc<dyn Fn(&ClientError) -> bool + Send + Sync>,
}

impl RetryPolicy {
    pub fn once() -> Self {
        Self::attempts(1)
    }

    /// Counts below 2 mean a single attempt.
    pub fn attempts(max_attempts: usize) -> Self {
        Self { max_attempts: max_attempts.max(1), backoff: Backoff::None, predicate: Arc::new(|_| true) }
    }

    pub fn backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn retry_if<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&ClientError) -> bool + Send + Sync + 'static,
    {
        self.predicate = Arc::new(predicate);
        self
    }

    pub fn max_attempts(&self) -> usize {
        self.max_attempts
    }

    pub fn is_retrying(&self) -> bool {
        self.max_attempts > 1
    }

    pub fn should_retry(&self, error: &ClientError) -> bool {
        !matches!(error, ClientError::Cancelled | ClientError::NotReplayable) && (self.predicate)(error)
    }

    /// Runs `attempt` until it succeeds, the attempts are used up, or the
    /// error is not retryable. `attempt` returns `None` when it can't produce
    /// another try, the last error is returned then.
    pub(crate) async fn run<T, F, Fut>(&self, cancel: &CancellationToken, scope: &'static str, mut attempt: F) -> Result<T, ClientError>
    where
        F: FnMut(usize) -> Option<Fut>,
        Fut: Future<Output = Result<T, ClientError>>,
    {
        let mut last_error = None;

        for n in 0..self.max_attempts {
            if n > 0
                && let Backoff::Fixed(delay) = self.backoff
            {
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => return Err(ClientError::Cancelled),
                    () = tokio::time::sleep(delay) => {}
                }
            }

            let Some(future) = attempt(n) else {
                debug!(scope, attempt = n + 1, "request can't be replayed, stop retrying");
                break;
            };

            let result = tokio::select! {
                biased;
                () = cancel.cancelled() => Err(ClientError::Cancelled),
                result = future => result,
            };

            match result {
                Ok(value) => return Ok(value),
                Err(e) if n + 1 < self.max_attempts && self.should_retry(&e) => {
                    warn!(scope, attempt = n + 1, max_attempts = self.max_attempts, cause = %e, "attempt failed, retrying");
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        Err(last_error.unwrap_or(ClientError::NotReplayable))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::once()
    }
}

impl fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryPolicy").field("max_attempts", &self.max_attempts).field("backoff", &self.backoff).finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    async fn run_failing(policy: &RetryPolicy, succeed_at: usize) -> (Result<usize, ClientError>, usize) {
        let calls = AtomicUsize::new(0);
        let result = policy
            .run(&CancellationToken::new(), "test", |n| {
                calls.fetch_add(1, Ordering::SeqCst);
                Some(async move { if n + 1 >= succeed_at { Ok(n) } else { Err(ClientError::Status { code: 500 }) } })
            })
            .await;
        (result, calls.load(Ordering::SeqCst))
    }

    #[tokio::test]
    async fn retries_until_success() {
        let (result, calls) = run_failing(&RetryPolicy::attempts(3), 3).await;
        assert_eq!(result.unwrap(), 2);
        assert_eq!(calls, 3);
    }

    #[tokio::test]
    async fn returns_last_error_when_exhausted() {
        let (result, calls) = run_failing(&RetryPolicy::attempts(4), usize::MAX).await;
        assert!(matches!(result, Err(ClientError::Status { code: 500 })));
        assert_eq!(calls, 4);
    }

    #[tokio::test]
    async fn counts_below_two_mean_one_attempt() {
        for attempts in [0, 1] {
            let (result, calls) = run_failing(&RetryPolicy::attempts(attempts), 2).await;
            assert!(result.is_err());
            assert_eq!(calls, 1);
        }
    }

    #[tokio::test]
    async fn predicate_stops_retries() {
        let policy = RetryPolicy::attempts(5).retry_if(|e| !matches!(e, ClientError::Status { .. }));
        let (result, calls) = run_failing(&policy, usize::MAX).await;
        assert!(result.is_err());
        assert_eq!(calls, 1);
    }

    #[tokio::test]
    async fn exhausted_replays_return_last_error() {
        let result: Result<(), _> = RetryPolicy::attempts(3)
            .run(&CancellationToken::new(), "test", |n| (n == 0).then_some(async { Err(ClientError::Timeout) }))
            .await;
        assert!(matches!(result, Err(ClientError::Timeout)));
    }

    #[tokio::test]
    async fn cancel_during_backoff_stops_loop() {
        let cancel = CancellationToken::new();
        let calls = AtomicUsize::new(0);
        let policy = RetryPolicy::attempts(3).backoff(Backoff::Fixed(Duration::from_secs(60)));

        let canceller = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            canceller.cancel();
        });

        let result: Result<(), _> = policy
            .run(&cancel, "test", |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                Some(async { Err(ClientError::Timeout) })
            })
            .await;
        assert!(matches!(result, Err(ClientError::Cancelled)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn cancelled_before_start() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result: Result<(), _> = RetryPolicy::attempts(3).run(&cancel, "test", |_| Some(std::future::pending())).await;
        assert!(result.unwrap_err().is_cancelled());
    }
}
