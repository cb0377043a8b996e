//! Quota-aware retry with exponential backoff.
//!
//! Only quota-class errors are retried; anything else fails the attempt on
//! the spot. Every wait and attempt is raced against the caller's
//! cancellation token.

use crate::{Error, Result};
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tokio_retry::RetryIf;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub max_retries: usize,
    pub initial_delay: Duration,
    pub backoff_multiplier: f64,
    /// Upper bound of the random fraction added on top of each delay.
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 4,
            initial_delay: Duration::from_millis(2000),
            backoff_multiplier: 1.5,
            jitter: 0.1,
        }
    }
}

impl RetryPolicy {
    /// Short per-tier budget for cascades: one retry after a fixed second.
    pub const fn cascade() -> Self {
        Self {
            max_retries: 1,
            initial_delay: Duration::from_millis(1000),
            backoff_multiplier: 1.5,
            jitter: 0.0,
        }
    }

    pub fn without_jitter(mut self) -> Self {
        self.jitter = 0.0;
        self
    }

    pub fn delays(&self) -> Backoff {
        Backoff {
            next: self.initial_delay,
            multiplier: self.backoff_multiplier.max(1.0),
            jitter: self.jitter.max(0.0),
            remaining: self.max_retries,
        }
    }
}

/// Delay schedule for one top-level call.
///
/// Jitter is added on top and carried into the next step, so every delay is
/// at least the previous one times the multiplier.
#[derive(Debug, Clone)]
pub struct Backoff {
    next: Duration,
    multiplier: f64,
    jitter: f64,
    remaining: usize,
}

impl Iterator for Backoff {
    type Item = Duration;

    fn next(&mut self) -> Option<Duration> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;

        let delay = if self.jitter > 0.0 {
            let extra = rand::thread_rng().gen_range(0.0..self.jitter);
            self.next.mul_f64(1.0 + extra)
        } else {
            self.next
        };
        self.next = delay.mul_f64(self.multiplier);
        Some(delay)
    }
}

/// Runs `action`, retrying quota-class failures according to `policy`.
///
/// Retry state lives entirely in this call; concurrent callers never share it.
pub async fn with_quota_retry<T, A, Fut>(
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    action: A,
) -> Result<T>
where
    A: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let strategy = policy.delays().inspect(|delay| {
        warn!(
            "Quota protection: waiting {}ms before retrying",
            delay.as_millis()
        );
    });

    let retry = RetryIf::start(strategy, action, |err: &Error| {
        let retryable = err.is_quota();
        if !retryable {
            debug!("Not retrying non-quota error: {}", err);
        }
        retryable
    });

    cancellable(cancel, retry).await
}

/// Awaits `future` unless the token fires first.
pub async fn cancellable<T, F>(cancel: &CancellationToken, future: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(Error::Cancelled),
        result = future => result,
    }
}

/// Cancellable sleep used between polls.
pub async fn sleep(cancel: &CancellationToken, duration: Duration) -> Result<()> {
    cancellable(cancel, async {
        tokio::time::sleep(duration).await;
        Ok(())
    })
    .await
}

/// Result of running one model tier under its retry budget.
#[derive(Debug)]
pub enum TierOutcome<T> {
    Success(T),
    /// Retries ran out on quota errors; a lower tier may still answer.
    Exhausted(Error),
    /// A non-quota failure.
    Failed(Error),
    Cancelled,
}

impl<T> TierOutcome<T> {
    pub fn from_result(result: Result<T>) -> Self {
        match result {
            Ok(value) => TierOutcome::Success(value),
            Err(Error::Cancelled) => TierOutcome::Cancelled,
            Err(err) if err.is_quota() => TierOutcome::Exhausted(err),
            Err(err) => TierOutcome::Failed(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio::time::Instant;

    fn fast_policy() -> RetryPolicy {
        RetryPolicy::default().without_jitter()
    }

    #[test]
    fn test_backoff_schedule_without_jitter() {
        let delays: Vec<u128> = fast_policy().delays().map(|d| d.as_millis()).collect();
        assert_eq!(delays, vec![2000, 3000, 4500, 6750]);
    }

    #[test]
    fn test_jittered_backoff_never_shrinks() {
        let policy = RetryPolicy {
            max_retries: 8,
            jitter: 0.5,
            ..RetryPolicy::default()
        };
        for _ in 0..50 {
            let delays: Vec<Duration> = policy.delays().collect();
            assert_eq!(delays.len(), 8);
            assert!(delays[0] >= policy.initial_delay);
            for pair in delays.windows(2) {
                assert!(pair[1] >= pair[0].mul_f64(1.5));
            }
        }
    }

    #[test]
    fn test_cascade_policy_is_single_short_retry() {
        let delays: Vec<Duration> = RetryPolicy::cascade().delays().collect();
        assert_eq!(delays, vec![Duration::from_millis(1000)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_quota_errors_retry_until_budget_spent() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = attempts.clone();

        let err = with_quota_retry(&fast_policy(), &CancellationToken::new(), || {
            counter.fetch_add(1, Ordering::SeqCst);
            async { Err::<(), _>(Error::quota("Quota exceeded")) }
        })
        .await
        .unwrap_err();

        assert!(err.is_quota());
        assert_eq!(attempts.load(Ordering::SeqCst), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_waits_grow_between_attempts() {
        let stamps = Arc::new(std::sync::Mutex::new(Vec::new()));
        let recorder = stamps.clone();

        let result = with_quota_retry(&fast_policy(), &CancellationToken::new(), || {
            let mut stamps = recorder.lock().unwrap();
            stamps.push(Instant::now());
            let attempt = stamps.len();
            async move {
                if attempt < 4 {
                    Err(Error::quota("429 Too Many Requests"))
                } else {
                    Ok(attempt)
                }
            }
        })
        .await
        .unwrap();

        assert_eq!(result, 4);
        let stamps = stamps.lock().unwrap();
        let gaps: Vec<Duration> = stamps.windows(2).map(|w| w[1] - w[0]).collect();
        assert_eq!(gaps.len(), 3);
        for (gap, expected) in gaps.iter().zip([2000u64, 3000, 4500]) {
            let expected = Duration::from_millis(expected);
            assert!(*gap >= expected && *gap < expected + Duration::from_millis(5));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_quota_error_is_not_retried() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = attempts.clone();

        let err = with_quota_retry(&fast_policy(), &CancellationToken::new(), || {
            counter.fetch_add(1, Ordering::SeqCst);
            async { Err::<(), _>(Error::NoImagePart) }
        })
        .await
        .unwrap_err();

        assert!(matches!(err, Error::NoImagePart));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_backoff() {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(500)).await;
            trigger.cancel();
        });

        let started = Instant::now();
        let err = with_quota_retry(&fast_policy(), &cancel, || async {
            Err::<(), _>(Error::quota("quota"))
        })
        .await
        .unwrap_err();

        assert!(matches!(err, Error::Cancelled));
        assert!(started.elapsed() < Duration::from_millis(2000));
    }

    #[test]
    fn test_tier_outcome_classification() {
        assert!(matches!(
            TierOutcome::from_result(Ok::<_, Error>(1)),
            TierOutcome::Success(1)
        ));
        assert!(matches!(
            TierOutcome::<()>::from_result(Err(Error::quota("q"))),
            TierOutcome::Exhausted(_)
        ));
        assert!(matches!(
            TierOutcome::<()>::from_result(Err(Error::NoImagePart)),
            TierOutcome::Failed(_)
        ));
        assert!(matches!(
            TierOutcome::<()>::from_result(Err(Error::Cancelled)),
            TierOutcome::Cancelled
        ));
    }
}
