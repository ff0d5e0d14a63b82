use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tokio::time::sleep;
use tracing::warn;

use crate::config::RetrySection;

use super::error::{CollectError, CollectResult, FailureClass};

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: usize,
    base_delay: Duration,
    max_delay: Duration,
    rate_limit_delay: Duration,
    jitter_ms: u64,
}

#[derive(Debug, Clone)]
pub struct RetryOutcome<T> {
    pub result: T,
    pub attempts: usize,
    pub delays: Vec<Duration>,
}

/// What happened to one failed attempt, handed to the observer.
#[derive(Debug, Clone, Copy)]
pub struct AttemptFailure<'a> {
    pub error: &'a CollectError,
    pub class: FailureClass,
    pub attempt: usize,
    pub next_delay: Option<Duration>,
}

impl RetryPolicy {
    pub fn new(config: RetrySection) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay: Duration::from_millis(config.base_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
            rate_limit_delay: Duration::from_millis(config.rate_limit_delay_ms),
            jitter_ms: config.jitter_ms,
        }
    }

    pub fn max_attempts(&self) -> usize {
        self.max_attempts
    }

    /// Backoff before the attempt after `failures` consecutive failures.
    ///
    /// Doubles from the base delay (or the rate-limit delay when upstream
    /// asked us to slow down) and is capped at the larger of that start
    /// value and `max_delay`.
    pub fn delay_for(&self, class: FailureClass, failures: usize) -> Duration {
        let start = match class {
            FailureClass::RateLimited => self.rate_limit_delay,
            _ => self.base_delay,
        };
        let cap = self.max_delay.max(start);
        let exponent = failures.saturating_sub(1).min(16) as u32;
        start.saturating_mul(1u32 << exponent).min(cap)
    }

    pub async fn execute<F, Fut, T, C>(&self, step: F, classify: C) -> CollectResult<RetryOutcome<T>>
    where
        F: FnMut(usize) -> Fut,
        Fut: Future<Output = CollectResult<T>>,
        C: Fn(&CollectError) -> FailureClass,
    {
        self.execute_observed(step, classify, |_| {}).await
    }

    /// Runs `step` until it succeeds, fails fatally, or attempts run out.
    pub async fn execute_observed<F, Fut, T, C, O>(
        &self,
        mut step: F,
        classify: C,
        mut observe: O,
    ) -> CollectResult<RetryOutcome<T>>
    where
        F: FnMut(usize) -> Fut,
        Fut: Future<Output = CollectResult<T>>,
        C: Fn(&CollectError) -> FailureClass,
        O: FnMut(AttemptFailure<'_>),
    {
        let mut delays = Vec::new();
        let mut attempt = 0usize;
        loop {
            match step(attempt).await {
                Ok(result) => {
                    return Ok(RetryOutcome {
                        result,
                        attempts: attempt + 1,
                        delays,
                    });
                }
                Err(error) => {
                    attempt += 1;
                    let class = classify(&error);
                    let exhausted = attempt >= self.max_attempts;
                    let next_delay = match class {
                        FailureClass::Fatal => None,
                        _ if exhausted => None,
                        _ => Some(self.jittered(self.delay_for(class, attempt))),
                    };
                    observe(AttemptFailure {
                        error: &error,
                        class,
                        attempt,
                        next_delay,
                    });
                    let Some(delay) = next_delay else {
                        if class == FailureClass::Fatal {
                            return Err(error);
                        }
                        return Err(CollectError::RetriesExhausted {
                            attempts: attempt,
                            last: Box::new(error),
                        });
                    };
                    warn!(
                        attempt,
                        class = %class,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "Retrying after failure"
                    );
                    delays.push(delay);
                    if !delay.is_zero() {
                        sleep(delay).await;
                    }
                }
            }
        }
    }

    fn jittered(&self, delay: Duration) -> Duration {
        if self.jitter_ms == 0 {
            delay
        } else {
            let jitter = rand::thread_rng().gen_range(0..=self.jitter_ms);
            delay + Duration::from_millis(jitter)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collect::error::ErrorCategorizer;
    use std::cell::Cell;

    fn policy(max_attempts: usize) -> RetryPolicy {
        RetryPolicy::new(RetrySection {
            max_attempts,
            base_delay_ms: 100,
            max_delay_ms: 1_000,
            rate_limit_delay_ms: 2_000,
            jitter_ms: 0,
        })
    }

    fn miss() -> CollectError {
        CollectError::CaptureNotFound {
            pattern: "GET /api/v1/tags/web_info/".into(),
            waited_ms: 10,
        }
    }

    #[test]
    fn delays_grow_until_capped() {
        let policy = policy(8);
        let delays = (1..=6)
            .map(|n| policy.delay_for(FailureClass::Transient, n))
            .collect::<Vec<_>>();
        assert_eq!(delays[0], Duration::from_millis(100));
        assert_eq!(delays[1], Duration::from_millis(200));
        assert_eq!(delays[3], Duration::from_millis(800));
        assert_eq!(delays[4], Duration::from_millis(1_000));
        assert_eq!(delays[5], Duration::from_millis(1_000));
        assert!(policy.delay_for(FailureClass::RateLimited, 1) > delays[5]);
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_after_transient_failures() {
        let calls = Cell::new(0usize);
        let outcome = policy(4)
            .execute(
                |_| {
                    calls.set(calls.get() + 1);
                    let n = calls.get();
                    async move {
                        if n < 3 {
                            Err(miss())
                        } else {
                            Ok("page")
                        }
                    }
                },
                ErrorCategorizer::categorize,
            )
            .await
            .unwrap();
        assert_eq!(outcome.result, "page");
        assert_eq!(outcome.attempts, 3);
        assert_eq!(
            outcome.delays,
            vec![Duration::from_millis(100), Duration::from_millis(200)]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn exhausts_after_max_attempts() {
        let calls = Cell::new(0usize);
        let err = policy(3)
            .execute(
                |_| {
                    calls.set(calls.get() + 1);
                    async { Err::<(), _>(miss()) }
                },
                ErrorCategorizer::categorize,
            )
            .await
            .unwrap_err();
        assert_eq!(calls.get(), 3);
        match err {
            CollectError::RetriesExhausted { attempts, last } => {
                assert_eq!(attempts, 3);
                assert!(matches!(*last, CollectError::CaptureNotFound { .. }));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn fatal_errors_are_not_retried() {
        let calls = Cell::new(0usize);
        let mut observed = Vec::new();
        let err = policy(5)
            .execute_observed(
                |_| {
                    calls.set(calls.get() + 1);
                    async { Err::<(), _>(CollectError::Authentication("expired".into())) }
                },
                ErrorCategorizer::categorize,
                |failure| observed.push((failure.class, failure.next_delay)),
            )
            .await
            .unwrap_err();
        assert_eq!(calls.get(), 1);
        assert!(matches!(err, CollectError::Authentication(_)));
        assert_eq!(observed, vec![(FailureClass::Fatal, None)]);
    }

    #[tokio::test(start_paused = true)]
    async fn rate_limits_wait_longer() {
        let calls = Cell::new(0usize);
        let outcome = policy(3)
            .execute(
                |_| {
                    calls.set(calls.get() + 1);
                    let n = calls.get();
                    async move {
                        if n == 1 {
                            Err(CollectError::RateLimited("wait".into()))
                        } else {
                            Ok(n)
                        }
                    }
                },
                ErrorCategorizer::categorize,
            )
            .await
            .unwrap();
        assert_eq!(outcome.delays, vec![Duration::from_millis(2_000)]);
    }
}
