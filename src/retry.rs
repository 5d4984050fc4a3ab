use std::future::Future;
use std::time::Duration;

use crate::{
    config::RetryPolicy,
    error::{GenError, Result},
    models::GenerationRequest,
};

/// Seed used when a request arrives without one.
pub const DEFAULT_SEED: i64 = 13;

#[derive(Debug, Clone)]
pub struct RetryOutcome<T> {
    pub value: T,
    /// Seed of the attempt that succeeded.
    pub seed: i64,
    pub attempts: u32,
}

/// Re-dispatches a failed request with `seed + 1` until it succeeds or the
/// policy gives up.
#[derive(Debug, Clone)]
pub struct RetryController {
    policy: RetryPolicy,
}

impl RetryController {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub async fn run<F, Fut, T>(&self, request: &GenerationRequest, attempt: F) -> Result<RetryOutcome<T>>
    where
        F: FnMut(GenerationRequest) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        match self.policy.overall_timeout {
            Some(limit) => tokio::time::timeout(limit, self.run_attempts(request, attempt))
                .await
                .map_err(|_| GenError::Timeout(limit.as_millis() as u64))?,
            None => self.run_attempts(request, attempt).await,
        }
    }

    async fn run_attempts<F, Fut, T>(&self, request: &GenerationRequest, mut attempt: F) -> Result<RetryOutcome<T>>
    where
        F: FnMut(GenerationRequest) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let initial_seed = request.seed().unwrap_or(DEFAULT_SEED);
        let mut tries: u32 = 0;

        loop {
            let delay = self.policy.backoff_for(tries);
            if delay > Duration::ZERO {
                tokio::time::sleep(delay).await;
            }

            let seed = initial_seed.wrapping_add(i64::from(tries));
            tries += 1;

            match attempt(request.with_seed(seed)).await {
                Ok(value) => {
                    if tries > 1 {
                        log::info!("Succeeded after {} attempts with seed {}", tries, seed);
                    }
                    return Ok(RetryOutcome {
                        value,
                        seed,
                        attempts: tries,
                    });
                }
                Err(e) if !e.is_retryable() => return Err(e),
                Err(e) => {
                    if self.policy.max_attempts.map_or(false, |max| tries >= max) {
                        log::error!("Giving up after {} attempts: {}", tries, e);
                        return Err(GenError::RetriesExhausted {
                            attempts: tries,
                            last_error: e.to_string(),
                        });
                    }
                    log::warn!("Attempt {} with seed {} failed: {}; retrying with seed {}", tries, seed, e, seed.wrapping_add(1));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RawParams;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    fn backend_error() -> GenError {
        GenError::Backend {
            status: 500,
            message: "flaky".into(),
        }
    }

    fn request(seed: Option<i64>) -> GenerationRequest {
        let raw = match seed {
            Some(s) => RawParams::new().with_seed(s),
            None => RawParams::new(),
        };
        GenerationRequest::from_prompt("retry me", &raw)
    }

    #[tokio::test]
    async fn test_fails_n_times_then_succeeds() {
        let controller = RetryController::new(RetryPolicy::unbounded());
        let failures = 4;
        let calls = AtomicU32::new(0);
        let seeds = Mutex::new(Vec::new());

        let outcome = controller
            .run(&request(Some(100)), |attempt| {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                seeds.lock().unwrap().push(attempt.seed().unwrap());
                async move {
                    if n < failures {
                        Err(backend_error())
                    } else {
                        Ok("image")
                    }
                }
            })
            .await
            .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), failures + 1);
        assert_eq!(outcome.attempts, failures + 1);
        assert_eq!(outcome.seed, 100 + i64::from(failures));
        assert_eq!(*seeds.lock().unwrap(), vec![100, 101, 102, 103, 104]);
    }

    #[tokio::test]
    async fn test_missing_seed_starts_at_default() {
        let controller = RetryController::new(RetryPolicy::unbounded());
        let outcome = controller
            .run(&request(None), |attempt| async move { Ok(attempt.seed()) })
            .await
            .unwrap();
        assert_eq!(outcome.seed, DEFAULT_SEED);
        assert_eq!(outcome.value, Some(DEFAULT_SEED));
    }

    #[tokio::test]
    async fn test_bounded_attempts_surface_typed_error() {
        let controller = RetryController::new(RetryPolicy::unbounded().with_max_attempts(3));
        let calls = AtomicU32::new(0);

        let err = controller
            .run(&request(Some(1)), |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(backend_error()) }
            })
            .await
            .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(matches!(err, GenError::RetriesExhausted { attempts: 3, .. }));
    }

    #[tokio::test]
    async fn test_non_retryable_error_stops_immediately() {
        let controller = RetryController::new(RetryPolicy::unbounded());
        let calls = AtomicU32::new(0);

        let err = controller
            .run(&request(Some(1)), |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(GenError::ToolInvocation("convert failed".into())) }
            })
            .await
            .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(err, GenError::ToolInvocation(_)));
    }

    #[tokio::test]
    async fn test_overall_timeout() {
        let policy = RetryPolicy::unbounded()
            .with_backoff(Duration::from_millis(10), Duration::from_millis(10))
            .with_overall_timeout(Duration::from_millis(100));
        let controller = RetryController::new(policy);

        let err = controller
            .run(&request(Some(1)), |_| async { Err::<(), _>(backend_error()) })
            .await
            .unwrap_err();
        assert!(matches!(err, GenError::Timeout(100)));
    }
}
