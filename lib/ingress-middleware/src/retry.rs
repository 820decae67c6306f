//! Retry (spec §4.5): retries on network error and on configured status
//! codes; exponential backoff with a 2x factor capped at `Timeout`;
//! non-idempotent methods gated by `RetryNonIdempotentMethod`. Grounded
//! on the teacher's `linkerd2-retry` `Policy`/budget shape, generalized
//! from a single retried call to an explicit bounded loop since this
//! pipeline has no `tower::Service` to hand to `tower::retry::Retry`.

use crate::chain::{Handler, Middleware};
use crate::classify::{Classify, Outcome, StatusCodeClassify};
use crate::error::MiddlewareError;
use crate::request::{MiddlewareRequest, MiddlewareResponse};
use async_trait::async_trait;
use ingress_config::dynamic::Retry as RetrySpec;
use std::time::Duration;

pub struct Retry {
    attempts: u32,
    initial_interval: Duration,
    timeout: Duration,
    retry_non_idempotent_method: bool,
    retry_on_network_error: bool,
    classify: StatusCodeClassify,
}

impl Retry {
    pub fn new(spec: RetrySpec) -> Self {
        Self {
            attempts: spec.attempts.max(1),
            initial_interval: spec.initial_interval,
            timeout: spec.timeout,
            retry_non_idempotent_method: spec.retry_non_idempotent_method,
            retry_on_network_error: spec.retry_on_network_error,
            classify: StatusCodeClassify {
                codes: spec.status_codes,
            },
        }
    }

    fn is_idempotent(method: &http::Method) -> bool {
        matches!(
            method,
            &http::Method::GET
                | &http::Method::HEAD
                | &http::Method::PUT
                | &http::Method::DELETE
                | &http::Method::OPTIONS
        )
    }

    /// A connection-level failure (dial/backend I/O) rather than a
    /// middleware-level denial (auth, rate limit, ...) — the only class
    /// `retry_on_network_error: false` opts out of.
    fn is_network_error(err: &MiddlewareError) -> bool {
        matches!(err, MiddlewareError::Unavailable(_) | MiddlewareError::Backend(_))
    }
}

#[async_trait]
impl Middleware for Retry {
    async fn handle(
        &self,
        req: MiddlewareRequest,
        next: &(dyn Handler + Sync),
    ) -> Result<MiddlewareResponse, MiddlewareError> {
        let retryable_method =
            Self::is_idempotent(&req.method) || self.retry_non_idempotent_method;

        let mut backoff = self.initial_interval;
        let mut last_err = None;
        for attempt in 0..self.attempts {
            match next.call(req.clone()).await {
                Ok(resp) => {
                    if !retryable_method || self.classify.classify_response(&resp) == Outcome::Success {
                        return Ok(resp);
                    }
                    if attempt + 1 >= self.attempts {
                        return Ok(resp);
                    }
                }
                Err(err) => {
                    if !retryable_method
                        || (!self.retry_on_network_error && Self::is_network_error(&err))
                    {
                        return Err(err);
                    }
                    last_err = Some(err);
                    if attempt + 1 >= self.attempts {
                        break;
                    }
                }
            }
            tokio::time::sleep(backoff).await;
            backoff = (backoff * 2).min(self.timeout);
        }
        Err(last_err.unwrap_or(MiddlewareError::Unavailable(
            "retry attempts exhausted".to_string(),
        )))
    }

    fn kind(&self) -> &'static str {
        "retry"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::test_request;
    use async_trait::async_trait as at;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct FlakyThenOk {
        failures_remaining: AtomicU32,
    }

    #[at]
    impl Handler for FlakyThenOk {
        async fn call(
            &self,
            _req: MiddlewareRequest,
        ) -> Result<MiddlewareResponse, MiddlewareError> {
            if self.failures_remaining.fetch_sub(1, Ordering::SeqCst) > 0 {
                Ok(MiddlewareResponse::with_status(
                    http::StatusCode::SERVICE_UNAVAILABLE,
                ))
            } else {
                Ok(MiddlewareResponse::with_status(http::StatusCode::OK))
            }
        }
    }

    #[tokio::test]
    async fn retries_until_success_within_attempt_budget() {
        let mw = Retry::new(RetrySpec {
            attempts: 3,
            initial_interval: Duration::from_millis(1),
            timeout: Duration::from_millis(10),
            max_request_body_bytes: 0,
            retry_non_idempotent_method: false,
            retry_on_network_error: true,
            status_codes: vec![503],
        });
        let backend = FlakyThenOk {
            failures_remaining: AtomicU32::new(1),
        };
        let resp = mw.handle(test_request("/"), &backend).await.unwrap();
        assert_eq!(resp.status, http::StatusCode::OK);
    }

    #[tokio::test]
    async fn post_is_not_retried_unless_configured() {
        let mw = Retry::new(RetrySpec {
            attempts: 3,
            initial_interval: Duration::from_millis(1),
            timeout: Duration::from_millis(10),
            max_request_body_bytes: 0,
            retry_non_idempotent_method: false,
            retry_on_network_error: true,
            status_codes: vec![503],
        });
        let backend = FlakyThenOk {
            failures_remaining: AtomicU32::new(5),
        };
        let mut req = test_request("/");
        req.method = http::Method::POST;
        let resp = mw.handle(req, &backend).await.unwrap();
        assert_eq!(resp.status, http::StatusCode::SERVICE_UNAVAILABLE);
    }

    struct AlwaysNetworkError {
        calls: AtomicU32,
    }

    #[at]
    impl Handler for AlwaysNetworkError {
        async fn call(
            &self,
            _req: MiddlewareRequest,
        ) -> Result<MiddlewareResponse, MiddlewareError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(MiddlewareError::Unavailable("dial failed".to_string()))
        }
    }

    #[tokio::test]
    async fn network_error_is_not_retried_when_disabled() {
        let mw = Retry::new(RetrySpec {
            attempts: 3,
            initial_interval: Duration::from_millis(1),
            timeout: Duration::from_millis(10),
            max_request_body_bytes: 0,
            retry_non_idempotent_method: false,
            retry_on_network_error: false,
            status_codes: vec![503],
        });
        let backend = AlwaysNetworkError {
            calls: AtomicU32::new(0),
        };
        let result = mw.handle(test_request("/"), &backend).await;
        assert!(result.is_err());
        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn network_error_is_retried_by_default() {
        let mw = Retry::new(RetrySpec {
            attempts: 3,
            initial_interval: Duration::from_millis(1),
            timeout: Duration::from_millis(10),
            max_request_body_bytes: 0,
            retry_non_idempotent_method: false,
            retry_on_network_error: true,
            status_codes: vec![503],
        });
        let backend = AlwaysNetworkError {
            calls: AtomicU32::new(0),
        };
        let result = mw.handle(test_request("/"), &backend).await;
        assert!(result.is_err());
        assert_eq!(backend.calls.load(Ordering::SeqCst), 3);
    }
}
