//! Response classification shared by Retry and CircuitBreaker, grounded
//! on the teacher's `linkerd2-http-classify` (`Classify`/`ClassifyResponse`
//! split: classify once per request, feed the same outcome to whichever
//! layers care about it).

use crate::error::MiddlewareError;
use crate::request::MiddlewareResponse;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Failure,
}

/// Classifies a completed attempt (response or transport error) as a
/// success or failure for retry/circuit-breaker bookkeeping.
pub trait Classify: Send + Sync {
    fn classify_response(&self, resp: &MiddlewareResponse) -> Outcome;

    fn classify_error(&self, _err: &MiddlewareError) -> Outcome {
        Outcome::Failure
    }
}

/// Classifies by a configured set of "retryable" status codes (spec
/// §4.5 Retry: "retries ... on status codes matching the configured
/// set").
pub struct StatusCodeClassify {
    pub codes: Vec<u16>,
}

impl Classify for StatusCodeClassify {
    fn classify_response(&self, resp: &MiddlewareResponse) -> Outcome {
        if self.codes.contains(&resp.status.as_u16()) {
            Outcome::Failure
        } else {
            Outcome::Success
        }
    }
}

/// Classifies `5xx` as failure, everything else as success. Used by the
/// circuit breaker's rolling error ratio when no more specific
/// classifier is configured.
pub struct ServerErrorClassify;

impl Classify for ServerErrorClassify {
    fn classify_response(&self, resp: &MiddlewareResponse) -> Outcome {
        if resp.status.is_server_error() {
            Outcome::Failure
        } else {
            Outcome::Success
        }
    }
}
