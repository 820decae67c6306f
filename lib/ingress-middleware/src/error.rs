use thiserror::Error;

/// Denial/failure outcomes a middleware can produce instead of calling
/// through (spec §7 "MiddlewareError — authentication denial, rate-limit
/// exceeded, etc.; each maps to its documented status code").
#[derive(Debug, Error)]
pub enum MiddlewareError {
    #[error("rate limit exceeded")]
    RateLimited,
    #[error("too many in-flight requests")]
    InFlightLimited,
    #[error("client address denied by allow list")]
    Forbidden,
    #[error("authentication failed")]
    Unauthorized,
    #[error("upstream auth service returned {status}")]
    ForwardAuthDenied { status: http::StatusCode },
    #[error("backend unavailable: {0}")]
    Unavailable(String),
    #[error("backend error: {0}")]
    Backend(#[from] ingress_core::Error),
}

impl MiddlewareError {
    /// The status code this error maps to when turned directly into a
    /// response at the edge of the chain.
    pub fn status(&self) -> http::StatusCode {
        match self {
            MiddlewareError::RateLimited | MiddlewareError::InFlightLimited => {
                http::StatusCode::TOO_MANY_REQUESTS
            }
            MiddlewareError::Forbidden => http::StatusCode::FORBIDDEN,
            MiddlewareError::Unauthorized => http::StatusCode::UNAUTHORIZED,
            MiddlewareError::ForwardAuthDenied { .. } => http::StatusCode::BAD_GATEWAY,
            MiddlewareError::Unavailable(_) => http::StatusCode::SERVICE_UNAVAILABLE,
            MiddlewareError::Backend(_) => http::StatusCode::BAD_GATEWAY,
        }
    }
}

/// A compile-time failure: an unresolvable reference or malformed
/// configuration discovered while building the chain. Distinct from
/// `MiddlewareError`, which is a request-time outcome.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("middleware `{0}` has no configured kind")]
    Empty(String),
    #[error("middleware `{name}` is malformed: {reason}")]
    Malformed { name: String, reason: String },
}
