//! Errors / error page (spec §3 `MiddlewareSpec`): serves a replacement
//! response from a configured service when the backend's status matches
//! one of the configured ranges. Resolving `service` to a live backend is
//! outside this crate's scope (it belongs to the load balancer, C6), so
//! the compiled middleware takes an injected [`ErrorPageBackend`] rather
//! than depending on `ingress-lb` directly.

use crate::chain::{Handler, Middleware};
use crate::error::MiddlewareError;
use crate::request::{MiddlewareRequest, MiddlewareResponse};
use async_trait::async_trait;
use ingress_config::dynamic::ErrorPage as ErrorPageSpec;
use std::sync::Arc;

/// Looks up the replacement content for a named service. Implemented by
/// the dispatcher, which has access to the compiled service graph.
#[async_trait]
pub trait ErrorPageBackend: Send + Sync {
    async fn fetch(
        &self,
        service: &str,
        query: Option<&str>,
        original: &MiddlewareResponse,
    ) -> Result<MiddlewareResponse, MiddlewareError>;
}

pub struct ErrorPage {
    ranges: Vec<(u16, u16)>,
    service: String,
    query: Option<String>,
    backend: Arc<dyn ErrorPageBackend>,
}

impl ErrorPage {
    pub fn new(spec: ErrorPageSpec, backend: Arc<dyn ErrorPageBackend>) -> Self {
        let ranges = spec
            .status
            .iter()
            .filter_map(|s| parse_range(s))
            .collect();
        Self {
            ranges,
            service: spec.service,
            query: spec.query,
            backend,
        }
    }

    fn matches(&self, status: u16) -> bool {
        self.ranges.iter().any(|(lo, hi)| status >= *lo && status <= *hi)
    }
}

fn parse_range(raw: &str) -> Option<(u16, u16)> {
    match raw.split_once('-') {
        Some((lo, hi)) => Some((lo.trim().parse().ok()?, hi.trim().parse().ok()?)),
        None => {
            let code: u16 = raw.trim().parse().ok()?;
            Some((code, code))
        }
    }
}

#[async_trait]
impl Middleware for ErrorPage {
    async fn handle(
        &self,
        req: MiddlewareRequest,
        next: &(dyn Handler + Sync),
    ) -> Result<MiddlewareResponse, MiddlewareError> {
        let resp = next.call(req).await?;
        if !self.matches(resp.status.as_u16()) {
            return Ok(resp);
        }
        self.backend
            .fetch(&self.service, self.query.as_deref(), &resp)
            .await
    }

    fn kind(&self) -> &'static str {
        "errors"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::test_request;
    use async_trait::async_trait as at;

    struct FixedStatus(http::StatusCode);
    #[at]
    impl Handler for FixedStatus {
        async fn call(
            &self,
            _req: MiddlewareRequest,
        ) -> Result<MiddlewareResponse, MiddlewareError> {
            Ok(MiddlewareResponse::with_status(self.0))
        }
    }

    struct StaticPage;
    #[at]
    impl ErrorPageBackend for StaticPage {
        async fn fetch(
            &self,
            _service: &str,
            _query: Option<&str>,
            original: &MiddlewareResponse,
        ) -> Result<MiddlewareResponse, MiddlewareError> {
            let mut resp = MiddlewareResponse::with_status(original.status);
            resp.body = bytes::Bytes::from_static(b"oops");
            Ok(resp)
        }
    }

    #[tokio::test]
    async fn matching_status_invokes_error_page_backend() {
        let mw = ErrorPage::new(
            ErrorPageSpec {
                status: vec!["500-599".to_string()],
                service: "errors".to_string(),
                query: None,
            },
            Arc::new(StaticPage),
        );
        let resp = mw
            .handle(test_request("/"), &FixedStatus(http::StatusCode::INTERNAL_SERVER_ERROR))
            .await
            .unwrap();
        assert_eq!(resp.body, bytes::Bytes::from_static(b"oops"));
    }

    #[tokio::test]
    async fn non_matching_status_passes_through() {
        let mw = ErrorPage::new(
            ErrorPageSpec {
                status: vec!["500-599".to_string()],
                service: "errors".to_string(),
                query: None,
            },
            Arc::new(StaticPage),
        );
        let resp = mw
            .handle(test_request("/"), &FixedStatus(http::StatusCode::OK))
            .await
            .unwrap();
        assert!(resp.body.is_empty());
    }
}
