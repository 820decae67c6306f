//! Headers / CORS (spec §4.5: "mutates request and response headers;
//! CORS responds to preflight directly").

use crate::chain::{Handler, Middleware};
use crate::error::MiddlewareError;
use crate::request::{MiddlewareRequest, MiddlewareResponse};
use async_trait::async_trait;
use ingress_config::dynamic::Headers as HeadersSpec;

pub struct Headers {
    spec: HeadersSpec,
}

impl Headers {
    pub fn new(spec: HeadersSpec) -> Self {
        Self { spec }
    }

    fn is_preflight(req: &MiddlewareRequest) -> bool {
        req.method == http::Method::OPTIONS
            && req.headers.contains_key("access-control-request-method")
    }

    fn apply_cors_response_headers(&self, headers: &mut http::HeaderMap) {
        for origin in &self.spec.access_control_allow_origin_list {
            if let Ok(v) = http::HeaderValue::from_str(origin) {
                headers.insert("access-control-allow-origin", v);
                break;
            }
        }
        if self.spec.access_control_allow_credentials {
            headers.insert("access-control-allow-credentials", http::HeaderValue::from_static("true"));
        }
        if !self.spec.access_control_allow_methods.is_empty() {
            if let Ok(v) = http::HeaderValue::from_str(&self.spec.access_control_allow_methods.join(", ")) {
                headers.insert("access-control-allow-methods", v);
            }
        }
        if !self.spec.access_control_allow_headers.is_empty() {
            if let Ok(v) = http::HeaderValue::from_str(&self.spec.access_control_allow_headers.join(", ")) {
                headers.insert("access-control-allow-headers", v);
            }
        }
        if !self.spec.access_control_expose_headers.is_empty() {
            if let Ok(v) = http::HeaderValue::from_str(&self.spec.access_control_expose_headers.join(", ")) {
                headers.insert("access-control-expose-headers", v);
            }
        }
        if self.spec.access_control_max_age > 0 {
            if let Ok(v) = http::HeaderValue::from_str(&self.spec.access_control_max_age.to_string()) {
                headers.insert("access-control-max-age", v);
            }
        }
        if self.spec.add_vary_header {
            headers.insert(http::header::VARY, http::HeaderValue::from_static("Origin"));
        }
    }
}

#[async_trait]
impl Middleware for Headers {
    async fn handle(
        &self,
        mut req: MiddlewareRequest,
        next: &(dyn Handler + Sync),
    ) -> Result<MiddlewareResponse, MiddlewareError> {
        for (name, value) in &self.spec.custom_request_headers {
            if let Ok(v) = http::HeaderValue::from_str(value) {
                if let Ok(name) = http::HeaderName::from_bytes(name.as_bytes()) {
                    req.headers.insert(name, v);
                }
            }
        }

        if Self::is_preflight(&req) {
            let mut resp = MiddlewareResponse::with_status(http::StatusCode::NO_CONTENT);
            self.apply_cors_response_headers(&mut resp.headers);
            return Ok(resp);
        }

        let mut resp = next.call(req).await?;
        for (name, value) in &self.spec.custom_response_headers {
            if let Ok(v) = http::HeaderValue::from_str(value) {
                if let Ok(name) = http::HeaderName::from_bytes(name.as_bytes()) {
                    resp.headers.insert(name, v);
                }
            }
        }
        self.apply_cors_response_headers(&mut resp.headers);
        Ok(resp)
    }

    fn kind(&self) -> &'static str {
        "headers"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{test_request, AlwaysOk};

    #[tokio::test]
    async fn preflight_short_circuits_with_configured_headers() {
        let mw = Headers::new(HeadersSpec {
            access_control_allow_origin_list: vec!["https://example.com".to_string()],
            access_control_allow_methods: vec!["GET".to_string(), "POST".to_string()],
            ..Default::default()
        });
        let mut req = test_request("/");
        req.method = http::Method::OPTIONS;
        req.headers
            .insert("access-control-request-method", "POST".parse().unwrap());

        let resp = mw.handle(req, &AlwaysOk).await.unwrap();
        assert_eq!(resp.status, http::StatusCode::NO_CONTENT);
        assert_eq!(
            resp.headers.get("access-control-allow-origin").unwrap(),
            "https://example.com"
        );
    }

    #[tokio::test]
    async fn custom_request_header_is_injected() {
        struct CaptureHeader;
        #[async_trait]
        impl Handler for CaptureHeader {
            async fn call(
                &self,
                req: MiddlewareRequest,
            ) -> Result<MiddlewareResponse, MiddlewareError> {
                let mut resp = MiddlewareResponse::with_status(http::StatusCode::OK);
                if let Some(v) = req.headers.get("x-injected") {
                    resp.headers.insert("x-injected", v.clone());
                }
                Ok(resp)
            }
        }

        let mut custom = indexmap::IndexMap::new();
        custom.insert("X-Injected".to_string(), "yes".to_string());
        let mw = Headers::new(HeadersSpec {
            custom_request_headers: custom,
            ..Default::default()
        });
        let resp = mw.handle(test_request("/"), &CaptureHeader).await.unwrap();
        assert_eq!(resp.headers.get("x-injected").unwrap(), "yes");
    }
}
