//! RedirectRegex / RedirectScheme (spec §4.5: "301/302/307/308 depending
//! on `Permanent`").

use crate::chain::{Handler, Middleware};
use crate::error::{BuildError, MiddlewareError};
use crate::request::{MiddlewareRequest, MiddlewareResponse};
use async_trait::async_trait;
use http::StatusCode;
use regex::Regex;

fn redirect_status(permanent: bool) -> StatusCode {
    if permanent {
        StatusCode::MOVED_PERMANENTLY
    } else {
        StatusCode::FOUND
    }
}

pub struct RedirectRegex {
    regex: Regex,
    replacement: String,
    permanent: bool,
}

impl RedirectRegex {
    pub fn compile(regex: &str, replacement: String, permanent: bool) -> Result<Self, BuildError> {
        let regex = Regex::new(regex).map_err(|e| BuildError::Malformed {
            name: "redirectRegex".to_string(),
            reason: e.to_string(),
        })?;
        Ok(Self {
            regex,
            replacement,
            permanent,
        })
    }
}

#[async_trait]
impl Middleware for RedirectRegex {
    async fn handle(
        &self,
        req: MiddlewareRequest,
        _next: &(dyn Handler + Sync),
    ) -> Result<MiddlewareResponse, MiddlewareError> {
        let full = req.uri.to_string();
        if !self.regex.is_match(&full) {
            // Passes through untouched when the pattern does not match,
            // matching the path-rewrite middlewares' no-op convention.
            return _next.call(req).await;
        }
        let location = self.regex.replace(&full, self.replacement.as_str());
        let mut resp = MiddlewareResponse::with_status(redirect_status(self.permanent));
        resp.headers.insert(
            http::header::LOCATION,
            http::HeaderValue::from_str(&location)
                .map_err(|e| MiddlewareError::Unavailable(e.to_string()))?,
        );
        Ok(resp)
    }

    fn kind(&self) -> &'static str {
        "redirect-regex"
    }
}

pub struct RedirectScheme {
    scheme: String,
    port: Option<u16>,
    permanent: bool,
}

impl RedirectScheme {
    pub fn new(scheme: String, port: Option<u16>, permanent: bool) -> Self {
        Self {
            scheme,
            port,
            permanent,
        }
    }
}

#[async_trait]
impl Middleware for RedirectScheme {
    async fn handle(
        &self,
        req: MiddlewareRequest,
        _next: &(dyn Handler + Sync),
    ) -> Result<MiddlewareResponse, MiddlewareError> {
        let host = req
            .headers
            .get(http::header::HOST)
            .and_then(|h| h.to_str().ok())
            .unwrap_or("")
            .split(':')
            .next()
            .unwrap_or("");
        let authority = match self.port {
            Some(p) => format!("{host}:{p}"),
            None => host.to_string(),
        };
        let location = format!(
            "{}://{}{}",
            self.scheme,
            authority,
            req.uri
                .path_and_query()
                .map(|pq| pq.as_str())
                .unwrap_or("/")
        );
        let mut resp = MiddlewareResponse::with_status(redirect_status(self.permanent));
        resp.headers.insert(
            http::header::LOCATION,
            http::HeaderValue::from_str(&location)
                .map_err(|e| MiddlewareError::Unavailable(e.to_string()))?,
        );
        Ok(resp)
    }

    fn kind(&self) -> &'static str {
        "redirect-scheme"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{test_request, NeverCalled};

    #[tokio::test]
    async fn redirect_scheme_builds_https_location() {
        let mw = RedirectScheme::new("https".to_string(), None, true);
        let mut r = test_request("/a/b?q=1");
        r.headers.insert(http::header::HOST, "example.com".parse().unwrap());
        let resp = mw.handle(r, &NeverCalled).await.unwrap();
        assert_eq!(resp.status, StatusCode::MOVED_PERMANENTLY);
        assert_eq!(resp.headers.get(http::header::LOCATION).unwrap(), "https://example.com/a/b?q=1");
    }
}
