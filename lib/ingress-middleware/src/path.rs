//! StripPrefix / AddPrefix / ReplacePath / ReplacePathRegex (spec §4.5):
//! pure path rewrites applied before the request reaches the rest of the
//! chain.

use crate::chain::{Handler, Middleware};
use crate::error::{BuildError, MiddlewareError};
use crate::request::{MiddlewareRequest, MiddlewareResponse};
use async_trait::async_trait;
use regex::Regex;

pub struct AddPrefix {
    prefix: String,
}

impl AddPrefix {
    pub fn new(prefix: String) -> Self {
        Self { prefix }
    }
}

#[async_trait]
impl Middleware for AddPrefix {
    async fn handle(
        &self,
        mut req: MiddlewareRequest,
        next: &(dyn Handler + Sync),
    ) -> Result<MiddlewareResponse, MiddlewareError> {
        let joined = format!("{}{}", self.prefix, req.path());
        req.set_path(&joined);
        next.call(req).await
    }

    fn kind(&self) -> &'static str {
        "add-prefix"
    }
}

/// Strips the first matching prefix from the configured ordered list; a
/// no-op if none match (spec §4.5).
pub struct StripPrefix {
    prefixes: Vec<String>,
}

impl StripPrefix {
    pub fn new(prefixes: Vec<String>) -> Self {
        Self { prefixes }
    }
}

#[async_trait]
impl Middleware for StripPrefix {
    async fn handle(
        &self,
        mut req: MiddlewareRequest,
        next: &(dyn Handler + Sync),
    ) -> Result<MiddlewareResponse, MiddlewareError> {
        let path = req.path().to_string();
        if let Some(prefix) = self.prefixes.iter().find(|p| path.starts_with(p.as_str())) {
            let stripped = &path[prefix.len()..];
            let stripped = if stripped.is_empty() { "/" } else { stripped };
            req.headers.insert(
                "X-Replaced-Path",
                http::HeaderValue::from_str(&path).unwrap_or(http::HeaderValue::from_static("/")),
            );
            req.set_path(stripped);
        }
        next.call(req).await
    }

    fn kind(&self) -> &'static str {
        "strip-prefix"
    }
}

pub struct StripPrefixRegex {
    patterns: Vec<Regex>,
}

impl StripPrefixRegex {
    pub fn compile(patterns: &[String]) -> Result<Self, BuildError> {
        let patterns = patterns
            .iter()
            .map(|p| {
                Regex::new(&format!("^{p}")).map_err(|e| BuildError::Malformed {
                    name: "stripPrefixRegex".to_string(),
                    reason: e.to_string(),
                })
            })
            .collect::<Result<_, _>>()?;
        Ok(Self { patterns })
    }
}

#[async_trait]
impl Middleware for StripPrefixRegex {
    async fn handle(
        &self,
        mut req: MiddlewareRequest,
        next: &(dyn Handler + Sync),
    ) -> Result<MiddlewareResponse, MiddlewareError> {
        let path = req.path().to_string();
        if let Some(m) = self.patterns.iter().find_map(|re| re.find(&path)) {
            let stripped = &path[m.end()..];
            let stripped = if stripped.is_empty() { "/" } else { stripped };
            req.set_path(stripped);
        }
        next.call(req).await
    }

    fn kind(&self) -> &'static str {
        "strip-prefix-regex"
    }
}

pub struct ReplacePath {
    path: String,
}

impl ReplacePath {
    pub fn new(path: String) -> Self {
        Self { path }
    }
}

#[async_trait]
impl Middleware for ReplacePath {
    async fn handle(
        &self,
        mut req: MiddlewareRequest,
        next: &(dyn Handler + Sync),
    ) -> Result<MiddlewareResponse, MiddlewareError> {
        req.headers.insert(
            "X-Replaced-Path",
            http::HeaderValue::from_str(req.path()).unwrap_or(http::HeaderValue::from_static("/")),
        );
        req.set_path(&self.path.clone());
        next.call(req).await
    }

    fn kind(&self) -> &'static str {
        "replace-path"
    }
}

pub struct ReplacePathRegex {
    regex: Regex,
    replacement: String,
}

impl ReplacePathRegex {
    pub fn compile(regex: &str, replacement: String) -> Result<Self, BuildError> {
        let regex = Regex::new(regex).map_err(|e| BuildError::Malformed {
            name: "replacePathRegex".to_string(),
            reason: e.to_string(),
        })?;
        Ok(Self { regex, replacement })
    }
}

#[async_trait]
impl Middleware for ReplacePathRegex {
    async fn handle(
        &self,
        mut req: MiddlewareRequest,
        next: &(dyn Handler + Sync),
    ) -> Result<MiddlewareResponse, MiddlewareError> {
        let path = req.path().to_string();
        let replaced = self.regex.replace(&path, self.replacement.as_str());
        req.set_path(&replaced);
        next.call(req).await
    }

    fn kind(&self) -> &'static str {
        "replace-path-regex"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use std::net::{IpAddr, Ipv4Addr};

    fn req(path: &str) -> MiddlewareRequest {
        MiddlewareRequest {
            method: http::Method::GET,
            uri: path.parse().unwrap(),
            headers: http::HeaderMap::new(),
            body: Bytes::new(),
            client_ip: IpAddr::V4(Ipv4Addr::LOCALHOST),
            peer_certificate: None,
        }
    }

    struct EchoPath;

    #[async_trait]
    impl Handler for EchoPath {
        async fn call(
            &self,
            req: MiddlewareRequest,
        ) -> Result<MiddlewareResponse, MiddlewareError> {
            let mut resp = MiddlewareResponse::with_status(http::StatusCode::OK);
            resp.headers
                .insert("x-path", http::HeaderValue::from_str(req.path()).unwrap());
            Ok(resp)
        }
    }

    /// Scenario S3 (spec §8): chain [addPrefix("/x"), stripPrefix("/x/y")]
    /// against "/y/z" yields "/z".
    #[tokio::test]
    async fn middleware_order_matches_s3() {
        let add = AddPrefix::new("/x".to_string());
        let strip = StripPrefix::new(vec!["/x/y".to_string()]);

        let after_add = add.handle(req("/y/z"), &EchoPath).await.unwrap();
        assert_eq!(after_add.headers.get("x-path").unwrap(), "/x/y/z");

        let after_strip = strip.handle(req("/x/y/z"), &EchoPath).await.unwrap();
        assert_eq!(after_strip.headers.get("x-path").unwrap(), "/z");
    }

    #[tokio::test]
    async fn strip_prefix_is_noop_when_no_prefix_matches() {
        let strip = StripPrefix::new(vec!["/api".to_string()]);
        let resp = strip.handle(req("/other"), &EchoPath).await.unwrap();
        assert_eq!(resp.headers.get("x-path").unwrap(), "/other");
    }
}
