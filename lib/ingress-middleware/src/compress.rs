//! Compress (spec §4.5 summary table; response gzip compression above a
//! minimum body size, skipping configured content types). Uses the
//! teacher's own `flate2` dependency rather than introducing a new
//! compression crate.

use crate::chain::{Handler, Middleware};
use crate::error::MiddlewareError;
use crate::request::{MiddlewareRequest, MiddlewareResponse};
use async_trait::async_trait;
use bytes::Bytes;
use flate2::write::GzEncoder;
use flate2::Compression;
use ingress_config::dynamic::Compress as CompressSpec;
use std::io::Write;

pub struct Compress {
    min_response_body_bytes: i64,
    excluded_content_types: Vec<String>,
}

impl Compress {
    pub fn new(spec: CompressSpec) -> Self {
        Self {
            min_response_body_bytes: spec.min_response_body_bytes,
            excluded_content_types: spec.excluded_content_types,
        }
    }

    fn accepts_gzip(req: &MiddlewareRequest) -> bool {
        req.headers
            .get(http::header::ACCEPT_ENCODING)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.contains("gzip"))
            .unwrap_or(false)
    }

    fn content_type_excluded(&self, resp: &MiddlewareResponse) -> bool {
        let Some(ct) = resp
            .headers
            .get(http::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
        else {
            return false;
        };
        self.excluded_content_types
            .iter()
            .any(|excluded| ct.starts_with(excluded.as_str()))
    }
}

#[async_trait]
impl Middleware for Compress {
    async fn handle(
        &self,
        req: MiddlewareRequest,
        next: &(dyn Handler + Sync),
    ) -> Result<MiddlewareResponse, MiddlewareError> {
        let client_accepts_gzip = Self::accepts_gzip(&req);
        let mut resp = next.call(req).await?;

        if !client_accepts_gzip
            || resp.headers.contains_key(http::header::CONTENT_ENCODING)
            || (resp.body.len() as i64) < self.min_response_body_bytes
            || self.content_type_excluded(&resp)
        {
            return Ok(resp);
        }

        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        if encoder.write_all(&resp.body).is_ok() {
            if let Ok(compressed) = encoder.finish() {
                resp.body = Bytes::from(compressed);
                resp.headers
                    .insert(http::header::CONTENT_ENCODING, http::HeaderValue::from_static("gzip"));
                resp.headers.remove(http::header::CONTENT_LENGTH);
            }
        }
        Ok(resp)
    }

    fn kind(&self) -> &'static str {
        "compress"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::test_request;
    use async_trait::async_trait as at;

    struct FixedBody(Bytes);

    #[at]
    impl Handler for FixedBody {
        async fn call(
            &self,
            _req: MiddlewareRequest,
        ) -> Result<MiddlewareResponse, MiddlewareError> {
            let mut resp = MiddlewareResponse::with_status(http::StatusCode::OK);
            resp.body = self.0.clone();
            Ok(resp)
        }
    }

    #[tokio::test]
    async fn compresses_large_body_when_accepted() {
        let mw = Compress::new(CompressSpec {
            min_response_body_bytes: 4,
            excluded_content_types: vec![],
        });
        let mut req = test_request("/");
        req.headers
            .insert(http::header::ACCEPT_ENCODING, "gzip".parse().unwrap());
        let backend = FixedBody(Bytes::from(vec![b'a'; 64]));
        let resp = mw.handle(req, &backend).await.unwrap();
        assert_eq!(resp.headers.get(http::header::CONTENT_ENCODING).unwrap(), "gzip");
        assert!(resp.body.len() < 64);
    }

    #[tokio::test]
    async fn leaves_small_body_uncompressed() {
        let mw = Compress::new(CompressSpec {
            min_response_body_bytes: 1024,
            excluded_content_types: vec![],
        });
        let mut req = test_request("/");
        req.headers
            .insert(http::header::ACCEPT_ENCODING, "gzip".parse().unwrap());
        let backend = FixedBody(Bytes::from_static(b"tiny"));
        let resp = mw.handle(req, &backend).await.unwrap();
        assert!(resp.headers.get(http::header::CONTENT_ENCODING).is_none());
    }
}
