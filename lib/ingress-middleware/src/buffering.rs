//! Buffering (spec §4.5: "bounded in-memory buffer for request and
//! response; retries require full request buffering"). Request/response
//! bodies already arrive as fully-buffered `Bytes` in this pipeline (see
//! `request.rs`), so this middleware's own job reduces to enforcing the
//! configured size caps — the buffering itself is ambient.

use crate::chain::{Handler, Middleware};
use crate::error::MiddlewareError;
use crate::request::{MiddlewareRequest, MiddlewareResponse};
use async_trait::async_trait;
use ingress_config::dynamic::Buffering as BufferingSpec;

pub struct Buffering {
    max_request_body_bytes: i64,
    max_response_body_bytes: i64,
}

impl Buffering {
    pub fn new(spec: BufferingSpec) -> Self {
        Self {
            max_request_body_bytes: spec.max_request_body_bytes,
            max_response_body_bytes: spec.max_response_body_bytes,
        }
    }
}

#[async_trait]
impl Middleware for Buffering {
    async fn handle(
        &self,
        req: MiddlewareRequest,
        next: &(dyn Handler + Sync),
    ) -> Result<MiddlewareResponse, MiddlewareError> {
        if self.max_request_body_bytes > 0 && req.body.len() as i64 > self.max_request_body_bytes {
            return Err(MiddlewareError::Unavailable(
                "request body exceeds configured buffer".to_string(),
            ));
        }
        let resp = next.call(req).await?;
        if self.max_response_body_bytes > 0
            && resp.body.len() as i64 > self.max_response_body_bytes
        {
            return Err(MiddlewareError::Unavailable(
                "response body exceeds configured buffer".to_string(),
            ));
        }
        Ok(resp)
    }

    fn kind(&self) -> &'static str {
        "buffering"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{test_request, AlwaysOk};

    #[tokio::test]
    async fn oversized_request_body_is_rejected() {
        let mw = Buffering::new(BufferingSpec {
            max_request_body_bytes: 4,
            mem_request_body_bytes: 0,
            max_response_body_bytes: 0,
            mem_response_body_bytes: 0,
            retry_expression: None,
        });
        let mut req = test_request("/");
        req.body = bytes::Bytes::from_static(b"too long");
        let result = mw.handle(req, &AlwaysOk).await;
        assert!(result.is_err());
    }
}
