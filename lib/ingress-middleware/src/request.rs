//! The value types every compiled middleware operates on. Bodies are
//! fully buffered `Bytes` rather than a streaming `http_body::Body`: the
//! spec's own Retry/Buffering semantics require full request/response
//! buffering for retries and body rewriting, so there is no streaming
//! fast path to preserve here (spec §4.5 "Buffering").

use bytes::Bytes;
use http::{HeaderMap, Method, StatusCode, Uri};
use std::net::IpAddr;

#[derive(Clone, Debug)]
pub struct MiddlewareRequest {
    pub method: Method,
    pub uri: Uri,
    pub headers: HeaderMap,
    pub body: Bytes,
    pub client_ip: IpAddr,
    /// DER-encoded leaf certificate, present when the connection terminated
    /// with client-certificate TLS (spec §4.5 "PassTLSClientCert").
    pub peer_certificate: Option<Vec<u8>>,
}

impl MiddlewareRequest {
    pub fn path(&self) -> &str {
        self.uri.path()
    }

    /// Replaces the request's path, preserving the query string.
    pub fn set_path(&mut self, path: &str) {
        let query = self.uri.query();
        let path_and_query = match query {
            Some(q) => format!("{path}?{q}"),
            None => path.to_string(),
        };
        let mut parts = self.uri.clone().into_parts();
        parts.path_and_query = path_and_query.parse().ok();
        if let Ok(uri) = Uri::from_parts(parts) {
            self.uri = uri;
        }
    }
}

#[derive(Clone, Debug)]
pub struct MiddlewareResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl MiddlewareResponse {
    pub fn with_status(status: StatusCode) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }
}
