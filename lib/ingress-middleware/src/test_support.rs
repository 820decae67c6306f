//! Shared test fixtures for middleware unit tests.
#![cfg(test)]

use crate::chain::Handler;
use crate::error::MiddlewareError;
use crate::request::{MiddlewareRequest, MiddlewareResponse};
use async_trait::async_trait;
use bytes::Bytes;
use std::net::{IpAddr, Ipv4Addr};

pub fn test_request(path: &str) -> MiddlewareRequest {
    MiddlewareRequest {
        method: http::Method::GET,
        uri: path.parse().unwrap(),
        headers: http::HeaderMap::new(),
        body: Bytes::new(),
        client_ip: IpAddr::V4(Ipv4Addr::new(203, 0, 113, 7)),
        peer_certificate: None,
    }
}

pub struct EchoPath;

#[async_trait]
impl Handler for EchoPath {
    async fn call(&self, req: MiddlewareRequest) -> Result<MiddlewareResponse, MiddlewareError> {
        let mut resp = MiddlewareResponse::with_status(http::StatusCode::OK);
        resp.headers
            .insert("x-path", http::HeaderValue::from_str(req.path()).unwrap());
        Ok(resp)
    }
}

/// A backend that panics if called; for asserting a middleware
/// short-circuited instead of calling through.
pub struct NeverCalled;

#[async_trait]
impl Handler for NeverCalled {
    async fn call(&self, _req: MiddlewareRequest) -> Result<MiddlewareResponse, MiddlewareError> {
        panic!("backend should not have been called");
    }
}

/// A backend that always succeeds with 200 OK and an empty body.
pub struct AlwaysOk;

#[async_trait]
impl Handler for AlwaysOk {
    async fn call(&self, _req: MiddlewareRequest) -> Result<MiddlewareResponse, MiddlewareError> {
        Ok(MiddlewareResponse::with_status(http::StatusCode::OK))
    }
}
