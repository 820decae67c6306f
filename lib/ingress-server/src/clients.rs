//! Production backends for the two external services a compiled
//! middleware chain can call into (spec §4.5 ForwardAuth/Errors):
//! `ingress-middleware` only defines the traits, since it has no
//! dependency on an HTTP client or the compiled service graph (see that
//! crate's `build.rs`/`errorpage.rs` doc comments) — this crate supplies
//! the real implementations, grounded on the same dial-and-buffer shape
//! as `backend.rs`'s `ServiceHandler`.

use bytes::Bytes;
use http::{HeaderName, Request};
use hyper::client::HttpConnector;
use hyper::{Body, Client};
use ingress_config::dynamic::{lookup, HealthCheckSpec};
use ingress_lb::{HealthProbe, LbError};
use ingress_middleware::{ErrorPageBackend, ForwardAuthClient, MiddlewareError, MiddlewareRequest, MiddlewareResponse};
use ingress_switcher::Switcher;
use std::str::FromStr;

/// Dials a configured auth address with a subset of the inbound
/// request's headers and relays its response verbatim (spec §4.5 "on
/// 2xx, copies authorized response headers ...; on non-2xx, relays that
/// response").
pub struct HttpForwardAuthClient {
    client: Client<HttpConnector>,
}

impl HttpForwardAuthClient {
    pub fn new(client: Client<HttpConnector>) -> Self {
        Self { client }
    }
}

#[async_trait::async_trait]
impl ForwardAuthClient for HttpForwardAuthClient {
    async fn authorize(
        &self,
        address: &str,
        req: &MiddlewareRequest,
        forward_headers: &[String],
    ) -> Result<MiddlewareResponse, MiddlewareError> {
        let mut builder = Request::builder().method(req.method.clone()).uri(address);
        let headers = builder.headers_mut().expect("builder not yet finalized");
        for name in forward_headers {
            if let Ok(header_name) = HeaderName::from_bytes(name.as_bytes()) {
                if let Some(value) = req.headers.get(&header_name) {
                    headers.insert(header_name, value.clone());
                }
            }
        }

        let outgoing = builder
            .body(Body::empty())
            .map_err(|err| MiddlewareError::Unavailable(err.to_string()))?;

        let response = self
            .client
            .request(outgoing)
            .await
            .map_err(|err| MiddlewareError::Backend(Box::new(err)))?;

        let status = response.status();
        let headers = response.headers().clone();
        let body = hyper::body::to_bytes(response.into_body())
            .await
            .map_err(|err| MiddlewareError::Backend(Box::new(err)))?;

        Ok(MiddlewareResponse { status, headers, body })
    }
}

/// Resolves `service` against the currently published table's
/// independently-compiled service map and dials it the same way the
/// dispatcher dials a router's backend.
///
/// Holds a `Weak` handle rather than an `Arc`: the very first
/// `CompiledTable` a `Switcher` is constructed from is itself compiled
/// with this backend already wired into its `BuildContext` (in case the
/// first snapshot already references `errors` middleware), before the
/// `Switcher` exists to be pointed at. `main` bootstraps this with
/// `Arc::new_cyclic`; the upgrade only ever fails during that brief
/// construction window, and `fetch` degrades to `Unavailable`.
pub struct HttpErrorPageBackend {
    switcher: std::sync::Weak<Switcher>,
    client: Client<HttpConnector>,
}

impl HttpErrorPageBackend {
    pub fn new(switcher: std::sync::Weak<Switcher>, client: Client<HttpConnector>) -> Self {
        Self { switcher, client }
    }
}

#[async_trait::async_trait]
impl ErrorPageBackend for HttpErrorPageBackend {
    async fn fetch(
        &self,
        service: &str,
        query: Option<&str>,
        original: &MiddlewareResponse,
    ) -> Result<MiddlewareResponse, MiddlewareError> {
        let switcher = self
            .switcher
            .upgrade()
            .ok_or_else(|| MiddlewareError::Unavailable("dispatcher not yet ready".to_string()))?;
        let table = switcher.current();
        let (_, compiled) = lookup(&table.services, service)
            .ok_or_else(|| MiddlewareError::Unavailable(format!("unknown error page service `{service}`")))?;

        let selection = compiled.select(None).map_err(|err| match err {
            LbError::ServiceUnavailable => {
                MiddlewareError::Unavailable("no healthy error page backend".to_string())
            }
        })?;

        let path_and_query = match query {
            Some(q) => format!("/?{q}"),
            None => "/".to_string(),
        };
        let uri = format!("{}{path_and_query}", selection.endpoint.url.trim_end_matches('/'));

        let outgoing = Request::builder()
            .method(http::Method::GET)
            .uri(uri)
            .body(Body::empty())
            .map_err(|err| MiddlewareError::Unavailable(err.to_string()))?;

        let response = self
            .client
            .request(outgoing)
            .await
            .map_err(|err| MiddlewareError::Backend(Box::new(err)))?;

        let status = response.status();
        let headers = response.headers().clone();
        let body: Bytes = hyper::body::to_bytes(response.into_body())
            .await
            .map_err(|err| MiddlewareError::Backend(Box::new(err)))?;

        let _ = original;
        Ok(MiddlewareResponse { status, headers, body })
    }
}

/// Issues one probe per spec §4.6's health-check contract. `run()` in
/// `ingress-lb::health` already wraps this call in its own `timeout` and
/// interval scheduling, so this only needs to dial, optionally follow a
/// bounded chain of redirects, and check the status against
/// `accepted_status_codes`.
pub struct HttpHealthProbe {
    client: Client<HttpConnector>,
}

const MAX_REDIRECTS: u8 = 10;

impl HttpHealthProbe {
    pub fn new(client: Client<HttpConnector>) -> Self {
        Self { client }
    }
}

#[async_trait::async_trait]
impl HealthProbe for HttpHealthProbe {
    async fn probe(&self, url: &str, spec: &HealthCheckSpec) -> bool {
        let method = match spec.method.as_deref() {
            Some(raw) => match http::Method::from_bytes(raw.as_bytes()) {
                Ok(method) => method,
                Err(_) => {
                    tracing::warn!(method = raw, "invalid health check method, defaulting to GET");
                    http::Method::GET
                }
            },
            None => http::Method::GET,
        };

        let mut target = format!("{}{}", url.trim_end_matches('/'), spec.path);

        for _ in 0..=MAX_REDIRECTS {
            let request = match Request::builder().method(method.clone()).uri(&target).body(Body::empty()) {
                Ok(request) => request,
                Err(err) => {
                    tracing::debug!(url = %target, %err, "health check request failed to build");
                    return false;
                }
            };

            let response = match self.client.request(request).await {
                Ok(response) => response,
                Err(err) => {
                    tracing::debug!(url = %target, %err, "health check request failed");
                    return false;
                }
            };

            let status = response.status();
            if spec.follow_redirects && status.is_redirection() {
                let Some(location) = response
                    .headers()
                    .get(http::header::LOCATION)
                    .and_then(|value| value.to_str().ok())
                else {
                    return false;
                };
                target = match http::Uri::from_str(location) {
                    Ok(uri) if uri.scheme().is_some() => uri.to_string(),
                    _ => format!("{}{}", target.trim_end_matches(&spec.path), location),
                };
                continue;
            }

            return spec.accepted_status_codes.contains(&status.as_u16());
        }

        tracing::debug!(url = %target, "health check exceeded redirect limit");
        false
    }
}
