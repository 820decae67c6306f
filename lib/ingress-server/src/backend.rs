//! The terminal [`Handler`] every compiled middleware chain ends in
//! (spec §4.8 "invoke the middleware pipeline with the selected
//! service's load balancer as the terminal handler"): selects a server
//! from the router's [`CompiledService`] tree and proxies the buffered
//! request to it over `hyper`.

use bytes::Bytes;
use http::{HeaderValue, Request, Uri};
use hyper::client::HttpConnector;
use hyper::{Body, Client};
use ingress_core::events::Event;
use ingress_lb::{CompiledService, LbError};
use ingress_metrics::Sink;
use ingress_middleware::{Handler, MiddlewareError, MiddlewareRequest, MiddlewareResponse};

/// Borrows the router's compiled service tree for the lifetime of one
/// dispatch: the caller already holds the `Arc<CompiledTable>` that
/// owns it for the whole request (spec §5 "a request observes a single
/// RoutingTable for its entire lifetime"), so this avoids an extra
/// refcount bump per request.
pub struct ServiceHandler<'a> {
    service_name: &'a str,
    service: &'a CompiledService,
    client: &'a Client<HttpConnector>,
    sink: &'a dyn Sink,
}

impl<'a> ServiceHandler<'a> {
    pub fn new(
        service_name: &'a str,
        service: &'a CompiledService,
        client: &'a Client<HttpConnector>,
        sink: &'a dyn Sink,
    ) -> Self {
        Self {
            service_name,
            service,
            client,
            sink,
        }
    }
}

#[async_trait::async_trait]
impl<'a> Handler for ServiceHandler<'a> {
    async fn call(&self, req: MiddlewareRequest) -> Result<MiddlewareResponse, MiddlewareError> {
        let cookie_header = req
            .headers
            .get(http::header::COOKIE)
            .and_then(|v| v.to_str().ok());

        let selection = self.service.select(cookie_header).map_err(|err| match err {
            LbError::ServiceUnavailable => {
                MiddlewareError::Unavailable("no healthy server available".to_string())
            }
        })?;

        self.sink.observe(Event::BackendSelected {
            service: self.service_name.to_string(),
            server: selection.endpoint.url.clone(),
        });

        let target = build_target_uri(&selection.endpoint.url, &req)
            .map_err(|err| MiddlewareError::Unavailable(err.to_string()))?;

        let mut builder = Request::builder().method(req.method.clone()).uri(target);
        *builder.headers_mut().unwrap() = req.headers.clone();
        if let Some(server_name) = selection.transport.as_ref().and_then(|t| t.server_name.as_ref()) {
            if let Ok(value) = HeaderValue::from_str(server_name) {
                builder.headers_mut().unwrap().insert(http::header::HOST, value);
            }
        }
        let outgoing = builder
            .body(Body::from(req.body))
            .expect("method/uri/headers already validated by the inbound request");

        let dial_timeout = selection.transport.as_ref().map(|t| t.dial_timeout);
        let request_fut = self.client.request(outgoing);
        let response = match dial_timeout {
            Some(timeout) => tokio::time::timeout(timeout, request_fut)
                .await
                .map_err(|_| MiddlewareError::Unavailable("backend dial timed out".to_string()))?
                .map_err(|err| MiddlewareError::Backend(Box::new(err)))?,
            None => request_fut
                .await
                .map_err(|err| MiddlewareError::Backend(Box::new(err)))?,
        };

        let status = response.status();
        let mut headers = response.headers().clone();
        let body = hyper::body::to_bytes(response.into_body())
            .await
            .map_err(|err| MiddlewareError::Backend(Box::new(err)))?;

        if let Some(cookie) = &selection.set_cookie {
            if let Ok(value) = HeaderValue::from_str(cookie) {
                headers.append(http::header::SET_COOKIE, value);
            }
        }

        Ok(MiddlewareResponse {
            status,
            headers,
            body,
        })
        // `selection.guard` drops here, releasing the inflight count
        // only once the response has been fully read (spec §4.6).
    }
}

fn build_target_uri(endpoint_url: &str, req: &MiddlewareRequest) -> Result<Uri, http::Error> {
    let base = endpoint_url.trim_end_matches('/');
    let path_and_query = req
        .uri
        .path_and_query()
        .map(|p| p.as_str())
        .unwrap_or("/");
    format!("{base}{path_and_query}").parse::<Uri>().map_err(Into::into)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_target_uri_joins_endpoint_and_path() {
        let req = MiddlewareRequest {
            method: http::Method::GET,
            uri: "/foo?x=1".parse().unwrap(),
            headers: http::HeaderMap::new(),
            body: Bytes::new(),
            client_ip: "127.0.0.1".parse().unwrap(),
            peer_certificate: None,
        };
        let uri = build_target_uri("http://10.0.0.1:8080", &req).unwrap();
        assert_eq!(uri.to_string(), "http://10.0.0.1:8080/foo?x=1");
    }
}
