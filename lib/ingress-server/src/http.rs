//! HTTP dispatch (spec §4.8 "HTTP path"): priority scan over the active
//! `CompiledTable`, middleware pipeline, backend dial.

use crate::backend::ServiceHandler;
use http::{HeaderMap, Request, Response, StatusCode};
use hyper::client::HttpConnector;
use hyper::{Body, Client};
use ingress_core::events::Event;
use ingress_middleware::{MiddlewareRequest, MiddlewareResponse};
use ingress_metrics::Sink;
use ingress_rules::MatchContext;
use ingress_switcher::{CompiledRouter, CompiledTable};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::io::{AsyncRead, AsyncWrite};

/// First router (already priority-sorted by the router builder, spec
/// §4.4 step 3) whose rule matches `ctx` wins (spec §4.8 "first matching
/// router wins").
pub fn find_router<'a>(
    routers: &'a [CompiledRouter],
    ctx: &MatchContext<'_>,
) -> Option<&'a CompiledRouter> {
    routers.iter().find(|r| ingress_rules::matches(&r.rule, ctx))
}

/// Handles one decoded HTTP request against `table`, returning the
/// response to write back to the client. Publishes the request-lifecycle
/// events SPEC_FULL.md §4's ambient observability hook and §6's access
/// log both key off (`RouteMatched`/`RouteNotMatched`, `BackendSelected`
/// via `ServiceHandler`, `RequestCompleted`), gated per-router by the
/// router's `Observability` flags (spec §4.4 `observability`).
pub async fn dispatch(
    table: &CompiledTable,
    client: &Client<HttpConnector>,
    sink: &dyn Sink,
    entry_point: &str,
    remote_addr: SocketAddr,
    req: Request<Body>,
) -> Response<Body> {
    let started = Instant::now();
    let (parts, body) = req.into_parts();
    let body = match hyper::body::to_bytes(body).await {
        Ok(bytes) => bytes,
        Err(_) => return response_from(MiddlewareResponse::with_status(StatusCode::BAD_REQUEST)),
    };

    let host = host_header(&parts.headers).unwrap_or_default();
    let path = parts.uri.path().to_string();
    let query = parts.uri.query().unwrap_or("").to_string();
    let ctx = MatchContext {
        host: &host,
        path: &path,
        method: &parts.method,
        headers: &parts.headers,
        query: &query,
        client_ip: remote_addr.ip(),
    };

    let Some(router) = find_router(&table.http, &ctx) else {
        sink.observe(Event::RouteNotMatched {
            entry_point: entry_point.to_string(),
        });
        return response_from(MiddlewareResponse::with_status(StatusCode::NOT_FOUND));
    };

    if router.observability.metrics {
        sink.observe(Event::RouteMatched {
            router: router.name.clone(),
            entry_point: entry_point.to_string(),
        });
    }

    let mw_request = MiddlewareRequest {
        method: parts.method,
        uri: parts.uri,
        headers: parts.headers,
        body,
        client_ip: remote_addr.ip(),
        peer_certificate: None,
    };

    let backend = ServiceHandler::new(&router.service_name, &router.service, client, sink);
    let result = router.chain.dispatch(mw_request, &backend).await;
    let response = match &result {
        Ok(resp) => resp.status,
        Err(err) => err.status(),
    };

    if router.observability.access_logs {
        sink.observe(Event::RequestCompleted {
            router: router.name.clone(),
            service: router.service_name.clone(),
            entry_point: entry_point.to_string(),
            status: response.as_u16(),
            elapsed: started.elapsed(),
        });
    }

    match result {
        Ok(resp) => response_from(resp),
        Err(err) => response_from(MiddlewareResponse::with_status(err.status())),
    }
}

fn host_header(headers: &HeaderMap) -> Option<String> {
    headers
        .get(http::header::HOST)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
}

fn response_from(resp: MiddlewareResponse) -> Response<Body> {
    let mut builder = Response::builder().status(resp.status);
    *builder.headers_mut().unwrap() = resp.headers;
    builder
        .body(Body::from(resp.body))
        .unwrap_or_else(|_| Response::new(Body::empty()))
}

/// Per-entry-point HTTP server: accepts already-decrypted (or plaintext)
/// streams and runs `dispatch` against the currently published table on
/// every request.
pub async fn serve<S>(
    table_source: Arc<ingress_switcher::Switcher>,
    client: Client<HttpConnector>,
    sink: Arc<dyn Sink>,
    entry_point: String,
    stream: S,
    remote_addr: SocketAddr,
) where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let service = hyper::service::service_fn(move |req: Request<Body>| {
        let table_source = table_source.clone();
        let client = client.clone();
        let sink = sink.clone();
        let entry_point = entry_point.clone();
        async move {
            let table = table_source.current();
            let resp = dispatch(&table, &client, sink.as_ref(), &entry_point, remote_addr, req).await;
            Ok::<_, std::convert::Infallible>(resp)
        }
    });

    if let Err(err) = hyper::server::conn::Http::new()
        .serve_connection(stream, service)
        .await
    {
        tracing::debug!(%err, "http connection closed with error");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ingress_config::dynamic::Observability;

    fn router(name: &str, rule: &str, priority: i64) -> CompiledRouter {
        CompiledRouter {
            name: name.to_string(),
            entry_points: vec!["web".to_string()],
            rule: ingress_rules::parse(rule).unwrap(),
            priority,
            tls: None,
            chain: ingress_middleware::Chain::new(Vec::new()),
            service_name: format!("{name}-svc"),
            service: ingress_lb::CompiledService::LoadBalancer(Arc::new(
                ingress_lb::LoadBalancer::new(&ingress_config::dynamic::LoadBalancerService {
                    servers: vec![ingress_config::dynamic::Server {
                        url: "http://127.0.0.1:0".to_string(),
                        weight: 1,
                    }],
                    sticky: None,
                    health_check: None,
                    strategy: Default::default(),
                    pass_host_header: false,
                    response_forwarding_flush_interval: None,
                    servers_transport: None,
                }, None),
            )),
            observability: Observability::default(),
        }
    }

    fn ctx<'a>(host: &'a str, path: &'a str, headers: &'a HeaderMap, query: &'a str) -> MatchContext<'a> {
        MatchContext {
            host,
            path,
            method: &http::Method::GET,
            headers,
            query,
            client_ip: "127.0.0.1".parse().unwrap(),
        }
    }

    #[test]
    fn first_matching_router_by_priority_order_wins() {
        let routers = vec![router("a", "Host(`x`)", 10), router("b", "Host(`x`)", 0)];
        let headers = HeaderMap::new();
        let matched = find_router(&routers, &ctx("x", "/", &headers, "")).unwrap();
        assert_eq!(matched.name, "a");
    }

    #[test]
    fn no_match_returns_none() {
        let routers = vec![router("a", "Host(`x`)", 0)];
        let headers = HeaderMap::new();
        assert!(find_router(&routers, &ctx("y", "/", &headers, "")).is_none());
    }
}
