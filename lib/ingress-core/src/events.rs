//! Structured observability events published by the dispatch path.
//!
//! The core never formats or exports these (per spec §6): it only
//! publishes them to whatever `Sink` the caller installs. See
//! `ingress-metrics::Sink` for the default implementation.

use std::time::Duration;

#[derive(Clone, Debug)]
#[allow(clippy::large_enum_variant)]
pub enum Event {
    /// A request matched a router and is about to enter its middleware
    /// pipeline.
    RouteMatched {
        router: String,
        entry_point: String,
    },
    /// No router matched the request (HTTP 404 / TCP connection close).
    RouteNotMatched { entry_point: String },
    /// A middleware is about to run, in declaration order.
    MiddlewareEnter { router: String, middleware: String },
    /// A middleware has finished running.
    MiddlewareExit {
        router: String,
        middleware: String,
        elapsed: Duration,
    },
    /// The load balancer selected a backend for a request.
    BackendSelected {
        service: String,
        server: String,
    },
    /// The router builder produced a non-fatal diagnostic for a snapshot
    /// object (§4.4, §7 `ConfigError`).
    BuilderDiagnostic {
        object: String,
        message: String,
    },
    /// A request/connection finished being served.
    RequestCompleted {
        router: String,
        service: String,
        entry_point: String,
        status: u16,
        elapsed: Duration,
    },
}
