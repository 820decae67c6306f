//! The router builder (C4, spec §4.4): compiles one merged `Snapshot`
//! into an immutable `RoutingTable` plus a non-fatal diagnostics list.
//! Generalizes the teacher's `linkerd2-router` keyed-dispatch idiom
//! (extract a key, look up a downstream service) into a full multi-stage
//! build pipeline: validate/resolve, compile rules, sort by priority,
//! splice middleware chains, compile the service graph, resolve TLS,
//! and index TCP SNI routers.

#![deny(rust_2018_idioms)]

mod diagnostics;
mod http;
mod middleware;
mod service;
mod table;
mod tcp;
mod tls;
mod udp;

pub use diagnostics::{Diagnostic, Reason};
pub use http::CompiledHttpRouter;
pub use middleware::MiddlewareResolveError;
pub use service::{resolve, ResolvedService, ServiceResolveError};
pub use table::{build, RoutingTable};
pub use tcp::{CompiledTcp, CompiledTcpRouter};
pub use udp::CompiledUdpRouter;
