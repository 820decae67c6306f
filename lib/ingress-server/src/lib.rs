//! Entry-point dispatcher (C8, spec §4.8): the component that turns a
//! `CompiledTable` served up by `ingress-switcher` into actual sockets.
//! HTTP priority-scan dispatch, TCP SNI demux/passthrough/termination,
//! and UDP session routing all live here.

#![deny(rust_2018_idioms)]

mod backend;
mod clients;
mod http;
mod sni;
mod tcp;
mod tls_certs;
mod udp;

pub use backend::ServiceHandler;
pub use clients::{HttpErrorPageBackend, HttpForwardAuthClient, HttpHealthProbe};
pub use http::{dispatch, find_router, serve as serve_http};
pub use sni::extract_sni;
pub use tcp::serve_entry_point as serve_tcp_entry_point;
pub use tls_certs::load_server_config;
pub use udp::serve_entry_point as serve_udp_entry_point;
