//! The dynamic configuration tree (spec §3): the `Snapshot` a single
//! provider emits, sectioned into HTTP, TCP, UDP and TLS.

mod http;
mod middleware;
mod qualify;
mod service;
mod tcp;
mod tls;
mod udp;

pub use http::{HttpConfiguration, HttpRouter, Observability, RouterTls, TlsDomain, TransportSpec};
pub use middleware::MiddlewareSpec;
pub use qualify::{lookup, qualify, qualify_reference, split_qualifier, DEFAULT_SOURCE};
pub use service::{
    FailoverService, HealthCheckSpec, HttpService, LbStrategy, LoadBalancerService,
    MirrorTarget, MirroringService, Server, StickyConfig, WeightedChild, WeightedService,
};
pub use tcp::{
    TcpConfiguration, TcpLoadBalancerService, TcpRouter, TcpRouterTls, TcpService,
    TcpWeightedChild,
};
pub use tls::{Certificate, CertificateEntry, GeneratedCert, Store, TlsConfiguration, TlsOptions};
pub use udp::{UdpConfiguration, UdpRouter, UdpService};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// The unit of configuration handed between the aggregator and the
/// router builder. Names inside every section are unqualified as
/// authored by the provider; the aggregator is responsible for
/// qualifying them with `@<source>` on ingress (spec §3, §9).
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Snapshot {
    /// Stable identifier of the provider that emitted this snapshot
    /// (`file`, `kv`, `consul`, ...). Not itself part of the wire
    /// schema: set by the provider adapter, not parsed from labels.
    #[serde(skip)]
    pub source: String,

    #[serde(default)]
    pub http: HttpConfiguration,
    #[serde(default)]
    pub tcp: TcpConfiguration,
    #[serde(default)]
    pub udp: UdpConfiguration,
    #[serde(default)]
    pub tls: TlsConfiguration,
}

impl Snapshot {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            ..Default::default()
        }
    }

    /// Returns a copy of this snapshot with every name in every section
    /// qualified as `name@source`, per spec §3/§9. Idempotent: names that
    /// already carry a qualifier are left untouched.
    pub fn qualified(&self) -> Self {
        let source = &self.source;
        Snapshot {
            source: self.source.clone(),
            http: self.http.qualified(source),
            tcp: self.tcp.qualified(source),
            udp: self.udp.qualified(source),
            tls: self.tls.clone(),
        }
    }
}

/// A generic, order-preserving name → value map, matching the provider
/// wire contract's requirement that sections are sent in full (spec §6).
pub type NamedMap<V> = IndexMap<String, V>;
