//! The router builder's top-level entry point (C4): compiles one merged
//! [`Snapshot`] into one immutable [`RoutingTable`] plus diagnostics.

use crate::diagnostics::Diagnostic;
use crate::http::{self, CompiledHttpRouter};
use crate::tcp::{self, CompiledTcp};
use crate::udp::{self, CompiledUdpRouter};
use ingress_config::dynamic::NamedMap;
use ingress_config::Snapshot;

/// The immutable output of a build, owned by the switcher (C7) between
/// installs and held read-only by the dispatcher (C8) for the duration
/// of a request (spec §3 "Ownership").
pub struct RoutingTable {
    pub http: Vec<CompiledHttpRouter>,
    pub tcp: CompiledTcp,
    pub udp: NamedMap<CompiledUdpRouter>,
}

impl RoutingTable {
    pub fn empty() -> Self {
        Self {
            http: Vec::new(),
            tcp: CompiledTcp {
                routers: Vec::new(),
                sni_index: Default::default(),
            },
            udp: NamedMap::new(),
        }
    }
}

/// Builds a [`RoutingTable`] from `snapshot` (spec §4.4). Unusable
/// routers are omitted and reported as diagnostics rather than failing
/// the whole build.
pub fn build(snapshot: &Snapshot) -> (RoutingTable, Vec<Diagnostic>) {
    let mut diagnostics = Vec::new();
    let http = http::build(&snapshot.http, &snapshot.tls, &mut diagnostics);
    let tcp = tcp::build(&snapshot.tcp, &mut diagnostics);
    let udp = udp::build(&snapshot.udp, &mut diagnostics);
    tracing::debug!(
        http_routers = http.len(),
        tcp_routers = tcp.routers.len(),
        udp_routers = udp.len(),
        diagnostics = diagnostics.len(),
        "compiled routing table"
    );
    (RoutingTable { http, tcp, udp }, diagnostics)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ingress_config::dynamic::{HttpRouter, HttpService, LoadBalancerService, Observability, Server};

    fn router(name_service: &str, rule: &str, priority: i64) -> HttpRouter {
        HttpRouter {
            entry_points: vec!["web".to_string()],
            rule: rule.to_string(),
            priority,
            tls: None,
            middlewares: vec![],
            service: name_service.to_string(),
            observability: Observability::default(),
        }
    }

    fn lb() -> HttpService {
        HttpService::LoadBalancer(LoadBalancerService {
            servers: vec![Server {
                url: "http://127.0.0.1:80".to_string(),
                weight: 1,
            }],
            sticky: None,
            health_check: None,
            strategy: Default::default(),
            pass_host_header: false,
            response_forwarding_flush_interval: None,
            servers_transport: None,
        })
    }

    /// Scenario S1 (spec §8): one router, one service, one server.
    #[test]
    fn builds_single_router_from_snapshot() {
        let mut snapshot = Snapshot::new("file");
        snapshot
            .http
            .routers
            .insert("R".to_string(), router("S", "Host(`a`)", 0));
        snapshot.http.services.insert("S".to_string(), lb());

        let (table, diagnostics) = build(&snapshot);
        assert!(diagnostics.is_empty());
        assert_eq!(table.http.len(), 1);
        assert_eq!(table.http[0].name, "R");
    }

    /// Scenario S2 (spec §8): identical rule/priority, names "a" before
    /// "b" (lexicographic tie-break).
    #[test]
    fn tie_break_orders_by_name() {
        let mut snapshot = Snapshot::new("file");
        snapshot
            .http
            .routers
            .insert("b".to_string(), router("S", "Host(`x`)", 0));
        snapshot
            .http
            .routers
            .insert("a".to_string(), router("S", "Host(`x`)", 0));
        snapshot.http.services.insert("S".to_string(), lb());

        let (table, _diagnostics) = build(&snapshot);
        assert_eq!(table.http[0].name, "a");
        assert_eq!(table.http[1].name, "b");
    }

    #[test]
    fn missing_service_yields_diagnostic_and_omits_router() {
        let mut snapshot = Snapshot::new("file");
        snapshot
            .http
            .routers
            .insert("R".to_string(), router("missing", "Host(`a`)", 0));

        let (table, diagnostics) = build(&snapshot);
        assert!(table.http.is_empty());
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].router, "R");
    }
}
