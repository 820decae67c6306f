//! Compiles the TCP section of a merged Snapshot (spec §4.4 step 7):
//! priority-ordered routers plus an SNI→router fast-path index for
//! routers whose rule is exactly `HostSNI(...)`.

use crate::diagnostics::{Diagnostic, Reason};
use ingress_config::dynamic::{lookup, TcpConfiguration, TcpRouterTls, TcpService};
use ingress_rules::Rule;
use indexmap::IndexMap;

#[derive(Debug)]
pub struct CompiledTcpRouter {
    pub name: String,
    pub entry_points: Vec<String>,
    pub rule: Rule,
    pub priority: i64,
    pub tls: Option<TcpRouterTls>,
    pub service: TcpService,
}

pub struct CompiledTcp {
    pub routers: Vec<CompiledTcpRouter>,
    /// SNI value -> index into `routers`, for the O(1) fast path (spec
    /// §4.4 step 7). Only populated for `HostSNI(...)`-only rules.
    pub sni_index: IndexMap<String, usize>,
}

pub fn build(tcp: &TcpConfiguration, diagnostics: &mut Vec<Diagnostic>) -> CompiledTcp {
    let mut compiled = Vec::new();

    for (name, router) in &tcp.routers {
        let service = match lookup(&tcp.services, &router.service) {
            Some((_, service)) => service.clone(),
            None => {
                diagnostics.push(Diagnostic::new(
                    name.clone(),
                    Reason::MissingService(router.service.clone()),
                ));
                continue;
            }
        };
        let rule = match ingress_rules::parse(&router.rule) {
            Ok(rule) => rule,
            Err(err) => {
                diagnostics.push(Diagnostic::new(name.clone(), Reason::SyntaxError(err.to_string())));
                continue;
            }
        };
        compiled.push(CompiledTcpRouter {
            name: name.clone(),
            entry_points: router.entry_points.clone(),
            rule,
            priority: router.effective_priority(),
            tls: router.tls.clone(),
            service,
        });
    }

    compiled.sort_by(|a, b| b.priority.cmp(&a.priority).then_with(|| a.name.cmp(&b.name)));

    let mut sni_index = IndexMap::new();
    for (idx, router) in compiled.iter().enumerate() {
        let original = &tcp.routers[&router.name];
        if original.is_sni_only() {
            if let Some(sni) = extract_sni_literal(&original.rule) {
                sni_index.insert(sni, idx);
            }
        }
    }

    CompiledTcp {
        routers: compiled,
        sni_index,
    }
}

/// Pulls the single backtick-quoted literal out of a `HostSNI(`host`)`
/// rule for the direct index lookup; multi-argument `HostSNI` rules
/// fall back to the linear scan since they don't map to one key.
fn extract_sni_literal(rule: &str) -> Option<String> {
    let inner = rule.trim().strip_prefix("HostSNI(")?.strip_suffix(')')?;
    let mut parts = inner.split(',');
    let only = parts.next()?.trim();
    if parts.next().is_some() {
        return None;
    }
    only.strip_prefix('`')?.strip_suffix('`').map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ingress_config::dynamic::{Server, TcpLoadBalancerService};

    fn lb_service() -> TcpService {
        TcpService::LoadBalancer(TcpLoadBalancerService {
            servers: vec![Server {
                url: "10.0.0.1:443".to_string(),
                weight: 1,
            }],
            health_check: None,
            strategy: Default::default(),
            sticky: None,
        })
    }

    #[test]
    fn builds_sni_index_for_host_sni_only_rules() {
        let mut tcp = TcpConfiguration::default();
        tcp.services.insert("svc".to_string(), lb_service());
        tcp.routers.insert(
            "web".to_string(),
            ingress_config::dynamic::TcpRouter {
                entry_points: vec!["websecure".to_string()],
                rule: "HostSNI(`a.com`)".to_string(),
                priority: 0,
                tls: None,
                service: "svc".to_string(),
            },
        );
        let mut diagnostics = Vec::new();
        let compiled = build(&tcp, &mut diagnostics);
        assert!(diagnostics.is_empty());
        assert_eq!(compiled.sni_index.get("a.com"), Some(&0));
    }
}
