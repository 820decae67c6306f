use super::qualify::{qualify, qualify_reference};
use super::{HealthCheckSpec, LbStrategy, NamedMap, Server, StickyConfig};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TcpConfiguration {
    #[serde(default)]
    pub routers: NamedMap<TcpRouter>,
    #[serde(default)]
    pub services: NamedMap<TcpService>,
}

impl TcpConfiguration {
    pub(super) fn qualified(&self, source: &str) -> Self {
        let routers = self
            .routers
            .iter()
            .map(|(name, r)| {
                (
                    qualify(name, source),
                    TcpRouter {
                        entry_points: r.entry_points.clone(),
                        rule: r.rule.clone(),
                        priority: r.priority,
                        tls: r.tls.clone(),
                        service: qualify_reference(&r.service),
                    },
                )
            })
            .collect();
        let services = self
            .services
            .iter()
            .map(|(name, s)| (qualify(name, source), s.clone()))
            .collect();
        Self { routers, services }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TcpRouter {
    #[serde(default)]
    pub entry_points: Vec<String>,
    pub rule: String,
    #[serde(default)]
    pub priority: i64,
    #[serde(default)]
    pub tls: Option<TcpRouterTls>,
    pub service: String,
}

impl TcpRouter {
    pub fn effective_priority(&self) -> i64 {
        if self.priority > 0 {
            self.priority
        } else {
            self.rule.len() as i64
        }
    }

    /// Whether this router's rule is exactly `HostSNI(...)`, making it
    /// eligible for the O(1) SNI index (spec §4.4 step 7).
    pub fn is_sni_only(&self) -> bool {
        let trimmed = self.rule.trim();
        trimmed.starts_with("HostSNI(") && trimmed.ends_with(')')
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TcpRouterTls {
    #[serde(default)]
    pub passthrough: bool,
    #[serde(default)]
    pub options: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TcpService {
    LoadBalancer(TcpLoadBalancerService),
    Weighted(Vec<TcpWeightedChild>),
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TcpLoadBalancerService {
    pub servers: Vec<Server>,
    #[serde(default)]
    pub health_check: Option<HealthCheckSpec>,
    #[serde(default)]
    pub strategy: LbStrategy,
    #[serde(default)]
    pub sticky: Option<StickyConfig>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TcpWeightedChild {
    pub name: String,
    pub weight: u32,
}
