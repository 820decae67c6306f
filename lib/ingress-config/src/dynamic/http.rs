use super::qualify::{qualify, qualify_reference};
use super::service::HttpService;
use super::{MiddlewareSpec, NamedMap};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HttpConfiguration {
    #[serde(default)]
    pub routers: NamedMap<HttpRouter>,
    #[serde(default)]
    pub services: NamedMap<HttpService>,
    #[serde(default)]
    pub middlewares: NamedMap<MiddlewareSpec>,
    #[serde(default)]
    pub transports: NamedMap<TransportSpec>,
}

impl HttpConfiguration {
    pub(super) fn qualified(&self, source: &str) -> Self {
        let routers = self
            .routers
            .iter()
            .map(|(name, router)| (qualify(name, source), router.qualified()))
            .collect();
        let services = self
            .services
            .iter()
            .map(|(name, svc)| (qualify(name, source), svc.qualified()))
            .collect();
        let middlewares = self
            .middlewares
            .iter()
            .map(|(name, mw)| (qualify(name, source), mw.qualified()))
            .collect();
        let transports = self
            .transports
            .iter()
            .map(|(name, t)| (qualify(name, source), t.clone()))
            .collect();
        Self {
            routers,
            services,
            middlewares,
            transports,
        }
    }
}

/// Per-backend transport settings, named and referenced from a
/// `LoadBalancerService.servers_transport` (spec §3: a fourth first-class
/// HTTP section alongside routers/services/middlewares).
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TransportSpec {
    #[serde(default)]
    pub server_name: Option<String>,
    #[serde(default)]
    pub insecure_skip_verify: bool,
    #[serde(default = "default_max_idle_conns_per_host")]
    pub max_idle_conns_per_host: u32,
    #[serde(
        default = "default_dial_timeout",
        with = "crate::label::scalars::duration"
    )]
    pub dial_timeout: Duration,
}

impl Default for TransportSpec {
    fn default() -> Self {
        Self {
            server_name: None,
            insecure_skip_verify: false,
            max_idle_conns_per_host: default_max_idle_conns_per_host(),
            dial_timeout: default_dial_timeout(),
        }
    }
}

fn default_max_idle_conns_per_host() -> u32 {
    200
}

fn default_dial_timeout() -> Duration {
    Duration::from_secs(30)
}

/// A rule-selected mapping from HTTP requests to a service, through a
/// middleware chain (spec §3 "Router").
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HttpRouter {
    #[serde(default)]
    pub entry_points: Vec<String>,
    pub rule: String,
    /// Explicit priority; `0` (the default) means "use `len(rule)`"
    /// (spec §4.4 step 3).
    #[serde(default)]
    pub priority: i64,
    #[serde(default)]
    pub tls: Option<RouterTls>,
    #[serde(default)]
    pub middlewares: Vec<String>,
    pub service: String,
    #[serde(default)]
    pub observability: Observability,
}

impl HttpRouter {
    fn qualified(&self) -> Self {
        Self {
            entry_points: self.entry_points.clone(),
            rule: self.rule.clone(),
            priority: self.priority,
            tls: self.tls.clone(),
            middlewares: self
                .middlewares
                .iter()
                .map(|m| qualify_reference(m))
                .collect(),
            service: qualify_reference(&self.service),
            observability: self.observability.clone(),
        }
    }

    /// The effective priority per spec §4.4 step 3: explicit value if
    /// `> 0`, else the rule expression's length.
    pub fn effective_priority(&self) -> i64 {
        if self.priority > 0 {
            self.priority
        } else {
            self.rule.len() as i64
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RouterTls {
    #[serde(default)]
    pub options: Option<String>,
    #[serde(default)]
    pub domains: Vec<TlsDomain>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TlsDomain {
    pub main: String,
    #[serde(default)]
    pub sans: Vec<String>,
}

/// Per-router observability toggles (spec §3 "observability toggles").
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Observability {
    #[serde(default = "default_true")]
    pub access_logs: bool,
    #[serde(default = "default_true")]
    pub metrics: bool,
    #[serde(default)]
    pub tracing: bool,
}

impl Default for Observability {
    fn default() -> Self {
        Self {
            access_logs: true,
            metrics: true,
            tracing: false,
        }
    }
}

fn default_true() -> bool {
    true
}
