use super::qualify::qualify_reference;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// A backend service, tagged over the four shapes spec §3 documents.
/// Exactly one variant is populated per named service, mirroring
/// `MiddlewareSpec`'s "exactly one variant is set per spec" discipline.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum HttpService {
    LoadBalancer(LoadBalancerService),
    Weighted(WeightedService),
    Mirroring(MirroringService),
    Failover(FailoverService),
}

impl HttpService {
    /// Qualifies every embedded reference to another named entity
    /// against `DEFAULT_SOURCE` (spec §9), never against the referencing
    /// service's own provider — see `qualify::qualify_reference`.
    pub(super) fn qualified(&self) -> Self {
        match self {
            HttpService::LoadBalancer(lb) => HttpService::LoadBalancer(LoadBalancerService {
                servers_transport: lb
                    .servers_transport
                    .as_ref()
                    .map(|t| qualify_reference(t)),
                ..lb.clone()
            }),
            HttpService::Weighted(w) => HttpService::Weighted(WeightedService {
                services: w
                    .services
                    .iter()
                    .map(|c| WeightedChild {
                        name: qualify_reference(&c.name),
                        weight: c.weight,
                    })
                    .collect(),
                sticky: w.sticky.clone(),
            }),
            HttpService::Mirroring(m) => HttpService::Mirroring(MirroringService {
                service: qualify_reference(&m.service),
                mirrors: m
                    .mirrors
                    .iter()
                    .map(|t| MirrorTarget {
                        name: qualify_reference(&t.name),
                        percent: t.percent,
                    })
                    .collect(),
                mirror_body: m.mirror_body,
                max_body_size: m.max_body_size,
            }),
            HttpService::Failover(f) => HttpService::Failover(FailoverService {
                service: qualify_reference(&f.service),
                fallback: qualify_reference(&f.fallback),
            }),
        }
    }

    /// The set of child service names this node directly references
    /// (spec §4.4 step 5: "recurse until all leaves are LoadBalancer").
    pub fn children(&self) -> Vec<&str> {
        match self {
            HttpService::LoadBalancer(_) => vec![],
            HttpService::Weighted(w) => w.services.iter().map(|c| c.name.as_str()).collect(),
            HttpService::Mirroring(m) => {
                let mut names = vec![m.service.as_str()];
                names.extend(m.mirrors.iter().map(|t| t.name.as_str()));
                names
            }
            HttpService::Failover(f) => vec![f.service.as_str(), f.fallback.as_str()],
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoadBalancerService {
    pub servers: Vec<Server>,
    #[serde(default)]
    pub sticky: Option<StickyConfig>,
    #[serde(default)]
    pub health_check: Option<HealthCheckSpec>,
    #[serde(default)]
    pub strategy: LbStrategy,
    #[serde(default)]
    pub pass_host_header: bool,
    #[serde(default, with = "crate::label::scalars::opt_duration")]
    pub response_forwarding_flush_interval: Option<Duration>,
    #[serde(default)]
    pub servers_transport: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Server {
    pub url: String,
    #[serde(default = "default_weight")]
    pub weight: u32,
}

fn default_weight() -> u32 {
    1
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LbStrategy {
    #[default]
    Wrr,
    P2c,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StickyConfig {
    pub cookie_name: String,
    #[serde(default)]
    pub secure: bool,
    #[serde(default)]
    pub http_only: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HealthCheckSpec {
    #[serde(default = "default_health_path")]
    pub path: String,
    #[serde(default = "default_health_interval", with = "crate::label::scalars::duration")]
    pub interval: Duration,
    #[serde(
        default = "default_health_unhealthy_interval",
        with = "crate::label::scalars::duration"
    )]
    pub unhealthy_interval: Duration,
    #[serde(default = "default_health_timeout", with = "crate::label::scalars::duration")]
    pub timeout: Duration,
    #[serde(default)]
    pub follow_redirects: bool,
    #[serde(default = "default_accepted_status")]
    pub accepted_status_codes: Vec<u16>,
    #[serde(default)]
    pub method: Option<String>,
}

fn default_health_path() -> String {
    "/".to_string()
}
fn default_health_interval() -> Duration {
    Duration::from_secs(30)
}
fn default_health_unhealthy_interval() -> Duration {
    Duration::from_secs(30)
}
fn default_health_timeout() -> Duration {
    Duration::from_secs(5)
}
fn default_accepted_status() -> Vec<u16> {
    vec![200]
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WeightedService {
    pub services: Vec<WeightedChild>,
    #[serde(default)]
    pub sticky: Option<StickyConfig>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WeightedChild {
    pub name: String,
    pub weight: u32,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MirroringService {
    pub service: String,
    #[serde(default)]
    pub mirrors: Vec<MirrorTarget>,
    #[serde(default)]
    pub mirror_body: bool,
    #[serde(default)]
    pub max_body_size: Option<i64>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MirrorTarget {
    pub name: String,
    pub percent: u8,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FailoverService {
    pub service: String,
    pub fallback: String,
}
