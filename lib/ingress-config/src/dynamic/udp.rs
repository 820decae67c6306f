use super::qualify::{qualify, qualify_reference};
use super::{NamedMap, Server};
use serde::{Deserialize, Serialize};

/// UDP has no rules (spec §3): routers only name the entry points they
/// bind and the service they forward to.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UdpConfiguration {
    #[serde(default)]
    pub routers: NamedMap<UdpRouter>,
    #[serde(default)]
    pub services: NamedMap<UdpService>,
}

impl UdpConfiguration {
    pub(super) fn qualified(&self, source: &str) -> Self {
        let routers = self
            .routers
            .iter()
            .map(|(name, r)| {
                (
                    qualify(name, source),
                    UdpRouter {
                        entry_points: r.entry_points.clone(),
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
pub struct UdpRouter {
    #[serde(default)]
    pub entry_points: Vec<String>,
    pub service: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UdpService {
    pub servers: Vec<Server>,
}
