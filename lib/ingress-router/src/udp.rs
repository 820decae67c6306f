//! Compiles the UDP section (spec §3: "UDP has no rules" — just an
//! entry-point → service mapping, validated against the service table).

use crate::diagnostics::{Diagnostic, Reason};
use ingress_config::dynamic::{lookup, NamedMap, UdpConfiguration, UdpService};

#[derive(Debug)]
pub struct CompiledUdpRouter {
    pub entry_points: Vec<String>,
    pub service: UdpService,
}

pub fn build(
    udp: &UdpConfiguration,
    diagnostics: &mut Vec<Diagnostic>,
) -> NamedMap<CompiledUdpRouter> {
    let mut compiled = NamedMap::new();
    for (name, router) in &udp.routers {
        match lookup(&udp.services, &router.service) {
            Some((_, service)) => {
                compiled.insert(
                    name.clone(),
                    CompiledUdpRouter {
                        entry_points: router.entry_points.clone(),
                        service: service.clone(),
                    },
                );
            }
            None => diagnostics.push(Diagnostic::new(
                name.clone(),
                Reason::MissingService(router.service.clone()),
            )),
        }
    }
    compiled
}
