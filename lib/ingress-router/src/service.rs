//! Service graph compilation (spec §4.4 step 5): recursively resolves
//! *Weighted*/*Mirroring*/*Failover* service descriptors down to
//! `LoadBalancer` leaves, capped at recursion depth 32.

use ingress_config::dynamic::{lookup, HttpService, LoadBalancerService, NamedMap, StickyConfig};

const MAX_SERVICE_DEPTH: usize = 32;

#[derive(Clone, Debug)]
pub enum ResolvedService {
    LoadBalancer(LoadBalancerService),
    Weighted {
        children: Vec<(ResolvedService, u32)>,
        sticky: Option<StickyConfig>,
    },
    Mirroring {
        primary: Box<ResolvedService>,
        mirrors: Vec<(ResolvedService, u8)>,
        mirror_body: bool,
        max_body_size: Option<i64>,
    },
    Failover {
        primary: Box<ResolvedService>,
        fallback: Box<ResolvedService>,
    },
}

#[derive(Debug)]
pub enum ServiceResolveError {
    Missing(String),
    DepthExceeded,
}

pub fn resolve(
    name: &str,
    services: &NamedMap<HttpService>,
) -> Result<ResolvedService, ServiceResolveError> {
    resolve_at(name, services, 0)
}

fn resolve_at(
    name: &str,
    services: &NamedMap<HttpService>,
    depth: usize,
) -> Result<ResolvedService, ServiceResolveError> {
    if depth >= MAX_SERVICE_DEPTH {
        return Err(ServiceResolveError::DepthExceeded);
    }
    let (_, service) =
        lookup(services, name).ok_or_else(|| ServiceResolveError::Missing(name.to_string()))?;
    match service {
        HttpService::LoadBalancer(lb) => Ok(ResolvedService::LoadBalancer(lb.clone())),
        HttpService::Weighted(w) => {
            let children = w
                .services
                .iter()
                .map(|child| Ok((resolve_at(&child.name, services, depth + 1)?, child.weight)))
                .collect::<Result<Vec<_>, ServiceResolveError>>()?;
            Ok(ResolvedService::Weighted {
                children,
                sticky: w.sticky.clone(),
            })
        }
        HttpService::Mirroring(m) => {
            let primary = resolve_at(&m.service, services, depth + 1)?;
            let mirrors = m
                .mirrors
                .iter()
                .map(|t| Ok((resolve_at(&t.name, services, depth + 1)?, t.percent)))
                .collect::<Result<Vec<_>, ServiceResolveError>>()?;
            Ok(ResolvedService::Mirroring {
                primary: Box::new(primary),
                mirrors,
                mirror_body: m.mirror_body,
                max_body_size: m.max_body_size,
            })
        }
        HttpService::Failover(f) => {
            let primary = resolve_at(&f.service, services, depth + 1)?;
            let fallback = resolve_at(&f.fallback, services, depth + 1)?;
            Ok(ResolvedService::Failover {
                primary: Box::new(primary),
                fallback: Box::new(fallback),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ingress_config::dynamic::Server;

    fn lb(url: &str) -> HttpService {
        HttpService::LoadBalancer(LoadBalancerService {
            servers: vec![Server {
                url: url.to_string(),
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

    #[test]
    fn resolves_plain_load_balancer() {
        let mut services = NamedMap::new();
        services.insert("svc".to_string(), lb("http://a"));
        let resolved = resolve("svc", &services).unwrap();
        assert!(matches!(resolved, ResolvedService::LoadBalancer(_)));
    }

    #[test]
    fn reports_missing_service() {
        let services: NamedMap<HttpService> = NamedMap::new();
        assert!(matches!(
            resolve("svc", &services),
            Err(ServiceResolveError::Missing(_))
        ));
    }

    #[test]
    fn self_referential_weighted_service_hits_depth_cap() {
        let mut services = NamedMap::new();
        services.insert(
            "loop".to_string(),
            HttpService::Weighted(ingress_config::dynamic::WeightedService {
                services: vec![ingress_config::dynamic::WeightedChild {
                    name: "loop".to_string(),
                    weight: 1,
                }],
                sticky: None,
            }),
        );
        assert!(matches!(
            resolve("loop", &services),
            Err(ServiceResolveError::DepthExceeded)
        ));
    }
}
