//! Compiles a router-builder `ResolvedService` tree (C4 output) into a
//! tree of live `LoadBalancer`s (spec §4.6 "Weighted-parent semantics").

use crate::balancer::{LoadBalancer, Selection};
use crate::error::LbError;
use crate::health::HealthProbe;
use crate::select::weighted_index;
use ingress_config::dynamic::{lookup, NamedMap, StickyConfig, TransportSpec};
use ingress_router::ResolvedService;
use std::sync::Arc;

pub enum CompiledService {
    LoadBalancer(Arc<LoadBalancer>),
    Weighted {
        children: Vec<(CompiledService, u32)>,
        #[allow(dead_code)]
        sticky: Option<StickyConfig>,
    },
    Mirroring {
        primary: Box<CompiledService>,
        mirrors: Vec<(CompiledService, u8)>,
        mirror_body: bool,
        max_body_size: Option<i64>,
    },
    Failover {
        primary: Box<CompiledService>,
        fallback: Box<CompiledService>,
    },
}

/// Compiles `resolved` into live load balancers. Spawns one health-check
/// task group entry per `LoadBalancer` leaf that declares a health check.
/// `transports` resolves each leaf's `servers_transport` reference (spec
/// §3 "transports"); a leaf that names one but finds no match dials with
/// no transport override rather than failing the whole compile.
pub fn compile(
    resolved: &ResolvedService,
    transports: &NamedMap<TransportSpec>,
    prober: &Arc<dyn HealthProbe>,
    tasks: &mut ingress_task::TaskGroup,
    cancel: &ingress_task::Cancellation,
) -> CompiledService {
    match resolved {
        ResolvedService::LoadBalancer(spec) => {
            let transport = spec
                .servers_transport
                .as_ref()
                .and_then(|name| lookup(transports, name))
                .map(|(_, t)| t.clone());
            let lb = Arc::new(LoadBalancer::new(spec, transport));
            lb.spawn_health_checks(spec, prober.clone(), tasks, cancel);
            CompiledService::LoadBalancer(lb)
        }
        ResolvedService::Weighted { children, sticky } => CompiledService::Weighted {
            children: children
                .iter()
                .map(|(child, weight)| (compile(child, transports, prober, tasks, cancel), *weight))
                .collect(),
            sticky: sticky.clone(),
        },
        ResolvedService::Mirroring {
            primary,
            mirrors,
            mirror_body,
            max_body_size,
        } => CompiledService::Mirroring {
            primary: Box::new(compile(primary, transports, prober, tasks, cancel)),
            mirrors: mirrors
                .iter()
                .map(|(m, percent)| (compile(m, transports, prober, tasks, cancel), *percent))
                .collect(),
            mirror_body: *mirror_body,
            max_body_size: *max_body_size,
        },
        ResolvedService::Failover { primary, fallback } => CompiledService::Failover {
            primary: Box::new(compile(primary, transports, prober, tasks, cancel)),
            fallback: Box::new(compile(fallback, transports, prober, tasks, cancel)),
        },
    }
}

impl CompiledService {
    /// OR-over-leaves health (spec §4.6): a composite node is selectable
    /// if any reachable `LoadBalancer` leaf has a selectable endpoint.
    pub fn is_selectable(&self) -> bool {
        match self {
            CompiledService::LoadBalancer(lb) => lb.endpoints().iter().any(|e| e.is_selectable()),
            CompiledService::Weighted { children, .. } => {
                children.iter().any(|(c, _)| c.is_selectable())
            }
            CompiledService::Mirroring { primary, .. } => primary.is_selectable(),
            CompiledService::Failover { primary, fallback } => {
                primary.is_selectable() || fallback.is_selectable()
            }
        }
    }

    /// Selects one endpoint along the "primary" path: for `Weighted`,
    /// picks a child proportional to weight among selectable children;
    /// for `Mirroring`, always the primary (mirrors are fire-and-forget,
    /// see `mirror_targets`); for `Failover`, the primary unless it has
    /// no selectable endpoint, in which case the fallback.
    pub fn select(&self, cookie_header: Option<&str>) -> Result<Selection<'_>, LbError> {
        match self {
            CompiledService::LoadBalancer(lb) => lb.select(cookie_header),
            CompiledService::Weighted { children, .. } => {
                let selectable: Vec<&(CompiledService, u32)> =
                    children.iter().filter(|(c, _)| c.is_selectable()).collect();
                let weights: Vec<u32> = selectable.iter().map(|(_, w)| *w).collect();
                let idx = weighted_index(&weights).ok_or(LbError::ServiceUnavailable)?;
                selectable[idx].0.select(cookie_header)
            }
            CompiledService::Mirroring { primary, .. } => primary.select(cookie_header),
            CompiledService::Failover { primary, fallback } => primary
                .select(cookie_header)
                .or_else(|_| fallback.select(cookie_header)),
        }
    }

    /// Mirror targets and their sampling percent, present only on a
    /// `Mirroring` node (spec §3 "mirrors: Vec<MirrorTarget>").
    pub fn mirror_targets(&self) -> Option<(&[(CompiledService, u8)], bool, Option<i64>)> {
        match self {
            CompiledService::Mirroring {
                mirrors,
                mirror_body,
                max_body_size,
                ..
            } => Some((mirrors, *mirror_body, *max_body_size)),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoint::Health;
    use crate::health::HealthProbe;
    use async_trait::async_trait;
    use ingress_config::dynamic::{HealthCheckSpec, LbStrategy, LoadBalancerService, Server};

    struct NeverProbe;

    #[async_trait]
    impl HealthProbe for NeverProbe {
        async fn probe(&self, _url: &str, _spec: &HealthCheckSpec) -> bool {
            true
        }
    }

    fn lb_spec(url: &str) -> LoadBalancerService {
        LoadBalancerService {
            servers: vec![Server {
                url: url.to_string(),
                weight: 1,
            }],
            sticky: None,
            health_check: None,
            strategy: LbStrategy::Wrr,
            pass_host_header: false,
            response_forwarding_flush_interval: None,
            servers_transport: None,
        }
    }

    fn fixture() -> (
        ingress_task::TaskGroup,
        ingress_task::Cancellation,
        Arc<dyn HealthProbe>,
    ) {
        let (_shutdown, cancel) = ingress_task::shutdown_signal();
        (ingress_task::TaskGroup::new(), cancel, Arc::new(NeverProbe))
    }

    #[test]
    fn weighted_node_skips_unhealthy_child_entirely() {
        let (mut tasks, cancel, prober) = fixture();
        let resolved = ResolvedService::Weighted {
            children: vec![
                (ResolvedService::LoadBalancer(lb_spec("http://down")), 9),
                (ResolvedService::LoadBalancer(lb_spec("http://up")), 1),
            ],
            sticky: None,
        };
        let compiled = compile(&resolved, &NamedMap::new(), &prober, &mut tasks, &cancel);

        let CompiledService::Weighted { children, .. } = &compiled else {
            panic!("expected Weighted");
        };
        let CompiledService::LoadBalancer(down) = &children[0].0 else {
            panic!("expected LoadBalancer leaf");
        };
        down.endpoints()[0].set_health(Health::Unhealthy);

        assert!(compiled.is_selectable());
        for _ in 0..10 {
            let selection = compiled.select(None).unwrap();
            assert_eq!(selection.endpoint.url, "http://up");
        }
    }

    #[test]
    fn weighted_node_unselectable_when_all_children_unhealthy() {
        let (mut tasks, cancel, prober) = fixture();
        let resolved = ResolvedService::Weighted {
            children: vec![(ResolvedService::LoadBalancer(lb_spec("http://only")), 1)],
            sticky: None,
        };
        let compiled = compile(&resolved, &NamedMap::new(), &prober, &mut tasks, &cancel);
        let CompiledService::Weighted { children, .. } = &compiled else {
            panic!("expected Weighted");
        };
        let CompiledService::LoadBalancer(lb) = &children[0].0 else {
            panic!("expected LoadBalancer leaf");
        };
        lb.endpoints()[0].set_health(Health::Unhealthy);

        assert!(!compiled.is_selectable());
        assert!(matches!(compiled.select(None), Err(LbError::ServiceUnavailable)));
    }

    #[test]
    fn failover_falls_back_when_primary_unhealthy() {
        let (mut tasks, cancel, prober) = fixture();
        let resolved = ResolvedService::Failover {
            primary: Box::new(ResolvedService::LoadBalancer(lb_spec("http://primary"))),
            fallback: Box::new(ResolvedService::LoadBalancer(lb_spec("http://fallback"))),
        };
        let compiled = compile(&resolved, &NamedMap::new(), &prober, &mut tasks, &cancel);
        let CompiledService::Failover { primary, .. } = &compiled else {
            panic!("expected Failover");
        };
        let CompiledService::LoadBalancer(lb) = primary.as_ref() else {
            panic!("expected LoadBalancer leaf");
        };
        lb.endpoints()[0].set_health(Health::Unhealthy);

        assert!(compiled.is_selectable());
        let selection = compiled.select(None).unwrap();
        assert_eq!(selection.endpoint.url, "http://fallback");
    }
}
