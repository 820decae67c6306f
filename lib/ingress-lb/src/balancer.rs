//! One compiled `LoadBalancer` per `LoadBalancerService` leaf (spec
//! §4.6). Owns the endpoint set, selection strategy, sticky policy and
//! (optionally) the background health-check tasks.

use crate::endpoint::{Endpoint, InFlightGuard};
use crate::error::LbError;
use crate::health::{self, HealthProbe};
use crate::select::Selector;
use crate::sticky::{decode_id, encode_id, read_cookie};
use ingress_config::dynamic::{LbStrategy, LoadBalancerService, StickyConfig, TransportSpec};
use std::sync::Arc;

pub struct Selection<'a> {
    pub endpoint: &'a Arc<Endpoint>,
    pub guard: InFlightGuard<'a>,
    pub set_cookie: Option<String>,
    /// The resolved `servers_transport` this endpoint should be dialed
    /// with, if the service named one (spec §3 "transports").
    pub transport: Option<TransportSpec>,
}

pub struct LoadBalancer {
    endpoints: Vec<Arc<Endpoint>>,
    strategy: LbStrategy,
    sticky: Option<StickyConfig>,
    selector: Selector,
    transport: Option<TransportSpec>,
}

impl LoadBalancer {
    pub fn new(spec: &LoadBalancerService, transport: Option<TransportSpec>) -> Self {
        let endpoints = spec
            .servers
            .iter()
            .map(|s| Arc::new(Endpoint::new(s.url.clone(), s.weight)))
            .collect();
        Self {
            endpoints,
            strategy: spec.strategy,
            sticky: spec.sticky.clone(),
            selector: Selector::new(),
            transport,
        }
    }

    pub fn endpoints(&self) -> &[Arc<Endpoint>] {
        &self.endpoints
    }

    /// Spawns one health-check task per endpoint under `tasks`, returning
    /// immediately if `spec.health_check` is unset (spec §4.6: health
    /// checking is optional per service).
    pub fn spawn_health_checks(
        &self,
        spec: &LoadBalancerService,
        prober: Arc<dyn HealthProbe>,
        tasks: &mut ingress_task::TaskGroup,
        cancel: &ingress_task::Cancellation,
    ) {
        let Some(hc) = &spec.health_check else {
            return;
        };
        for endpoint in &self.endpoints {
            let endpoint = endpoint.clone();
            let hc = hc.clone();
            let prober = prober.clone();
            let cancel = cancel.clone();
            tasks.spawn("lb-health-check", async move {
                health::run(endpoint, hc, prober, cancel).await;
            });
        }
    }

    /// Selects a server (spec §4.6: "never select an unhealthy server;
    /// if all are unhealthy, return ServiceUnavailable"), honoring a
    /// sticky cookie when present and still healthy.
    pub fn select(&self, cookie_header: Option<&str>) -> Result<Selection<'_>, LbError> {
        if let (Some(sticky), Some(header)) = (&self.sticky, cookie_header) {
            if let Some(id) = read_cookie(header, &sticky.cookie_name) {
                if let Some(url) = decode_id(&id) {
                    if let Some(endpoint) = self
                        .endpoints
                        .iter()
                        .find(|e| e.url == url && e.is_selectable())
                    {
                        return Ok(Selection {
                            endpoint,
                            guard: InFlightGuard::new(endpoint),
                            set_cookie: None,
                            transport: self.transport.clone(),
                        });
                    }
                }
            }
        }

        let candidates: Vec<&Arc<Endpoint>> =
            self.endpoints.iter().filter(|e| e.is_selectable()).collect();
        let picked = match self.strategy {
            LbStrategy::Wrr => self.selector.wrr(&candidates),
            LbStrategy::P2c => self.selector.p2c(&candidates),
        }
        .ok_or(LbError::ServiceUnavailable)?;

        let set_cookie = self
            .sticky
            .as_ref()
            .map(|_| encode_id(&picked.url));

        Ok(Selection {
            endpoint: picked,
            guard: InFlightGuard::new(picked),
            set_cookie,
            transport: self.transport.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ingress_config::dynamic::Server;

    fn spec(urls: &[&str]) -> LoadBalancerService {
        LoadBalancerService {
            servers: urls
                .iter()
                .map(|u| Server {
                    url: u.to_string(),
                    weight: 1,
                })
                .collect(),
            sticky: None,
            health_check: None,
            strategy: LbStrategy::Wrr,
            pass_host_header: false,
            response_forwarding_flush_interval: None,
            servers_transport: None,
        }
    }

    #[test]
    fn selects_among_unknown_health_endpoints_by_default() {
        let lb = LoadBalancer::new(&spec(&["http://a", "http://b"]), None);
        let selection = lb.select(None).unwrap();
        assert!(selection.endpoint.url == "http://a" || selection.endpoint.url == "http://b");
    }

    #[test]
    fn all_unhealthy_returns_service_unavailable() {
        let lb = LoadBalancer::new(&spec(&["http://a"]), None);
        lb.endpoints()[0].set_health(crate::endpoint::Health::Unhealthy);
        assert!(matches!(lb.select(None), Err(LbError::ServiceUnavailable)));
    }

    #[test]
    fn sticky_cookie_pins_to_previously_selected_server() {
        let mut s = spec(&["http://a", "http://b"]);
        s.sticky = Some(StickyConfig {
            cookie_name: "lb".to_string(),
            secure: false,
            http_only: true,
        });
        let lb = LoadBalancer::new(&s, None);
        let first = lb.select(None).unwrap();
        let cookie_value = first.set_cookie.clone().unwrap();
        drop(first);

        let header = format!("lb={cookie_value}");
        let second = lb.select(Some(&header)).unwrap();
        assert_eq!(encode_id(&second.endpoint.url), cookie_value);
    }
}
