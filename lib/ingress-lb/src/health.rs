//! Health-check probing (spec §4.6: "periodic HTTP HEAD/GET to `path` at
//! `interval`; separate `unhealthyInterval` when a server is currently
//! unhealthy ... Probes are independent of dispatch; a probe failure
//! marks the server unhealthy ... but does not close in-flight
//! connections"). The actual HTTP call is injected: this crate has no
//! HTTP client dependency of its own, mirroring how the teacher's
//! `balance.rs` is generic over a `Discover`/`Service` pair rather than
//! owning a transport.

use crate::endpoint::{Endpoint, Health};
use async_trait::async_trait;
use ingress_config::dynamic::HealthCheckSpec;
use std::sync::Arc;

#[async_trait]
pub trait HealthProbe: Send + Sync {
    /// Issues one probe against `url` per `spec` and reports whether it
    /// was accepted.
    async fn probe(&self, url: &str, spec: &HealthCheckSpec) -> bool;
}

/// Runs one endpoint's probe loop until `cancel` fires. Spawned once per
/// endpoint by `LoadBalancer::spawn_health_checks`.
pub async fn run(
    endpoint: Arc<Endpoint>,
    spec: HealthCheckSpec,
    prober: Arc<dyn HealthProbe>,
    mut cancel: ingress_task::Cancellation,
) {
    loop {
        let wait = if endpoint.health() == Health::Unhealthy {
            spec.unhealthy_interval
        } else {
            spec.interval
        };
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = tokio::time::sleep(wait) => {}
        }

        let ok = tokio::select! {
            _ = cancel.cancelled() => return,
            result = tokio::time::timeout(spec.timeout, prober.probe(&endpoint.url, &spec)) => {
                matches!(result, Ok(true))
            }
        };

        let next = if ok { Health::Healthy } else { Health::Unhealthy };
        if endpoint.health() != next {
            tracing::debug!(url = %endpoint.url, healthy = ok, "health check transition");
        }
        endpoint.set_health(next);
    }
}
