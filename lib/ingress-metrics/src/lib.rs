//! The observability collaborator (spec §6): the core publishes
//! structured [`Event`]s; this crate is the default consumer, recording
//! them as `metrics` counters/histograms and rendering a Prometheus text
//! exposition for the dashboard API.
//!
//! Grounded on the teacher's `linkerd2-http-metrics::report` ("a `Report`
//! renders a `Registry`"), generalized from HTTP-only counters to the
//! full event set published by the router, middleware chain and load
//! balancer.

#![deny(rust_2018_idioms)]

use ingress_core::Event;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing::{info, warn};

/// Consumes structured observability events. The core never formats or
/// exports metrics directly (spec §6); it only calls `Sink::observe`.
pub trait Sink: Send + Sync {
    fn observe(&self, event: Event);
}

/// Records events as `metrics` counters/histograms, labeled by router,
/// service and entry point.
pub struct MetricsSink {
    handle: PrometheusHandle,
}

impl MetricsSink {
    /// Installs the global `metrics` recorder and returns a sink plus the
    /// handle used to render `/metrics` text exposition for the dashboard
    /// API.
    pub fn install() -> Result<Self, ingress_core::Error> {
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .map_err(|e| Box::new(e) as ingress_core::Error)?;
        Ok(Self { handle })
    }

    pub fn render(&self) -> String {
        self.handle.render()
    }
}

impl Sink for MetricsSink {
    fn observe(&self, event: Event) {
        match event {
            Event::RouteMatched {
                router,
                entry_point,
            } => {
                metrics::counter!("ingress_requests_matched_total", "router" => router, "entrypoint" => entry_point)
                    .increment(1);
            }
            Event::RouteNotMatched { entry_point } => {
                metrics::counter!("ingress_requests_unmatched_total", "entrypoint" => entry_point)
                    .increment(1);
            }
            Event::MiddlewareEnter { router, middleware } => {
                metrics::counter!("ingress_middleware_entered_total", "router" => router, "middleware" => middleware)
                    .increment(1);
            }
            Event::MiddlewareExit {
                router,
                middleware,
                elapsed,
            } => {
                metrics::histogram!("ingress_middleware_duration_seconds", "router" => router, "middleware" => middleware)
                    .record(elapsed.as_secs_f64());
            }
            Event::BackendSelected { service, server } => {
                metrics::counter!("ingress_backend_selected_total", "service" => service, "server" => server)
                    .increment(1);
            }
            Event::BuilderDiagnostic { object, message } => {
                warn!(object = %object, message = %message, "router builder diagnostic");
                metrics::counter!("ingress_builder_diagnostics_total", "object" => object).increment(1);
            }
            Event::RequestCompleted {
                router,
                service,
                entry_point,
                status,
                elapsed,
            } => {
                metrics::histogram!(
                    "ingress_request_duration_seconds",
                    "router" => router.clone(),
                    "service" => service.clone(),
                    "entrypoint" => entry_point.clone(),
                    "status" => status.to_string(),
                )
                .record(elapsed.as_secs_f64());
                metrics::counter!(
                    "ingress_requests_total",
                    "router" => router,
                    "service" => service,
                    "entrypoint" => entry_point,
                    "status" => status.to_string(),
                )
                .increment(1);
            }
        }
    }
}

/// A sink that only emits `tracing` events, useful for tests and for the
/// `healthcheck` subcommand which does not run a full metrics exporter.
pub struct TracingSink;

impl Sink for TracingSink {
    fn observe(&self, event: Event) {
        info!(?event, "observability event");
    }
}

/// A sink fanning events out to multiple inner sinks, e.g. metrics
/// recording and access logging at once.
pub struct FanoutSink(pub Vec<Box<dyn Sink>>);

impl Sink for FanoutSink {
    fn observe(&self, event: Event) {
        for sink in &self.0 {
            sink.observe(event.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct CountingSink(Arc<AtomicUsize>);
    impl Sink for CountingSink {
        fn observe(&self, _event: Event) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn fanout_reaches_every_sink() {
        let count_a = Arc::new(AtomicUsize::new(0));
        let count_b = Arc::new(AtomicUsize::new(0));
        let fanout = FanoutSink(vec![
            Box::new(CountingSink(count_a.clone())),
            Box::new(CountingSink(count_b.clone())),
        ]);
        fanout.observe(Event::RouteNotMatched {
            entry_point: "web".into(),
        });
        assert_eq!(count_a.load(Ordering::SeqCst), 1);
        assert_eq!(count_b.load(Ordering::SeqCst), 1);
    }
}
