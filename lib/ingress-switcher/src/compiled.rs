//! Compiles one [`RoutingTable`] (router-builder output, config only)
//! plus the snapshot's middleware specs into a [`CompiledTable`] of live
//! middleware chains and load-balancer trees — the form the dispatcher
//! (C8) actually serves requests from.

use ingress_config::dynamic::{NamedMap, Observability, RouterTls, TlsConfiguration};
use ingress_config::Snapshot;
use ingress_lb::{CompiledService, HealthProbe};
use ingress_middleware::{BuildContext, BuildError, Chain};
use ingress_router::{CompiledTcp, CompiledUdpRouter, RoutingTable};
use ingress_rules::Rule;
use std::sync::Arc;

pub struct CompiledRouter {
    pub name: String,
    pub entry_points: Vec<String>,
    pub rule: Rule,
    pub priority: i64,
    pub tls: Option<RouterTls>,
    pub chain: Chain,
    /// The router's declared backend service name (spec §3
    /// `HttpRouter.service`), for reporting which service actually
    /// served a request — distinct from `name`, the router's own name.
    pub service_name: String,
    pub service: CompiledService,
    pub observability: Observability,
}

/// The dispatcher-ready counterpart of [`RoutingTable`]: HTTP routers
/// carry a compiled middleware [`Chain`] and [`CompiledService`] tree
/// instead of the config-only `ResolvedService`/middleware names.
///
/// TCP and UDP sections are carried through unchanged: the spec's
/// load-balancing depth (health checks, sticky sessions, weighted
/// trees) is specified for HTTP services only (§4.6); TCP/UDP dispatch
/// picks directly from the config-level `TcpService`/`UdpService` the
/// router builder already resolved (see DESIGN.md).
pub struct CompiledTable {
    pub http: Vec<CompiledRouter>,
    pub tcp: CompiledTcp,
    pub udp: NamedMap<CompiledUdpRouter>,
    /// Every named HTTP service, compiled independently of which (if
    /// any) router targets it. Lets auxiliary middlewares that reference
    /// a service by name rather than through a router — `errors`'s
    /// error-page backend (spec §4.5) — dial it without needing their
    /// own copy of the service-resolution/LB machinery.
    pub services: NamedMap<CompiledService>,
    /// Carried straight from the snapshot for the dispatcher's TLS
    /// termination path (C8), which needs certificate material that
    /// `RoutingTable` itself doesn't retain.
    pub tls: TlsConfiguration,
    tasks: ingress_task::TaskGroup,
    shutdown: ingress_task::Shutdown,
}

impl CompiledTable {
    /// Cancels every background task rooted in this table (health-check
    /// loops, per spec §4.7 step 3) and joins them within `grace`.
    pub async fn retire(self, grace: std::time::Duration) {
        self.shutdown.cancel();
        self.tasks.join(grace).await;
    }

    /// Fires the cancellation signal without taking ownership, for the
    /// case where a retired table is still referenced past its drain
    /// grace period: background tasks stop, but join is left to whatever
    /// eventually drops the last `Arc`.
    pub(crate) fn cancel_background_tasks(&self) {
        self.shutdown.cancel();
    }

    #[cfg(test)]
    pub(crate) fn for_test(
        http: Vec<CompiledRouter>,
        tcp: CompiledTcp,
        udp: NamedMap<CompiledUdpRouter>,
        tasks: ingress_task::TaskGroup,
        shutdown: ingress_task::Shutdown,
    ) -> Self {
        Self {
            http,
            tcp,
            udp,
            services: NamedMap::new(),
            tls: TlsConfiguration::default(),
            tasks,
            shutdown,
        }
    }
}

/// Compiles `table` (spec §4.4 output) into a [`CompiledTable`],
/// resolving each HTTP router's middleware chain and service tree.
/// Routers whose middleware chain fails to compile are dropped with a
/// `tracing::warn!`, mirroring the diagnostics-not-failure posture the
/// router builder itself takes on unusable routers.
pub fn compile(
    table: RoutingTable,
    snapshot: &Snapshot,
    middleware_ctx: &BuildContext,
    prober: Arc<dyn HealthProbe>,
) -> CompiledTable {
    let (shutdown, cancel) = ingress_task::shutdown_signal();
    let mut tasks = ingress_task::TaskGroup::new();

    let http = table
        .http
        .into_iter()
        .filter_map(|router| {
            let chain = match ingress_middleware::compile(
                &router.middlewares,
                &snapshot.http.middlewares,
                middleware_ctx,
            ) {
                Ok(chain) => chain,
                Err(err @ BuildError::Empty(_)) | Err(err @ BuildError::Malformed { .. }) => {
                    tracing::warn!(router = %router.name, error = %err, "dropping router: middleware chain failed to compile");
                    return None;
                }
            };
            let service = ingress_lb::compile(
                &router.service,
                &snapshot.http.transports,
                &prober,
                &mut tasks,
                &cancel,
            );
            Some(CompiledRouter {
                name: router.name,
                entry_points: router.entry_points,
                rule: router.rule,
                priority: router.priority,
                tls: router.tls,
                chain,
                service_name: router.service_name,
                service,
                observability: router.observability,
            })
        })
        .collect();

    let services = snapshot
        .http
        .services
        .keys()
        .filter_map(|name| match ingress_router::resolve(name, &snapshot.http.services) {
            Ok(resolved) => {
                let compiled = ingress_lb::compile(
                    &resolved,
                    &snapshot.http.transports,
                    &prober,
                    &mut tasks,
                    &cancel,
                );
                Some((name.clone(), compiled))
            }
            Err(err) => {
                tracing::warn!(service = %name, ?err, "dropping service: failed to resolve");
                None
            }
        })
        .collect();

    CompiledTable {
        http,
        tcp: table.tcp,
        udp: table.udp,
        services,
        tls: snapshot.tls.clone(),
        tasks,
        shutdown,
    }
}
