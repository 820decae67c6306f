//! Compiles the HTTP section of a merged Snapshot into priority-ordered
//! [`CompiledHttpRouter`]s (spec §4.4 steps 1-6).

use crate::diagnostics::{Diagnostic, Reason};
use crate::middleware::{resolve_chain, MiddlewareResolveError};
use crate::service::{resolve, ResolvedService, ServiceResolveError};
use crate::tls;
use ingress_config::dynamic::{HttpConfiguration, Observability, RouterTls, TlsConfiguration};
use ingress_rules::Rule;

#[derive(Debug)]
pub struct CompiledHttpRouter {
    pub name: String,
    pub entry_points: Vec<String>,
    pub rule: Rule,
    pub priority: i64,
    pub tls: Option<RouterTls>,
    pub middlewares: Vec<String>,
    /// The router's declared backend (spec §3 `HttpRouter.service`),
    /// kept alongside the resolved tree so dispatch can report which
    /// service actually served a request instead of the router's own
    /// name.
    pub service_name: String,
    pub service: ResolvedService,
    pub observability: Observability,
}

pub fn build(
    http: &HttpConfiguration,
    tls_config: &TlsConfiguration,
    diagnostics: &mut Vec<Diagnostic>,
) -> Vec<CompiledHttpRouter> {
    let mut compiled = Vec::new();

    for (name, router) in &http.routers {
        let rule = match ingress_rules::parse(&router.rule) {
            Ok(rule) => rule,
            Err(err) => {
                diagnostics.push(Diagnostic::new(name.clone(), Reason::SyntaxError(err.to_string())));
                continue;
            }
        };

        let middlewares = match resolve_chain(&router.middlewares, &http.middlewares) {
            Ok(mws) => mws,
            Err(MiddlewareResolveError::Missing(mw)) => {
                diagnostics.push(Diagnostic::new(name.clone(), Reason::MissingMiddleware(mw)));
                continue;
            }
            Err(MiddlewareResolveError::Cycle(mw)) => {
                diagnostics.push(Diagnostic::new(name.clone(), Reason::MiddlewareCycle(mw)));
                continue;
            }
        };

        let service = match resolve(&router.service, &http.services) {
            Ok(service) => service,
            Err(ServiceResolveError::Missing(svc)) => {
                diagnostics.push(Diagnostic::new(name.clone(), Reason::MissingService(svc)));
                continue;
            }
            Err(ServiceResolveError::DepthExceeded) => {
                diagnostics.push(Diagnostic::new(name.clone(), Reason::ServiceDepthExceeded));
                continue;
            }
        };

        if let Some(router_tls) = &router.tls {
            for domain in &router_tls.domains {
                if !tls::domain_is_covered(tls_config, &domain.main) {
                    diagnostics.push(Diagnostic::new(
                        name.clone(),
                        Reason::MissingCertificate(domain.main.clone()),
                    ));
                }
            }
        }

        compiled.push(CompiledHttpRouter {
            name: name.clone(),
            entry_points: router.entry_points.clone(),
            rule,
            priority: router.effective_priority(),
            tls: router.tls.clone(),
            middlewares,
            service_name: router.service.clone(),
            service,
            observability: router.observability.clone(),
        });
    }

    // Priority descending; ties broken by lexicographic router name,
    // stable (spec §4.4 step 3).
    compiled.sort_by(|a, b| b.priority.cmp(&a.priority).then_with(|| a.name.cmp(&b.name)));
    compiled
}
