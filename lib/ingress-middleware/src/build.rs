//! Compiles an ordered, already-flattened list of middleware names (as
//! produced by `ingress_router::middleware::resolve_chain`, which splices
//! `chain` kinds and detects cycles before this crate ever sees the
//! list) into a [`Chain`] of leaf middlewares.

use crate::auth::{BasicAuth, DigestAuth, ForwardAuth, ForwardAuthClient};
use crate::buffering::Buffering;
use crate::chain::{Chain, Middleware};
use crate::circuitbreaker::CircuitBreaker;
use crate::compress::Compress;
use crate::error::BuildError;
use crate::errorpage::{ErrorPage, ErrorPageBackend};
use crate::headers::Headers;
use crate::inflight::{InFlightConn, InFlightReq};
use crate::ipallowlist::IpAllowList;
use crate::passtlsclientcert::PassTlsClientCert;
use crate::path::{AddPrefix, ReplacePath, ReplacePathRegex, StripPrefix, StripPrefixRegex};
use crate::plugin::Plugin;
use crate::ratelimit::RateLimit;
use crate::redirect::{RedirectRegex, RedirectScheme};
use crate::retry::Retry;
use ingress_config::dynamic::{lookup, MiddlewareSpec, NamedMap};
use std::sync::Arc;

/// External services a compiled chain may need to call into, injected by
/// the dispatcher rather than depended on directly (keeps this crate free
/// of a dependency on `ingress-lb`/an HTTP client stack).
pub struct BuildContext {
    pub forward_auth_client: Arc<dyn ForwardAuthClient>,
    pub error_page_backend: Arc<dyn ErrorPageBackend>,
}

/// Compiles `names` (already resolved/flattened) against `specs` into a
/// [`Chain`], preserving declaration order (spec §4.5: "the first-declared
/// middleware is the outermost").
pub fn compile(
    names: &[String],
    specs: &NamedMap<MiddlewareSpec>,
    ctx: &BuildContext,
) -> Result<Chain, BuildError> {
    let mut compiled: Vec<Arc<dyn Middleware>> = Vec::with_capacity(names.len());
    for name in names {
        let (_, spec) = lookup(specs, name).ok_or_else(|| BuildError::Empty(name.clone()))?;
        compiled.push(compile_one(name, spec, ctx)?);
    }
    Ok(Chain::new(compiled))
}

fn compile_one(
    name: &str,
    spec: &MiddlewareSpec,
    ctx: &BuildContext,
) -> Result<Arc<dyn Middleware>, BuildError> {
    Ok(match spec {
        MiddlewareSpec::AddPrefix { prefix } => Arc::new(AddPrefix::new(prefix.clone())),
        MiddlewareSpec::StripPrefix { prefixes } => Arc::new(StripPrefix::new(prefixes.clone())),
        MiddlewareSpec::StripPrefixRegex { regex } => Arc::new(StripPrefixRegex::compile(regex)?),
        MiddlewareSpec::ReplacePath { path } => Arc::new(ReplacePath::new(path.clone())),
        MiddlewareSpec::ReplacePathRegex { regex, replacement } => {
            Arc::new(ReplacePathRegex::compile(regex, replacement.clone())?)
        }
        MiddlewareSpec::RedirectRegex {
            regex,
            replacement,
            permanent,
        } => Arc::new(RedirectRegex::compile(regex, replacement.clone(), *permanent)?),
        MiddlewareSpec::RedirectScheme {
            scheme,
            port,
            permanent,
        } => Arc::new(RedirectScheme::new(scheme.clone(), *port, *permanent)),
        MiddlewareSpec::BasicAuth(spec) => Arc::new(BasicAuth::new(spec.clone())),
        MiddlewareSpec::DigestAuth(spec) => Arc::new(DigestAuth::new(spec.clone())),
        MiddlewareSpec::ForwardAuth(spec) => {
            Arc::new(ForwardAuth::new(spec.clone(), ctx.forward_auth_client.clone()))
        }
        MiddlewareSpec::Headers(spec) => Arc::new(Headers::new(spec.clone())),
        MiddlewareSpec::RateLimit(spec) => Arc::new(RateLimit::compile(spec)?),
        MiddlewareSpec::InFlightReq(spec) => Arc::new(InFlightReq::new(spec.clone())),
        MiddlewareSpec::InFlightConn(spec) => Arc::new(InFlightConn::new(spec.clone())),
        MiddlewareSpec::IpAllowList(spec) => Arc::new(IpAllowList::compile(spec)?),
        MiddlewareSpec::Buffering(spec) => Arc::new(Buffering::new(spec.clone())),
        MiddlewareSpec::Retry(spec) => Arc::new(Retry::new(spec.clone())),
        MiddlewareSpec::CircuitBreaker(spec) => Arc::new(CircuitBreaker::compile(spec.clone())?),
        MiddlewareSpec::Compress(spec) => Arc::new(Compress::new(spec.clone())),
        MiddlewareSpec::Errors(spec) => {
            Arc::new(ErrorPage::new(spec.clone(), ctx.error_page_backend.clone()))
        }
        MiddlewareSpec::PassTlsClientCert(spec) => Arc::new(PassTlsClientCert::new(spec.clone())),
        MiddlewareSpec::Plugin { name: plugin_name, .. } => Arc::new(Plugin::new(plugin_name.clone())),
        MiddlewareSpec::Chain { .. } => {
            return Err(BuildError::Malformed {
                name: name.to_string(),
                reason: "chain middlewares must be flattened before compilation".to_string(),
            })
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::AlwaysOk;

    struct NeverAuth;
    #[async_trait::async_trait]
    impl ForwardAuthClient for NeverAuth {
        async fn authorize(
            &self,
            _address: &str,
            _req: &crate::request::MiddlewareRequest,
            _forward_headers: &[String],
        ) -> Result<crate::request::MiddlewareResponse, crate::error::MiddlewareError> {
            unimplemented!()
        }
    }

    struct NeverErrorPage;
    #[async_trait::async_trait]
    impl ErrorPageBackend for NeverErrorPage {
        async fn fetch(
            &self,
            _service: &str,
            _query: Option<&str>,
            _original: &crate::request::MiddlewareResponse,
        ) -> Result<crate::request::MiddlewareResponse, crate::error::MiddlewareError> {
            unimplemented!()
        }
    }

    fn ctx() -> BuildContext {
        BuildContext {
            forward_auth_client: Arc::new(NeverAuth),
            error_page_backend: Arc::new(NeverErrorPage),
        }
    }

    #[tokio::test]
    async fn compiles_and_dispatches_add_prefix_then_strip_prefix() {
        let mut specs = NamedMap::new();
        specs.insert(
            "add".to_string(),
            MiddlewareSpec::AddPrefix {
                prefix: "/x".to_string(),
            },
        );
        specs.insert(
            "strip".to_string(),
            MiddlewareSpec::StripPrefix {
                prefixes: vec!["/x/y".to_string()],
            },
        );
        let names = vec!["add".to_string(), "strip".to_string()];
        let chain = compile(&names, &specs, &ctx()).unwrap();
        assert_eq!(chain.kinds(), vec!["add-prefix", "strip-prefix"]);

        let req = crate::test_support::test_request("/y/z");
        let resp = chain.dispatch(req, &AlwaysOk).await.unwrap();
        assert_eq!(resp.status, http::StatusCode::OK);
    }

    #[test]
    fn missing_middleware_reference_is_an_error() {
        let specs = NamedMap::new();
        let names = vec!["missing".to_string()];
        assert!(compile(&names, &specs, &ctx()).is_err());
    }
}
