//! IPAllowList (spec §4.5: "decide using IPStrategy ... Denied: 403").

use crate::chain::{Handler, Middleware};
use crate::error::{BuildError, MiddlewareError};
use crate::request::{MiddlewareRequest, MiddlewareResponse};
use async_trait::async_trait;
use ingress_config::dynamic::{IpAllowList as IpAllowListSpec, IpStrategy};
use ipnet::IpNet;
use std::net::IpAddr;

pub struct IpAllowList {
    allowed: Vec<IpNet>,
    strategy: Option<IpStrategy>,
}

impl IpAllowList {
    pub fn compile(spec: &IpAllowListSpec) -> Result<Self, BuildError> {
        let allowed = spec
            .source_range
            .iter()
            .map(|raw| {
                raw.parse::<IpNet>()
                    .or_else(|_| raw.parse::<IpAddr>().map(IpNet::from))
                    .map_err(|_| BuildError::Malformed {
                        name: "ipAllowList".to_string(),
                        reason: format!("`{raw}` is not a valid IP or CIDR"),
                    })
            })
            .collect::<Result<_, _>>()?;
        Ok(Self {
            allowed,
            strategy: spec.ip_strategy.clone(),
        })
    }

    /// Resolves the client IP per the configured `IPStrategy`: walk
    /// `X-Forwarded-For` back `depth` hops (skipping `excludedIps`),
    /// falling back to the observed remote address.
    fn resolve_client_ip(&self, req: &MiddlewareRequest) -> IpAddr {
        let strategy = match &self.strategy {
            Some(s) if s.depth > 0 => s,
            _ => return req.client_ip,
        };
        let Some(xff) = req
            .headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
        else {
            return req.client_ip;
        };
        let hops: Vec<&str> = xff
            .split(',')
            .map(str::trim)
            .filter(|ip| !strategy.excluded_ips.iter().any(|ex| ex == ip))
            .collect();
        let idx = hops.len().saturating_sub(strategy.depth as usize);
        hops.get(idx)
            .and_then(|s| s.parse().ok())
            .unwrap_or(req.client_ip)
    }
}

#[async_trait]
impl Middleware for IpAllowList {
    async fn handle(
        &self,
        req: MiddlewareRequest,
        next: &(dyn Handler + Sync),
    ) -> Result<MiddlewareResponse, MiddlewareError> {
        let ip = self.resolve_client_ip(&req);
        if !self.allowed.iter().any(|net| net.contains(&ip)) {
            return Err(MiddlewareError::Forbidden);
        }
        next.call(req).await
    }

    fn kind(&self) -> &'static str {
        "ip-allow-list"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{test_request, AlwaysOk, NeverCalled};

    #[tokio::test]
    async fn denies_ip_outside_allow_list() {
        let mw = IpAllowList::compile(&IpAllowListSpec {
            source_range: vec!["10.0.0.0/8".to_string()],
            ip_strategy: None,
        })
        .unwrap();
        let result = mw.handle(test_request("/"), &NeverCalled).await;
        assert!(matches!(result, Err(MiddlewareError::Forbidden)));
    }

    #[tokio::test]
    async fn allows_ip_inside_allow_list() {
        let mw = IpAllowList::compile(&IpAllowListSpec {
            source_range: vec!["203.0.113.0/24".to_string()],
            ip_strategy: None,
        })
        .unwrap();
        let result = mw.handle(test_request("/"), &AlwaysOk).await;
        assert!(result.is_ok());
    }
}
