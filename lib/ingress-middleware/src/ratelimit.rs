//! RateLimit (spec §4.5: "token bucket per SourceCriterion key ... Rate =
//! Average / Period, burst = Burst. Over-limit returns 429").

use crate::chain::{Handler, Middleware};
use crate::error::{BuildError, MiddlewareError};
use crate::request::{MiddlewareRequest, MiddlewareResponse};
use async_trait::async_trait;
use governor::{clock::DefaultClock, state::keyed::DefaultKeyedStateStore, Quota, RateLimiter};
use ingress_config::dynamic::{RateLimit as RateLimitSpec, SourceCriterion};
use std::num::NonZeroU32;
use std::time::Duration;

pub struct RateLimit {
    limiter: RateLimiter<String, DefaultKeyedStateStore<String>, DefaultClock>,
    criterion: SourceCriterion,
}

impl RateLimit {
    pub fn compile(spec: &RateLimitSpec) -> Result<Self, BuildError> {
        if spec.average == 0 {
            return Err(BuildError::Malformed {
                name: "rateLimit".to_string(),
                reason: "average must be nonzero".to_string(),
            });
        }
        let burst = NonZeroU32::new(spec.burst.max(spec.average) as u32).ok_or_else(|| {
            BuildError::Malformed {
                name: "rateLimit".to_string(),
                reason: "burst resolved to zero".to_string(),
            }
        })?;
        let period = spec.period.max(Duration::from_millis(1));
        let replenish = period / spec.average.max(1) as u32;
        let quota = Quota::with_period(replenish)
            .ok_or_else(|| BuildError::Malformed {
                name: "rateLimit".to_string(),
                reason: "period resolved to zero".to_string(),
            })?
            .allow_burst(burst);
        Ok(Self {
            limiter: RateLimiter::keyed(quota),
            criterion: spec.source_criterion.clone(),
        })
    }

    fn key(&self, req: &MiddlewareRequest) -> String {
        if let Some(header) = &self.criterion.request_header_name {
            if let Some(v) = req.headers.get(header).and_then(|v| v.to_str().ok()) {
                return v.to_string();
            }
        }
        if self.criterion.request_host {
            if let Some(host) = req.headers.get(http::header::HOST).and_then(|v| v.to_str().ok()) {
                return host.to_string();
            }
        }
        req.client_ip.to_string()
    }
}

#[async_trait]
impl Middleware for RateLimit {
    async fn handle(
        &self,
        req: MiddlewareRequest,
        next: &(dyn Handler + Sync),
    ) -> Result<MiddlewareResponse, MiddlewareError> {
        let key = self.key(&req);
        if self.limiter.check_key(&key).is_err() {
            return Err(MiddlewareError::RateLimited);
        }
        next.call(req).await
    }

    fn kind(&self) -> &'static str {
        "rate-limit"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{test_request, AlwaysOk};

    #[tokio::test]
    async fn exceeding_burst_returns_rate_limited() {
        let mw = RateLimit::compile(&RateLimitSpec {
            average: 1,
            period: Duration::from_secs(60),
            burst: 1,
            source_criterion: SourceCriterion::default(),
        })
        .unwrap();

        let first = mw.handle(test_request("/"), &AlwaysOk).await;
        assert!(first.is_ok());
        let second = mw.handle(test_request("/"), &AlwaysOk).await;
        assert!(matches!(second, Err(MiddlewareError::RateLimited)));
    }
}
