//! Chain dispatch: the onion composition described in spec §4.5 ("the
//! chain compiler composes them in declared order so that the
//! first-declared middleware is the outermost"). Generalizes the
//! teacher's `Proxy<Req, S>` combinator (`linkerd2-retry`,
//! `linkerd2-http-classify`) from a fixed single-layer wrapper into an
//! arbitrary-length, dynamically compiled chain.

use crate::error::MiddlewareError;
use crate::request::{MiddlewareRequest, MiddlewareResponse};
use async_trait::async_trait;
use std::sync::Arc;

/// The tail of a chain: the compiled backend call (load balancer
/// dispatch, or an error-page sub-request). Dispatch (C8) and the load
/// balancer (C6) implement this to receive requests that have passed
/// through every middleware.
#[async_trait]
pub trait Handler: Send + Sync {
    async fn call(&self, req: MiddlewareRequest) -> Result<MiddlewareResponse, MiddlewareError>;
}

#[async_trait]
impl<F, Fut> Handler for F
where
    F: Fn(MiddlewareRequest) -> Fut + Send + Sync,
    Fut: std::future::Future<Output = Result<MiddlewareResponse, MiddlewareError>> + Send,
{
    async fn call(&self, req: MiddlewareRequest) -> Result<MiddlewareResponse, MiddlewareError> {
        (self)(req).await
    }
}

/// A single compiled middleware. `handle` receives the rest of the chain
/// (including the backend) as `next` and decides whether, how many
/// times, and with what request to call it.
#[async_trait]
pub trait Middleware: Send + Sync {
    async fn handle(
        &self,
        req: MiddlewareRequest,
        next: &(dyn Handler + Sync),
    ) -> Result<MiddlewareResponse, MiddlewareError>;

    /// Short kind name for diagnostics/metrics, independent of instance
    /// configuration (mirrors `MiddlewareSpec::kind`).
    fn kind(&self) -> &'static str;
}

/// An ordered, compiled middleware pipeline for one router.
pub struct Chain {
    middlewares: Vec<Arc<dyn Middleware>>,
}

impl Chain {
    pub fn new(middlewares: Vec<Arc<dyn Middleware>>) -> Self {
        Self { middlewares }
    }

    pub fn is_empty(&self) -> bool {
        self.middlewares.is_empty()
    }

    pub fn kinds(&self) -> Vec<&'static str> {
        self.middlewares.iter().map(|m| m.kind()).collect()
    }

    pub async fn dispatch(
        &self,
        req: MiddlewareRequest,
        backend: &(dyn Handler + Sync),
    ) -> Result<MiddlewareResponse, MiddlewareError> {
        self.dispatch_at(0, req, backend).await
    }

    fn dispatch_at<'a>(
        &'a self,
        idx: usize,
        req: MiddlewareRequest,
        backend: &'a (dyn Handler + Sync),
    ) -> std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<MiddlewareResponse, MiddlewareError>> + Send + 'a>,
    > {
        Box::pin(async move {
            match self.middlewares.get(idx) {
                None => backend.call(req).await,
                Some(mw) => {
                    let rest = Rest {
                        chain: self,
                        idx: idx + 1,
                        backend,
                    };
                    mw.handle(req, &rest).await
                }
            }
        })
    }
}

struct Rest<'a> {
    chain: &'a Chain,
    idx: usize,
    backend: &'a (dyn Handler + Sync),
}

#[async_trait]
impl<'a> Handler for Rest<'a> {
    async fn call(&self, req: MiddlewareRequest) -> Result<MiddlewareResponse, MiddlewareError> {
        self.chain.dispatch_at(self.idx, req, self.backend).await
    }
}
