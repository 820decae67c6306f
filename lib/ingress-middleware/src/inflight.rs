//! InFlightReq / InFlightConn (spec §4.5: "semaphore keyed by source;
//! excess returns 429 (HTTP) or closes (TCP)"). Only the HTTP path is
//! in scope here; TCP in-flight limiting is enforced by the dispatcher
//! (C8) directly against its own connection table.

use crate::chain::{Handler, Middleware};
use crate::error::MiddlewareError;
use crate::request::{MiddlewareRequest, MiddlewareResponse};
use async_trait::async_trait;
use ingress_config::dynamic::{InFlightConn as InFlightConnSpec, InFlightReq as InFlightReqSpec};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

struct Counters {
    amount: u64,
    per_source: Mutex<HashMap<String, AtomicU64>>,
}

impl Counters {
    fn new(amount: u64) -> Self {
        Self {
            amount,
            per_source: Mutex::new(HashMap::new()),
        }
    }

    /// Returns `true` if the request may proceed, having reserved a slot.
    fn try_acquire(&self, key: &str) -> bool {
        let guard = self.per_source.lock().unwrap();
        if let Some(counter) = guard.get(key) {
            let mut current = counter.load(Ordering::SeqCst);
            loop {
                if current >= self.amount {
                    return false;
                }
                match counter.compare_exchange_weak(
                    current,
                    current + 1,
                    Ordering::SeqCst,
                    Ordering::SeqCst,
                ) {
                    Ok(_) => return true,
                    Err(actual) => current = actual,
                }
            }
        } else {
            drop(guard);
            let mut guard = self.per_source.lock().unwrap();
            let counter = guard
                .entry(key.to_string())
                .or_insert_with(|| AtomicU64::new(0));
            if counter.load(Ordering::SeqCst) >= self.amount {
                return false;
            }
            counter.fetch_add(1, Ordering::SeqCst);
            true
        }
    }

    fn release(&self, key: &str) {
        let guard = self.per_source.lock().unwrap();
        if let Some(counter) = guard.get(key) {
            counter.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

pub struct InFlightReq {
    counters: Counters,
}

impl InFlightReq {
    pub fn new(spec: InFlightReqSpec) -> Self {
        Self {
            counters: Counters::new(spec.amount),
        }
    }
}

#[async_trait]
impl Middleware for InFlightReq {
    async fn handle(
        &self,
        req: MiddlewareRequest,
        next: &(dyn Handler + Sync),
    ) -> Result<MiddlewareResponse, MiddlewareError> {
        let key = req.client_ip.to_string();
        if !self.counters.try_acquire(&key) {
            return Err(MiddlewareError::InFlightLimited);
        }
        let result = next.call(req).await;
        self.counters.release(&key);
        result
    }

    fn kind(&self) -> &'static str {
        "in-flight-req"
    }
}

/// Connection-scoped variant: in this HTTP-request-shaped pipeline the
/// per-request lifetime is used as a proxy for connection lifetime, since
/// the dispatcher does not expose connection identity to the chain.
pub struct InFlightConn {
    counters: Counters,
}

impl InFlightConn {
    pub fn new(spec: InFlightConnSpec) -> Self {
        Self {
            counters: Counters::new(spec.amount),
        }
    }
}

#[async_trait]
impl Middleware for InFlightConn {
    async fn handle(
        &self,
        req: MiddlewareRequest,
        next: &(dyn Handler + Sync),
    ) -> Result<MiddlewareResponse, MiddlewareError> {
        let key = req.client_ip.to_string();
        if !self.counters.try_acquire(&key) {
            return Err(MiddlewareError::InFlightLimited);
        }
        let result = next.call(req).await;
        self.counters.release(&key);
        result
    }

    fn kind(&self) -> &'static str {
        "in-flight-conn"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{test_request, NeverCalled};

    #[tokio::test]
    async fn exceeding_amount_rejects_without_calling_backend() {
        let counters = Counters::new(0);
        assert!(!counters.try_acquire("1.2.3.4"));
        let mw = InFlightReq {
            counters: Counters::new(0),
        };
        let result = mw.handle(test_request("/"), &NeverCalled).await;
        assert!(matches!(result, Err(MiddlewareError::InFlightLimited)));
    }
}
