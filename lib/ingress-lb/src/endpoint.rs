//! A single server endpoint with independent health state and an
//! inflight counter fed to the power-of-two-choices picker, grounded on
//! `tower-load`'s `PendingRequests` idiom (teacher's `balance.rs` wraps a
//! discovered service in `PendingRequestsDiscover`; here the counter
//! lives directly on the endpoint since there is no `Discover` layer).

use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum Health {
    Unknown = 0,
    Healthy = 1,
    Unhealthy = 2,
}

impl From<u8> for Health {
    fn from(v: u8) -> Self {
        match v {
            1 => Health::Healthy,
            2 => Health::Unhealthy,
            _ => Health::Unknown,
        }
    }
}

pub struct Endpoint {
    pub url: String,
    pub weight: u32,
    health: AtomicU8,
    inflight: AtomicU64,
}

impl Endpoint {
    pub fn new(url: String, weight: u32) -> Self {
        Self {
            url,
            weight: weight.max(1),
            health: AtomicU8::new(Health::Unknown as u8),
            inflight: AtomicU64::new(0),
        }
    }

    pub fn health(&self) -> Health {
        Health::from(self.health.load(Ordering::SeqCst))
    }

    pub fn set_health(&self, health: Health) {
        self.health.store(health as u8, Ordering::SeqCst);
    }

    /// Selectable means not known-unhealthy; an endpoint with no
    /// configured health check stays `Unknown` forever and is always
    /// selectable (spec §4.6: health-check is optional per service).
    pub fn is_selectable(&self) -> bool {
        self.health() != Health::Unhealthy
    }

    pub fn inflight(&self) -> u64 {
        self.inflight.load(Ordering::SeqCst)
    }

    pub fn begin(&self) {
        self.inflight.fetch_add(1, Ordering::SeqCst);
    }

    pub fn end(&self) {
        self.inflight.fetch_sub(1, Ordering::SeqCst);
    }
}

/// RAII guard released when the caller's request completes, keeping the
/// inflight counter accurate even if the caller returns early.
pub struct InFlightGuard<'a> {
    endpoint: &'a Endpoint,
}

impl<'a> InFlightGuard<'a> {
    pub fn new(endpoint: &'a Endpoint) -> Self {
        endpoint.begin();
        Self { endpoint }
    }
}

impl<'a> Drop for InFlightGuard<'a> {
    fn drop(&mut self) {
        self.endpoint.end();
    }
}
