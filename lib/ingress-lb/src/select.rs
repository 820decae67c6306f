//! Selection strategies over a set of selectable endpoints (spec §4.6:
//! "weighted round-robin (default) or power-of-two-choices by inflight
//! count"). p2c is grounded on the teacher's `balance.rs`
//! (`SmallRng::from_entropy()` feeding `tower_balance::p2c::Balance`);
//! reimplemented directly since `tower-balance` itself is unfetchable
//! (see DESIGN.md).

use crate::endpoint::Endpoint;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;
use std::sync::Mutex;

pub struct Selector {
    rng: Mutex<SmallRng>,
}

impl Selector {
    pub fn new() -> Self {
        Self {
            rng: Mutex::new(SmallRng::from_entropy()),
        }
    }

    /// Weighted round-robin: picks proportionally to `weight` among the
    /// candidates, using a single random draw (equivalent to WRR over an
    /// unbounded number of selections without maintaining rotation
    /// state).
    pub fn wrr<'a>(&self, candidates: &[&'a Arc<Endpoint>]) -> Option<&'a Arc<Endpoint>> {
        if candidates.is_empty() {
            return None;
        }
        let total: u64 = candidates.iter().map(|e| e.weight as u64).sum();
        if total == 0 {
            return candidates.first().copied();
        }
        let mut pick = {
            let mut rng = self.rng.lock().unwrap();
            rng.gen_range(0..total)
        };
        for endpoint in candidates {
            let w = endpoint.weight as u64;
            if pick < w {
                return Some(endpoint);
            }
            pick -= w;
        }
        candidates.last().copied()
    }

    /// Power-of-two-choices: samples two candidates at random and picks
    /// the one with fewer inflight requests.
    pub fn p2c<'a>(&self, candidates: &[&'a Arc<Endpoint>]) -> Option<&'a Arc<Endpoint>> {
        match candidates.len() {
            0 => None,
            1 => Some(candidates[0]),
            _ => {
                let (i, j) = {
                    let mut rng = self.rng.lock().unwrap();
                    let i = rng.gen_range(0..candidates.len());
                    let mut j = rng.gen_range(0..candidates.len() - 1);
                    if j >= i {
                        j += 1;
                    }
                    (i, j)
                };
                if candidates[i].inflight() <= candidates[j].inflight() {
                    Some(candidates[i])
                } else {
                    Some(candidates[j])
                }
            }
        }
    }
}

/// A single weighted draw over `weights`, for the service-tree's
/// Weighted-node child pick (spec §4.6: "a Weighted node picks a child
/// proportional to its weight").
pub fn weighted_index(weights: &[u32]) -> Option<usize> {
    if weights.is_empty() {
        return None;
    }
    let total: u64 = weights.iter().map(|w| *w as u64).sum();
    if total == 0 {
        return Some(0);
    }
    let mut pick = rand::thread_rng().gen_range(0..total);
    for (idx, w) in weights.iter().enumerate() {
        let w = *w as u64;
        if pick < w {
            return Some(idx);
        }
        pick -= w;
    }
    Some(weights.len() - 1)
}

impl Default for Selector {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrr_always_picks_among_candidates() {
        let a = Arc::new(Endpoint::new("a".to_string(), 1));
        let b = Arc::new(Endpoint::new("b".to_string(), 9));
        let selector = Selector::new();
        let candidates = vec![&a, &b];
        for _ in 0..20 {
            let picked = selector.wrr(&candidates).unwrap();
            assert!(picked.url == "a" || picked.url == "b");
        }
    }

    #[test]
    fn p2c_prefers_less_loaded_endpoint() {
        let a = Arc::new(Endpoint::new("a".to_string(), 1));
        let b = Arc::new(Endpoint::new("b".to_string(), 1));
        for _ in 0..10 {
            b.begin();
        }
        let selector = Selector::new();
        let candidates = vec![&a, &b];
        for _ in 0..20 {
            let picked = selector.p2c(&candidates).unwrap();
            assert_eq!(picked.url, "a");
        }
    }
}
