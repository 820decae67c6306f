//! The hot-swap publisher (C7, spec §4.7): a single atomic reference to
//! the active [`CompiledTable`], swapped under a serializing write lock
//! and drained by refcount. Grounded on the teacher's `cache`/`lock`
//! pairing (`linkerd2-cache/src/lib.rs` + `linkerd2-lock/src/lib.rs`): a
//! `Lock`-guarded shared handle with a background purge task, here
//! narrowed from a keyed cache to one single-slot publisher.

use crate::compiled::CompiledTable;
use arc_swap::ArcSwap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// How long a retired table is given to drain in-flight requests before
/// its background tasks are canceled (spec §4.7 step 2: "hand off
/// pending requests, no forced close" by default).
#[derive(Clone, Copy, Debug)]
pub struct DrainPolicy {
    pub grace: Duration,
    pub poll_interval: Duration,
}

impl Default for DrainPolicy {
    fn default() -> Self {
        Self {
            grace: Duration::from_secs(30),
            poll_interval: Duration::from_millis(50),
        }
    }
}

pub struct Switcher {
    current: ArcSwap<CompiledTable>,
    write_lock: Mutex<()>,
    drain: DrainPolicy,
}

impl Switcher {
    pub fn new(initial: CompiledTable) -> Self {
        Self::with_drain_policy(initial, DrainPolicy::default())
    }

    pub fn with_drain_policy(initial: CompiledTable, drain: DrainPolicy) -> Self {
        Self {
            current: ArcSwap::new(Arc::new(initial)),
            write_lock: Mutex::new(()),
            drain,
        }
    }

    /// The table a dispatcher should use for the entire lifetime of one
    /// request (spec §5: "a request observes a single RoutingTable for
    /// its entire lifetime").
    pub fn current(&self) -> Arc<CompiledTable> {
        self.current.load_full()
    }

    /// Publishes `next` as the active table (spec §4.7 steps 1-3).
    /// Concurrent callers are serialized by `write_lock` so two swaps
    /// can never race; readers always observe one of the two tables
    /// (`ArcSwap` guarantees no torn pointer load).
    pub async fn switch(&self, next: CompiledTable) {
        let _serialized = self.write_lock.lock().await;
        let retired = self.current.swap(Arc::new(next));
        self.retire_in_background(retired);
    }

    fn retire_in_background(&self, retired: Arc<CompiledTable>) {
        let drain = self.drain;
        tokio::spawn(async move {
            let deadline = tokio::time::Instant::now() + drain.grace;
            loop {
                if Arc::strong_count(&retired) == 1 {
                    break;
                }
                if tokio::time::Instant::now() >= deadline {
                    tracing::warn!("retired routing table still referenced after grace period");
                    break;
                }
                tokio::time::sleep(drain.poll_interval).await;
            }
            match Arc::try_unwrap(retired) {
                Ok(table) => table.retire(drain.grace).await,
                Err(still_shared) => {
                    // Still referenced past the grace period: cancel its
                    // background tasks anyway and let the remaining
                    // strong references drop it once they finish.
                    still_shared.cancel_background_tasks();
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiled::CompiledTable;
    use ingress_config::dynamic::NamedMap;
    use ingress_router::CompiledTcp;
    use std::time::Duration;

    fn empty_table() -> CompiledTable {
        let (shutdown, _cancel) = ingress_task::shutdown_signal();
        CompiledTable::for_test(
            Vec::new(),
            CompiledTcp {
                routers: Vec::new(),
                sni_index: Default::default(),
            },
            NamedMap::new(),
            ingress_task::TaskGroup::new(),
            shutdown,
        )
    }

    #[tokio::test]
    async fn switch_publishes_new_table_immediately() {
        let switcher = Switcher::with_drain_policy(
            empty_table(),
            DrainPolicy {
                grace: Duration::from_millis(50),
                poll_interval: Duration::from_millis(5),
            },
        );
        let before = switcher.current();
        switcher.switch(empty_table()).await;
        let after = switcher.current();
        assert!(!Arc::ptr_eq(&before, &after));
    }

    #[tokio::test]
    async fn readers_holding_old_table_see_it_until_they_drop_it() {
        let switcher = Switcher::with_drain_policy(
            empty_table(),
            DrainPolicy {
                grace: Duration::from_millis(200),
                poll_interval: Duration::from_millis(5),
            },
        );
        let held = switcher.current();
        switcher.switch(empty_table()).await;
        assert_eq!(held.http.len(), 0);
        drop(held);
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}
