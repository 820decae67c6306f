//! The configuration aggregator (C3, spec §4.3): debounces and merges
//! per-provider snapshots into one global, qualified [`Snapshot`].
//! Grounded on the debounce/merge timer state machine spec.md §4.3
//! describes (`perProvider`, `throttle`, `pendingTimer`) — there is no
//! direct teacher analogue, so the control flow follows the shape of
//! the teacher's `Cache`/watch-merge loops in spirit: a single-owner
//! loop selecting over an input channel and a timer.

use crate::dynamic::{Snapshot, TlsConfiguration};
use crate::provider::ProviderMessage;
use indexmap::IndexMap;
use tokio::sync::mpsc;
use tokio::time::{Duration, Instant};

/// Merges the most recent snapshot from each provider into one global
/// snapshot whenever `throttle` elapses with no further input (spec
/// §4.3: "arm/extend a timer of throttle ... when the timer fires, emit
/// a merged Snapshot").
pub struct Aggregator {
    throttle: Duration,
}

impl Aggregator {
    pub fn new(throttle: Duration) -> Self {
        Self { throttle }
    }

    /// Runs until `rx` closes or `cancel` resolves. Every message
    /// qualifies its snapshot's names with `@<provider_id>` before
    /// storing it (spec §3/§9), so the merge step is a plain union.
    ///
    /// Sending downstream is awaited directly: if `tx`'s buffer is
    /// full the aggregator blocks rather than dropping a merge, per
    /// spec §4.3's "if the downstream is full, the aggregator blocks".
    pub async fn run(
        &self,
        mut rx: mpsc::Receiver<ProviderMessage>,
        tx: mpsc::Sender<Snapshot>,
        mut cancel: ingress_task::Cancellation,
    ) {
        let mut per_provider: IndexMap<String, Snapshot> = IndexMap::new();
        let sleep = tokio::time::sleep(Duration::from_secs(3600 * 24 * 365));
        tokio::pin!(sleep);
        let mut armed = false;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::debug!("aggregator cancelled");
                    return;
                }
                maybe = rx.recv() => {
                    match maybe {
                        Some(msg) => {
                            tracing::debug!(provider = %msg.provider_id, "received provider snapshot");
                            per_provider.insert(msg.provider_id.clone(), msg.snapshot.qualified());
                            sleep.as_mut().reset(Instant::now() + self.throttle);
                            armed = true;
                        }
                        None => {
                            if armed {
                                let merged = Self::merge(&per_provider);
                                let _ = tx.send(merged).await;
                            }
                            return;
                        }
                    }
                }
                _ = &mut sleep, if armed => {
                    armed = false;
                    let merged = Self::merge(&per_provider);
                    if tx.send(merged).await.is_err() {
                        tracing::debug!("aggregator downstream closed, stopping");
                        return;
                    }
                }
            }
        }
    }

    /// Unions every provider's most recent snapshot (spec §4.3 "Merge
    /// rule"). Names are already qualified by the time they reach here,
    /// so this is a plain section-wise extend with no conflict handling.
    fn merge(per_provider: &IndexMap<String, Snapshot>) -> Snapshot {
        let mut merged = Snapshot::new("aggregated");
        let mut tls = TlsConfiguration::default();
        for snapshot in per_provider.values() {
            merged.http.routers.extend(snapshot.http.routers.clone());
            merged.http.services.extend(snapshot.http.services.clone());
            merged
                .http
                .middlewares
                .extend(snapshot.http.middlewares.clone());
            merged
                .http
                .transports
                .extend(snapshot.http.transports.clone());
            merged.tcp.routers.extend(snapshot.tcp.routers.clone());
            merged.tcp.services.extend(snapshot.tcp.services.clone());
            merged.udp.routers.extend(snapshot.udp.routers.clone());
            merged.udp.services.extend(snapshot.udp.services.clone());
            tls.certificates.extend(snapshot.tls.certificates.clone());
            tls.options.extend(snapshot.tls.options.clone());
            tls.stores.extend(snapshot.tls.stores.clone());
        }
        merged.tls = tls;
        merged
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dynamic::{HttpConfiguration, HttpRouter, HttpService, LoadBalancerService, Observability, Server};

    fn router(service: &str) -> HttpRouter {
        HttpRouter {
            entry_points: vec!["web".to_string()],
            rule: "Host(`a`)".to_string(),
            priority: 0,
            tls: None,
            middlewares: vec![],
            service: service.to_string(),
            observability: Observability::default(),
        }
    }

    fn loadbalancer_service() -> HttpService {
        HttpService::LoadBalancer(LoadBalancerService {
            servers: vec![Server {
                url: "http://127.0.0.1:80".to_string(),
                weight: 1,
            }],
            sticky: None,
            health_check: None,
            strategy: Default::default(),
            pass_host_header: false,
            response_forwarding_flush_interval: None,
            servers_transport: None,
        })
    }

    #[tokio::test]
    async fn debounces_rapid_messages_into_one_merge() {
        let (provider_tx, provider_rx) = mpsc::channel(8);
        let (merged_tx, mut merged_rx) = mpsc::channel(8);
        let (_shutdown, cancel) = ingress_task::shutdown_signal();

        let aggregator = Aggregator::new(Duration::from_millis(20));
        let handle = tokio::spawn(async move {
            aggregator.run(provider_rx, merged_tx, cancel).await;
        });

        let mut snap_a = Snapshot::new("a");
        let mut http = HttpConfiguration::default();
        http.routers.insert("web".to_string(), router("svc"));
        http.services.insert("svc".to_string(), loadbalancer_service());
        snap_a.http = http;

        let mut snap_b = Snapshot::new("b");
        let mut http_b = HttpConfiguration::default();
        http_b.routers.insert("other".to_string(), router("svc2"));
        http_b
            .services
            .insert("svc2".to_string(), loadbalancer_service());
        snap_b.http = http_b;

        provider_tx
            .send(ProviderMessage {
                provider_id: "a".to_string(),
                snapshot: snap_a,
            })
            .await
            .unwrap();
        provider_tx
            .send(ProviderMessage {
                provider_id: "b".to_string(),
                snapshot: snap_b,
            })
            .await
            .unwrap();

        let merged = tokio::time::timeout(Duration::from_secs(1), merged_rx.recv())
            .await
            .expect("merge did not fire")
            .expect("channel closed");

        assert!(merged.http.routers.contains_key("web@a"));
        assert!(merged.http.routers.contains_key("other@b"));
        assert!(merged.http.services.contains_key("svc@a"));
        assert!(merged.http.services.contains_key("svc2@b"));

        drop(provider_tx);
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn unqualified_router_reference_resolves_against_default_source_not_its_own_provider() {
        use crate::dynamic::{lookup, DEFAULT_SOURCE};

        let (provider_tx, provider_rx) = mpsc::channel(8);
        let (merged_tx, mut merged_rx) = mpsc::channel(8);
        let (_shutdown, cancel) = ingress_task::shutdown_signal();

        let aggregator = Aggregator::new(Duration::from_millis(20));
        let handle = tokio::spawn(async move {
            aggregator.run(provider_rx, merged_tx, cancel).await;
        });

        // "file" defines "svc" unqualified; "kv" defines a router that
        // references "svc" unqualified too. Per spec §9 that reference
        // must resolve to "svc@file" (DEFAULT_SOURCE), not "svc@kv".
        let mut snap_file = Snapshot::new("file");
        let mut http_file = HttpConfiguration::default();
        http_file
            .services
            .insert("svc".to_string(), loadbalancer_service());
        snap_file.http = http_file;

        let mut snap_kv = Snapshot::new("kv");
        let mut http_kv = HttpConfiguration::default();
        http_kv.routers.insert("web".to_string(), router("svc"));
        snap_kv.http = http_kv;

        provider_tx
            .send(ProviderMessage {
                provider_id: "file".to_string(),
                snapshot: snap_file,
            })
            .await
            .unwrap();
        provider_tx
            .send(ProviderMessage {
                provider_id: "kv".to_string(),
                snapshot: snap_kv,
            })
            .await
            .unwrap();

        let merged = tokio::time::timeout(Duration::from_secs(1), merged_rx.recv())
            .await
            .expect("merge did not fire")
            .expect("channel closed");

        let router = merged.http.routers.get("web@kv").expect("router present");
        assert_eq!(router.service, format!("svc@{DEFAULT_SOURCE}"));
        assert!(lookup(&merged.http.services, &router.service).is_some());

        drop(provider_tx);
        handle.await.unwrap();
    }
}
