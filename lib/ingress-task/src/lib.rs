//! Cancellation and graceful-shutdown helpers shared by providers, the
//! aggregator, health checks and entry-point listeners (spec §5).
//!
//! The teacher threads a bespoke `drain::Watch` (from a signal crate not
//! present in the retrieved pack) through every long-lived constructor.
//! We reproduce the same contract — "every long-lived task receives a
//! cancellation handle and is joined during shutdown" (spec §9) — with a
//! `tokio::sync::watch` channel, which is the native tokio idiom for the
//! same job.

#![deny(rust_2018_idioms)]

use std::future::Future;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// The write half of the cancellation signal. Held by whoever owns the
/// process lifecycle (the CLI's `main`, or a test harness).
#[derive(Clone)]
pub struct Shutdown(watch::Sender<bool>);

/// The read half, cloned into every task that must observe cancellation.
#[derive(Clone)]
pub struct Cancellation(watch::Receiver<bool>);

/// Creates a fresh shutdown signal, not yet fired.
pub fn shutdown_signal() -> (Shutdown, Cancellation) {
    let (tx, rx) = watch::channel(false);
    (Shutdown(tx), Cancellation(rx))
}

impl Shutdown {
    /// Fires the cancellation signal. Idempotent.
    pub fn cancel(&self) {
        let _ = self.0.send(true);
    }
}

impl Cancellation {
    /// Resolves once the shutdown signal has fired. Safe to call
    /// repeatedly and to race against other futures with `tokio::select!`.
    pub async fn cancelled(&mut self) {
        if *self.0.borrow() {
            return;
        }
        // `changed` only resolves on transitions, so re-check after it in
        // case a spurious wake observed the value as still `false`.
        while self.0.changed().await.is_ok() {
            if *self.0.borrow() {
                return;
            }
        }
    }

    pub fn is_cancelled(&self) -> bool {
        *self.0.borrow()
    }
}

/// A registry of long-lived background tasks, joined together at
/// shutdown with a grace period (spec §5 `GraceTimeout`).
#[derive(Default)]
pub struct TaskGroup {
    handles: Vec<(&'static str, JoinHandle<()>)>,
}

impl TaskGroup {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawns `fut` under `name`, tracking its handle for `join`.
    pub fn spawn<F>(&mut self, name: &'static str, fut: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.handles.push((name, tokio::spawn(fut)));
    }

    /// Waits for every tracked task to finish, up to `grace`. Tasks still
    /// running after `grace` are aborted and logged.
    pub async fn join(self, grace: Duration) {
        let names: Vec<&'static str> = self.handles.iter().map(|(name, _)| *name).collect();
        let abort_handles: Vec<_> = self.handles.iter().map(|(_, h)| h.abort_handle()).collect();
        let all = futures::future::join_all(self.handles.into_iter().map(|(_, h)| h));

        match tokio::time::timeout(grace, all).await {
            Ok(results) => {
                for (name, result) in names.into_iter().zip(results) {
                    match result {
                        Ok(()) => debug!(task = name, "task finished"),
                        Err(err) if err.is_panic() => {
                            warn!(task = name, "task panicked during shutdown")
                        }
                        Err(_) => debug!(task = name, "task cancelled"),
                    }
                }
            }
            Err(_) => {
                warn!(?names, "tasks did not finish within grace period, aborting");
                for handle in abort_handles {
                    handle.abort();
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn cancellation_resolves_after_cancel() {
        let (tx, mut rx) = shutdown_signal();
        assert!(!rx.is_cancelled());
        tx.cancel();
        rx.cancelled().await;
        assert!(rx.is_cancelled());
    }

    #[tokio::test]
    async fn task_group_joins_finished_tasks() {
        let mut group = TaskGroup::new();
        let (done_tx, done_rx) = tokio::sync::oneshot::channel();
        group.spawn("t1", async move {
            let _ = done_tx.send(());
        });
        done_rx.await.unwrap();
        group.join(Duration::from_secs(1)).await;
    }
}
