//! The provider contract (spec §4.2/§6): any configuration source
//! implements [`Provider`] and emits [`ProviderMessage`]s onto a shared
//! channel for the aggregator (C3) to merge. Grounded on
//! `original_source/pkg/provider/provider.go`'s `Provider` interface and
//! the teacher's `linkerd2-app-core` discovery-resolution watch pattern.

use crate::dynamic::Snapshot;
use async_trait::async_trait;
use ingress_core::Error;
use tokio::sync::mpsc;

/// One provider's full snapshot, tagged with the provider's stable
/// identifier so the aggregator can replace exactly that provider's
/// contribution on the next message (spec §4.3: "each provider's most
/// recent snapshot is retained until it sends again or disconnects").
#[derive(Clone, Debug)]
pub struct ProviderMessage {
    pub provider_id: String,
    pub snapshot: Snapshot,
}

/// A configuration source. Implementors run for the lifetime of the
/// process and push a [`ProviderMessage`] every time their view of the
/// world changes; they never pull.
#[async_trait]
pub trait Provider: Send + Sync {
    /// The stable identifier this provider tags every snapshot with, and
    /// the default qualifier unqualified cross-references resolve
    /// against in its own snapshots (spec §3/§9).
    fn id(&self) -> &str;

    /// Runs the provider until `cancel` resolves, sending a
    /// [`ProviderMessage`] on `tx` whenever the underlying source
    /// changes. Returning early (other than on cancellation) is treated
    /// by the caller as the provider having failed.
    async fn run(
        &self,
        tx: mpsc::Sender<ProviderMessage>,
        cancel: ingress_task::Cancellation,
    ) -> Result<(), Error>;
}

pub mod file;

pub use file::FileProvider;
