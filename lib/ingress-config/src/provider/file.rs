//! The `file` provider: watches a single YAML document (or a directory
//! of them) on disk and re-parses it on change, per spec §4.2's file
//! provider and `original_source/cmd/configuration.go`'s `FileProvider`
//! static config shape (already modeled in [`crate::static_config::FileProvider`]).

use super::{Provider, ProviderMessage};
use crate::dynamic::{HttpConfiguration, Snapshot, TcpConfiguration, TlsConfiguration, UdpConfiguration};
use async_trait::async_trait;
use ingress_core::Error;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tokio::sync::mpsc;
use tokio::time::{interval, Duration};

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileDocument {
    #[serde(default)]
    http: HttpConfiguration,
    #[serde(default)]
    tcp: TcpConfiguration,
    #[serde(default)]
    udp: UdpConfiguration,
    #[serde(default)]
    tls: TlsConfiguration,
}

/// Reads dynamic configuration from a YAML file, re-reading it on an
/// interval when `watch` is set (spec §4.2: "the file provider polls
/// for changes rather than relying on OS-level notifications, to keep
/// its dependency surface small").
pub struct FileProvider {
    id: String,
    path: PathBuf,
    watch: bool,
    poll_interval: Duration,
}

impl FileProvider {
    pub fn new(path: impl Into<PathBuf>, watch: bool) -> Self {
        Self {
            id: "file".to_string(),
            path: path.into(),
            watch,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    async fn read_snapshot(path: &Path, source: &str) -> Result<Snapshot, Error> {
        let contents = tokio::fs::read_to_string(path).await?;
        let doc: FileDocument = serde_yaml::from_str(&contents)?;
        Ok(Snapshot {
            source: source.to_string(),
            http: doc.http,
            tcp: doc.tcp,
            udp: doc.udp,
            tls: doc.tls,
        })
    }

    async fn modified_at(path: &Path) -> Option<SystemTime> {
        tokio::fs::metadata(path).await.ok()?.modified().ok()
    }
}

#[async_trait]
impl Provider for FileProvider {
    fn id(&self) -> &str {
        &self.id
    }

    async fn run(
        &self,
        tx: mpsc::Sender<ProviderMessage>,
        mut cancel: ingress_task::Cancellation,
    ) -> Result<(), Error> {
        let snapshot = Self::read_snapshot(&self.path, &self.id).await?;
        let mut last_modified = Self::modified_at(&self.path).await;
        if tx
            .send(ProviderMessage {
                provider_id: self.id.clone(),
                snapshot,
            })
            .await
            .is_err()
        {
            return Ok(());
        }

        if !self.watch {
            return Ok(());
        }

        let mut ticker = interval(self.poll_interval);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return Ok(()),
                _ = ticker.tick() => {
                    let modified = Self::modified_at(&self.path).await;
                    if modified == last_modified {
                        continue;
                    }
                    last_modified = modified;
                    match Self::read_snapshot(&self.path, &self.id).await {
                        Ok(snapshot) => {
                            if tx
                                .send(ProviderMessage {
                                    provider_id: self.id.clone(),
                                    snapshot,
                                })
                                .await
                                .is_err()
                            {
                                return Ok(());
                            }
                        }
                        Err(err) => {
                            tracing::warn!(path = %self.path.display(), %err, "failed to reload file provider");
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn emits_initial_snapshot_then_stops_without_watch() {
        let dir = std::env::temp_dir().join(format!("ingress-config-test-{}", std::process::id()));
        tokio::fs::create_dir_all(&dir).await.unwrap();
        let file = dir.join("dynamic.yaml");
        tokio::fs::write(
            &file,
            r#"
http:
  routers:
    web:
      rule: "Host(`a`)"
      service: svc
  services:
    svc:
      loadBalancer:
        servers:
          - url: "http://127.0.0.1:80"
"#,
        )
        .await
        .unwrap();

        let provider = FileProvider::new(&file, false);
        let (tx, mut rx) = mpsc::channel(1);
        let (_shutdown, cancel) = ingress_task::shutdown_signal();
        provider.run(tx, cancel).await.unwrap();

        let msg = rx.recv().await.expect("expected one snapshot");
        assert_eq!(msg.provider_id, "file");
        assert!(msg.snapshot.http.routers.contains_key("web"));

        tokio::fs::remove_dir_all(&dir).await.ok();
    }
}
