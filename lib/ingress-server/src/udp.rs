//! UDP entry-point dispatch (spec §4.8 "UDP entry point: route by
//! entry-point -> service mapping; session bound to source IP:port for
//! `TerminationDelay`"). No rule matching is involved (spec §3: "UDP has
//! no rules"); an entry point forwards to whichever single `UdpRouter`
//! is bound to it.
//!
//! Grounded on the same connect-then-relay shape as the TCP passthrough
//! path (`linkerd/proxy/tcp/src/forward.rs`), adapted for UDP's
//! connectionless, session-by-source-address model: each new source
//! address gets its own upstream socket and relay task, torn down after
//! `udp_termination_delay` of inactivity.

use ingress_config::dynamic::Server;
use ingress_switcher::Switcher;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, Mutex};

const DATAGRAM_BUDGET: usize = 65_507;

type Sessions = Arc<Mutex<HashMap<SocketAddr, mpsc::UnboundedSender<Vec<u8>>>>>;

/// Accept loop for one UDP entry point. The target service is resolved
/// from the live `Switcher` at session-creation time, not fixed at
/// spawn time, so a hot-swap (spec §4.7) picks up new service
/// assignments for sessions opened after the swap; sessions already in
/// flight keep their already-dialed backend.
pub async fn serve_entry_point(
    name: String,
    addr: SocketAddr,
    switcher: Arc<Switcher>,
    termination_delay: Duration,
    mut cancel: ingress_task::Cancellation,
) -> std::io::Result<()> {
    let socket = Arc::new(UdpSocket::bind(addr).await?);
    tracing::info!(entry_point = %name, %addr, "udp entry point listening");
    let sessions: Sessions = Arc::new(Mutex::new(HashMap::new()));
    let mut buf = vec![0u8; DATAGRAM_BUDGET];

    loop {
        let (len, src) = tokio::select! {
            _ = cancel.cancelled() => return Ok(()),
            recvd = socket.recv_from(&mut buf) => recvd?,
        };
        let packet = buf[..len].to_vec();

        let sender = {
            let mut table = sessions.lock().await;
            let existing = table.get(&src).filter(|tx| !tx.is_closed()).cloned();
            match existing {
                Some(tx) => Some(tx),
                None => spawn_session(&name, src, &switcher, socket.clone(), termination_delay, sessions.clone(), &mut table),
            }
        };

        if let Some(tx) = sender {
            let _ = tx.send(packet);
        }
    }
}

/// Picks the target server for a newly seen source address by scanning
/// the current table's UDP routers for one bound to this entry point
/// (spec §3/§4.8: entry-point -> service mapping, no rule matching).
fn resolve_target(name: &str, switcher: &Switcher) -> Option<String> {
    let table = switcher.current();
    let router = table
        .udp
        .values()
        .find(|r| r.entry_points.iter().any(|ep| ep == name))?;
    pick_server(&router.service.servers).map(|s| s.url.clone())
}

/// Spawns a relay task for a newly seen source address and registers its
/// inbound sender in `table`, returning that sender so the caller can
/// forward the packet that triggered session creation.
fn spawn_session(
    name: &str,
    src: SocketAddr,
    switcher: &Switcher,
    socket: Arc<UdpSocket>,
    termination_delay: Duration,
    sessions: Sessions,
    table: &mut HashMap<SocketAddr, mpsc::UnboundedSender<Vec<u8>>>,
) -> Option<mpsc::UnboundedSender<Vec<u8>>> {
    let target = resolve_target(name, switcher)?;
    let (tx, rx) = mpsc::unbounded_channel();
    table.insert(src, tx.clone());
    tokio::spawn(run_session(src, target, socket, rx, termination_delay, sessions));
    Some(tx)
}

async fn run_session(
    src: SocketAddr,
    target: String,
    client_socket: Arc<UdpSocket>,
    mut inbound: mpsc::UnboundedReceiver<Vec<u8>>,
    termination_delay: Duration,
    sessions: Sessions,
) {
    let backend = match UdpSocket::bind("0.0.0.0:0").await {
        Ok(s) => s,
        Err(err) => {
            tracing::debug!(%err, %src, "failed to open udp backend socket");
            sessions.lock().await.remove(&src);
            return;
        }
    };
    if let Err(err) = backend.connect(&target).await {
        tracing::debug!(%err, %src, %target, "failed to connect udp backend");
        sessions.lock().await.remove(&src);
        return;
    }

    let mut buf = vec![0u8; DATAGRAM_BUDGET];
    loop {
        tokio::select! {
            packet = inbound.recv() => {
                match packet {
                    Some(packet) => {
                        if backend.send(&packet).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }
            recvd = backend.recv(&mut buf) => {
                match recvd {
                    Ok(len) => {
                        let _ = client_socket.send_to(&buf[..len], src).await;
                    }
                    Err(_) => break,
                }
            }
            _ = tokio::time::sleep(termination_delay) => {
                tracing::debug!(%src, "udp session idle timeout");
                break;
            }
        }
    }
    sessions.lock().await.remove(&src);
}

fn pick_server(servers: &[Server]) -> Option<&Server> {
    let weights: Vec<u32> = servers.iter().map(|s| s.weight).collect();
    let idx = ingress_lb::weighted_index(&weights)?;
    servers.get(idx)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pick_server_returns_none_for_empty_service() {
        assert!(pick_server(&[]).is_none());
    }
}
