//! TCP entry-point dispatch (spec §4.8 "TCP entry point" bullets): SNI
//! demux into passthrough/termination, HTTP handoff, or a plain TCP
//! priority scan — grounded on the teacher's connect-then-duplex shape
//! in `linkerd/proxy/tcp/src/forward.rs`, modernized from the futures
//! 0.1 `ForwardFuture` state machine to `tokio::io::copy_bidirectional`.

use crate::http as http_dispatch;
use crate::sni;
use crate::tls_certs;
use hyper::client::HttpConnector;
use hyper::Client;
use ingress_config::dynamic::{Server, TcpService};
use ingress_metrics::Sink;
use ingress_rules::MatchContext;
use ingress_switcher::{CompiledTable, Switcher};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};

const SNI_PEEK_BUDGET: usize = 4096;
const TLS_HANDSHAKE_CONTENT_TYPE: u8 = 22;

/// Accept loop for one TCP entry point. Every connection is dispatched
/// independently against whatever table is current at accept time (spec
/// §5: a connection, like a request, observes a single table for its
/// lifetime).
pub async fn serve_entry_point(
    name: String,
    addr: SocketAddr,
    switcher: Arc<Switcher>,
    client: Client<HttpConnector>,
    sink: Arc<dyn Sink>,
    mut cancel: ingress_task::Cancellation,
) -> std::io::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(entry_point = %name, %addr, "tcp entry point listening");
    loop {
        tokio::select! {
            _ = cancel.cancelled() => return Ok(()),
            accepted = listener.accept() => {
                let (stream, remote_addr) = accepted?;
                let name = name.clone();
                let switcher = switcher.clone();
                let client = client.clone();
                let sink = sink.clone();
                tokio::spawn(async move {
                    if let Err(err) = handle_connection(&name, stream, remote_addr, switcher, client, sink).await {
                        tracing::debug!(%err, entry_point = %name, %remote_addr, "tcp connection ended with error");
                    }
                });
            }
        }
    }
}

async fn handle_connection(
    entry_point: &str,
    mut stream: TcpStream,
    remote_addr: SocketAddr,
    switcher: Arc<Switcher>,
    client: Client<HttpConnector>,
    sink: Arc<dyn Sink>,
) -> std::io::Result<()> {
    let table = switcher.current();

    let mut peek_buf = vec![0u8; SNI_PEEK_BUDGET];
    let peeked = stream.peek(&mut peek_buf).await?;
    let peek_buf = &peek_buf[..peeked];

    if peeked > 0 && peek_buf[0] == TLS_HANDSHAKE_CONTENT_TYPE {
        return handle_tls(entry_point, stream, remote_addr, &table, switcher, client, sink, peek_buf).await;
    }

    handle_plain(entry_point, stream, remote_addr, &table).await
}

async fn handle_tls(
    entry_point: &str,
    stream: TcpStream,
    remote_addr: SocketAddr,
    table: &CompiledTable,
    switcher: Arc<Switcher>,
    client: Client<HttpConnector>,
    sink: Arc<dyn Sink>,
    peek_buf: &[u8],
) -> std::io::Result<()> {
    let sni_name = sni::extract_sni(peek_buf);

    if let Some(idx) = sni_name.as_deref().and_then(|name| table.tcp.sni_index.get(name)) {
        let router = &table.tcp.routers[*idx];
        if router.tls.as_ref().map(|t| t.passthrough).unwrap_or(false) {
            tracing::debug!(router = %router.name, sni = ?sni_name, "tcp passthrough");
            return forward_passthrough(stream, &router.service).await;
        }
    }

    // Either no SNI match, or a match with TLS termination configured:
    // both terminate with the default certificate (spec §4.8 "match with
    // TLS termination -> terminate ... no match -> fall back to HTTP
    // default certificate termination").
    let Some(config) = tls_certs::load_server_config(&table.tls) else {
        tracing::warn!("no usable TLS certificate configured, closing connection");
        return Ok(());
    };
    let acceptor = tokio_rustls::TlsAcceptor::from(config);
    let tls_stream = match acceptor.accept(stream).await {
        Ok(s) => s,
        Err(err) => {
            tracing::debug!(%err, "tls handshake failed");
            return Ok(());
        }
    };

    if has_http_router(table, entry_point) {
        http_dispatch::serve(switcher, client, sink, entry_point.to_string(), tls_stream, remote_addr).await;
        return Ok(());
    }

    // No HTTP router bound here: run the TCP priority scan on the
    // now-cleartext stream.
    run_tcp_scan(tls_stream, remote_addr, table).await
}

async fn handle_plain(
    entry_point: &str,
    stream: TcpStream,
    remote_addr: SocketAddr,
    table: &CompiledTable,
) -> std::io::Result<()> {
    let _ = entry_point;
    run_tcp_scan(stream, remote_addr, table).await
}

fn has_http_router(table: &CompiledTable, entry_point: &str) -> bool {
    table
        .http
        .iter()
        .any(|r| r.entry_points.iter().any(|ep| ep == entry_point))
}

/// Plain TCP priority scan (spec §4.8 "TCP entry point, non-TLS: run TCP
/// priority scan; first matching router wins"). TCP rules realistically
/// only reference `ClientIP`/`HostSNI` (the latter already resolved via
/// the SNI index before reaching here), so the match context carries no
/// HTTP-layer facts.
async fn run_tcp_scan<S>(stream: S, remote_addr: SocketAddr, table: &CompiledTable) -> std::io::Result<()>
where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin,
{
    let headers = http::HeaderMap::new();
    let ctx = MatchContext {
        host: "",
        path: "",
        method: &http::Method::GET,
        headers: &headers,
        query: "",
        client_ip: remote_addr.ip(),
    };

    let matched = table
        .tcp
        .routers
        .iter()
        .find(|r| ingress_rules::matches(&r.rule, &ctx));

    match matched {
        Some(router) => forward_passthrough(stream, &router.service).await,
        None => Ok(()),
    }
}

/// Dials the selected backend and duplexes bytes until either side
/// closes; modernizes the teacher's `Duplex`/`ForwardFuture` shape with
/// `tokio::io::copy_bidirectional`.
async fn forward_passthrough<S>(mut client_stream: S, service: &TcpService) -> std::io::Result<()>
where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin,
{
    let servers = match service {
        TcpService::LoadBalancer(lb) => &lb.servers,
        TcpService::Weighted(_) => {
            tracing::warn!("weighted TCP services are not supported by the dispatcher, closing");
            return Ok(());
        }
    };

    let Some(target) = pick_server(servers) else {
        tracing::warn!("tcp service has no servers configured");
        return Ok(());
    };

    let mut backend = TcpStream::connect(&target.url).await?;
    tokio::io::copy_bidirectional(&mut client_stream, &mut backend).await?;
    Ok(())
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
    fn pick_server_returns_none_on_empty_list() {
        assert!(pick_server(&[]).is_none());
    }

    #[test]
    fn pick_server_picks_among_configured_servers() {
        let servers = vec![
            Server { url: "10.0.0.1:443".to_string(), weight: 1 },
            Server { url: "10.0.0.2:443".to_string(), weight: 1 },
        ];
        let picked = pick_server(&servers).unwrap();
        assert!(picked.url == "10.0.0.1:443" || picked.url == "10.0.0.2:443");
    }
}
