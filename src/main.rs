//! `ingressd`: the process that owns the CLI, static configuration,
//! provider/aggregator wiring, the C7 switcher and the C8 dispatcher's
//! per-entry-point listeners. Grounded on
//! `original_source/cmd/configuration.go` (flag/file static config load,
//! `SetEffectiveConfiguration`), `original_source/cmd/healthcheck/
//! healthcheck.go` (the `healthcheck` subcommand) and
//! `original_source/pkg/version/version.go` (`/api/version`).

use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use clap::{Parser, Subcommand};
use hyper::client::HttpConnector;
use hyper::Client;
use ingress_config::provider::FileProvider;
use ingress_config::static_config::StaticConfiguration;
use ingress_config::{Aggregator, Provider, ProviderMessage, Snapshot};
use ingress_core::events::Event;
use ingress_lb::HealthProbe;
use ingress_metrics::{MetricsSink, Sink};
use ingress_middleware::BuildContext;
use ingress_server::{HttpErrorPageBackend, HttpForwardAuthClient, HttpHealthProbe};
use ingress_switcher::Switcher;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

const VERSION: &str = env!("CARGO_PKG_VERSION");
const CODENAME: &str = "cheddar";

#[derive(Parser)]
#[command(name = "ingressd", version)]
struct Cli {
    /// Path to the static configuration file.
    #[arg(short, long, default_value = "ingress.yaml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Calls the configured `ping` entry point's `/ping` route and exits
    /// 0/1 on success/failure (grounded on `cmd/healthcheck/healthcheck.go`).
    Healthcheck,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let mut static_config = load_static_configuration(&cli.config);
    static_config.set_effective_configuration();

    match cli.command {
        Some(Command::Healthcheck) => healthcheck(&static_config).await,
        None => run(static_config).await,
    }
}

fn load_static_configuration(path: &PathBuf) -> StaticConfiguration {
    match std::fs::read_to_string(path) {
        Ok(contents) => serde_yaml::from_str(&contents).unwrap_or_else(|err| {
            eprintln!("failed to parse {}: {err}", path.display());
            std::process::exit(1);
        }),
        Err(_) => StaticConfiguration::default(),
    }
}

/// `Do` from `healthcheck.go`: HEAD the ping entry point's `/ping` route.
async fn healthcheck(config: &StaticConfiguration) {
    let Some(ping) = &config.ping else {
        eprintln!("please enable `ping` to use health check");
        std::process::exit(1);
    };
    let Some(entry_point) = config.entry_points.get(&ping.entry_point) else {
        eprintln!("ping: missing {} entry point", ping.entry_point);
        std::process::exit(1);
    };

    let address = socket_addr(entry_point.get_address());
    let url = format!("http://{address}/ping");
    let client = Client::new();
    let request = match hyper::Request::head(&url).body(hyper::Body::empty()) {
        Ok(request) => request,
        Err(err) => {
            println!("Error calling healthcheck: {err}");
            std::process::exit(1);
        }
    };

    match tokio::time::timeout(Duration::from_secs(5), client.request(request)).await {
        Ok(Ok(response)) if response.status().is_success() => {
            println!("OK: {url}");
            std::process::exit(0);
        }
        Ok(Ok(response)) => {
            println!("Bad healthcheck status: {}", response.status());
            std::process::exit(1);
        }
        Ok(Err(err)) => {
            println!("Error calling healthcheck: {err}");
            std::process::exit(1);
        }
        Err(_) => {
            println!("Error calling healthcheck: timed out");
            std::process::exit(1);
        }
    }
}

async fn run(static_config: StaticConfiguration) {
    init_tracing(&static_config.log);
    ingress_core::build_info::init(VERSION, CODENAME);

    let metrics = Arc::new(MetricsSink::install().unwrap_or_else(|err| {
        tracing::warn!(%err, "failed to install metrics recorder");
        std::process::exit(1);
    }));
    let sink: Arc<dyn Sink> = metrics.clone();

    let (shutdown, dispatch_cancel) = ingress_task::shutdown_signal();
    let mut background = ingress_task::TaskGroup::new();

    let (provider_tx, provider_rx) = mpsc::channel::<ProviderMessage>(16);
    let (snapshot_tx, mut snapshot_rx) = mpsc::channel::<Snapshot>(4);

    if let Some(file) = &static_config.providers.file {
        let path = file
            .filename
            .clone()
            .or_else(|| file.directory.clone())
            .unwrap_or_else(|| {
                tracing::warn!("file provider configured with neither filename nor directory");
                std::process::exit(1);
            });
        let provider = FileProvider::new(path, file.watch);
        let tx = provider_tx.clone();
        let cancel = dispatch_cancel.clone();
        background.spawn("provider:file", async move {
            if let Err(err) = provider.run(tx, cancel).await {
                tracing::error!(%err, "file provider exited with an error");
            }
        });
    }
    drop(provider_tx);

    let aggregator = Aggregator::new(static_config.providers.providers_throttle_duration);
    {
        let cancel = dispatch_cancel.clone();
        background.spawn("aggregator", async move {
            aggregator.run(provider_rx, snapshot_tx, cancel).await;
        });
    }

    let http_client = Client::new();

    tracing::info!("waiting for the first configuration snapshot");
    let first_snapshot = match snapshot_rx.recv().await {
        Some(snapshot) => snapshot,
        None => Snapshot::default(),
    };

    let switcher = build_switcher(first_snapshot, &http_client, &sink);

    spawn_entry_points(&static_config, &switcher, &http_client, &sink, &dispatch_cancel, &mut background);

    let dashboard = build_dashboard(switcher.clone(), metrics);
    let dashboard_task = {
        let mut cancel = dispatch_cancel.clone();
        let addr: SocketAddr = ([0, 0, 0, 0], 8080).into();
        tracing::info!(%addr, "dashboard/API listening");
        tokio::spawn(async move {
            let server = axum::Server::bind(&addr).serve(dashboard.into_make_service());
            let graceful = server.with_graceful_shutdown(async move {
                cancel.cancelled().await;
            });
            if let Err(err) = graceful.await {
                tracing::error!(%err, "dashboard server error");
            }
        })
    };

    let switcher_for_updates = switcher.clone();
    let sink_for_updates = sink.clone();
    let update_task = tokio::spawn(async move {
        while let Some(snapshot) = snapshot_rx.recv().await {
            tracing::info!("applying updated configuration snapshot");
            let compiled = compile_snapshot(&snapshot, &switcher_for_updates, &sink_for_updates);
            switcher_for_updates.switch(compiled).await;
        }
    });

    tokio::signal::ctrl_c().await.ok();
    tracing::info!("shutdown signal received, draining");
    shutdown.cancel();
    update_task.abort();
    dashboard_task.abort();
    background.join(Duration::from_secs(30)).await;
}

/// Bootstraps the first [`Switcher`] with `Arc::new_cyclic`: the error
/// page backend needs a handle to the switcher it is itself compiled
/// into, which does not exist until `compile()` has already run once.
fn build_switcher(first_snapshot: Snapshot, http_client: &Client<HttpConnector>, sink: &Arc<dyn Sink>) -> Arc<Switcher> {
    let (table, diagnostics) = ingress_router::build(&first_snapshot);
    for diagnostic in &diagnostics {
        tracing::warn!(router = %diagnostic.router, reason = %diagnostic.reason, "router builder diagnostic");
        sink.observe(Event::BuilderDiagnostic {
            object: diagnostic.router.clone(),
            message: diagnostic.reason.to_string(),
        });
    }

    let forward_auth_client = Arc::new(HttpForwardAuthClient::new(http_client.clone()));
    let prober: Arc<dyn HealthProbe> = Arc::new(HttpHealthProbe::new(http_client.clone()));

    Arc::new_cyclic(|weak: &std::sync::Weak<Switcher>| {
        let error_page_backend = Arc::new(HttpErrorPageBackend::new(weak.clone(), http_client.clone()));
        let build_ctx = BuildContext {
            forward_auth_client,
            error_page_backend,
        };
        let compiled = ingress_switcher::compile(table, &first_snapshot, &build_ctx, prober);
        Switcher::new(compiled)
    })
}

fn compile_snapshot(
    snapshot: &Snapshot,
    switcher: &Arc<Switcher>,
    sink: &Arc<dyn Sink>,
) -> ingress_switcher::CompiledTable {
    let (table, diagnostics) = ingress_router::build(snapshot);
    for diagnostic in &diagnostics {
        tracing::warn!(router = %diagnostic.router, reason = %diagnostic.reason, "router builder diagnostic");
        sink.observe(Event::BuilderDiagnostic {
            object: diagnostic.router.clone(),
            message: diagnostic.reason.to_string(),
        });
    }

    let http_client = Client::new();
    let forward_auth_client = Arc::new(HttpForwardAuthClient::new(http_client.clone()));
    let error_page_backend = Arc::new(HttpErrorPageBackend::new(Arc::downgrade(switcher), http_client.clone()));
    let prober: Arc<dyn HealthProbe> = Arc::new(HttpHealthProbe::new(http_client));
    let build_ctx = BuildContext {
        forward_auth_client,
        error_page_backend,
    };
    ingress_switcher::compile(table, snapshot, &build_ctx, prober)
}

fn spawn_entry_points(
    static_config: &StaticConfiguration,
    switcher: &Arc<Switcher>,
    http_client: &Client<HttpConnector>,
    sink: &Arc<dyn Sink>,
    cancel: &ingress_task::Cancellation,
    background: &mut ingress_task::TaskGroup,
) {
    use ingress_config::static_config::Transport;

    for (name, entry_point) in &static_config.entry_points {
        let addr = socket_addr(entry_point.get_address());
        let name = name.clone();
        let switcher = switcher.clone();
        let cancel = cancel.clone();

        match entry_point.transport {
            Transport::Tcp => {
                let client = http_client.clone();
                let sink = sink.clone();
                background.spawn("entrypoint:tcp", async move {
                    if let Err(err) = ingress_server::serve_tcp_entry_point(name, addr, switcher, client, sink, cancel).await {
                        tracing::error!(%err, "tcp entry point exited with an error");
                    }
                });
            }
            Transport::Udp => {
                let termination_delay = entry_point.udp_termination_delay;
                background.spawn("entrypoint:udp", async move {
                    if let Err(err) =
                        ingress_server::serve_udp_entry_point(name, addr, switcher, termination_delay, cancel).await
                    {
                        tracing::error!(%err, "udp entry point exited with an error");
                    }
                });
            }
        }
    }
}

/// Parses Traefik-style `":8000"`/`"127.0.0.1:8000"` address strings.
fn socket_addr(address: &str) -> SocketAddr {
    let normalized = if let Some(port) = address.strip_prefix(':') {
        format!("0.0.0.0:{port}")
    } else {
        address.to_string()
    };
    normalized.parse().unwrap_or_else(|err| {
        tracing::error!(address = %normalized, %err, "invalid entry point address");
        std::process::exit(1);
    })
}

fn init_tracing(log: &ingress_config::static_config::LogConfig) {
    let filter = tracing_subscriber::EnvFilter::try_new(&log.level)
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let subscriber = tracing_subscriber::fmt().with_env_filter(filter);
    if log.format == "json" {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}

#[derive(Clone)]
struct DashboardState {
    switcher: Arc<Switcher>,
    metrics: Arc<MetricsSink>,
}

fn build_dashboard(switcher: Arc<Switcher>, metrics: Arc<MetricsSink>) -> Router {
    let state = DashboardState { switcher, metrics };
    Router::new()
        .route("/ping", get(ping_handler))
        .route("/api/version", get(version_handler))
        .route("/api/overview", get(overview_handler))
        .route("/api/http/routers", get(http_routers_handler))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
}

async fn ping_handler() -> impl IntoResponse {
    "OK"
}

async fn version_handler() -> impl IntoResponse {
    Json(ingress_core::build_info::get().clone())
}

async fn overview_handler(State(state): State<DashboardState>) -> impl IntoResponse {
    let table = state.switcher.current();
    Json(serde_json::json!({
        "http": { "routers": table.http.len(), "services": table.services.len() },
        "tcp": { "routers": table.tcp.routers.len() },
        "udp": { "routers": table.udp.len() },
    }))
}

async fn http_routers_handler(State(state): State<DashboardState>) -> impl IntoResponse {
    let table = state.switcher.current();
    let routers: Vec<_> = table
        .http
        .iter()
        .map(|router| {
            serde_json::json!({
                "name": router.name,
                "entryPoints": router.entry_points,
                "priority": router.priority,
            })
        })
        .collect();
    Json(routers)
}

async fn metrics_handler(State(state): State<DashboardState>) -> impl IntoResponse {
    state.metrics.render()
}
