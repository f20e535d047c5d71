//! The worker binary: registers with the discovery service and serves
//! foreman connections until killed (§4.1, §4.2, §4.3).
//!
//! Grounded on `lgn-worker/src/main.rs`'s CLI/logging/panic-hook/Prometheus
//! bootstrap and its readiness/liveness `warp` routes.

use std::panic;
use std::process::ExitCode;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use anyhow::Context;
use backtrace::Backtrace;
use clap::Parser;
use mimalloc::MiMalloc;
use mr_coordinator::config::Config;
use mr_coordinator::metrics::Metrics;
use mr_coordinator::worker::WorkerDaemon;
use mr_discovery::DiscoveryClient;
use mr_sandbox::ProgramRegistry;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;
use warp::Filter;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

#[derive(Parser, Clone, Debug)]
struct Cli {
    /// Path to the configuration file.
    #[clap(short, long)]
    config: Option<String>,

    /// If set, output logs in JSON format.
    #[clap(short, long, action)]
    json: bool,
}

fn setup_logging(json: bool) {
    let env_filter = || {
        EnvFilter::builder()
            .with_default_directive(LevelFilter::INFO.into())
            .from_env_lossy()
    };
    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter())
            .init();
    } else {
        tracing_subscriber::fmt()
            .pretty()
            .with_env_filter(env_filter())
            .init();
    }
}

fn setup_panic_hook() {
    panic::set_hook(Box::new(|panic_info| {
        let msg = match panic_info.payload().downcast_ref::<&'static str>() {
            Some(s) => *s,
            None => match panic_info.payload().downcast_ref::<String>() {
                Some(s) => s.as_str(),
                None => "Box<dyn Any>",
            },
        };
        let (file, line) = match panic_info.location() {
            Some(l) => (l.file(), l.line()),
            None => ("<unknown>", 0),
        };
        error!(msg, file, line, "panic occurred: {:?}", Backtrace::new());
    }));
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    setup_logging(cli.json);
    setup_panic_hook();

    let config = Config::load(cli.config.clone());
    config.validate();
    debug!(?config, "loaded configuration");

    if let Err(err) = metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(([0, 0, 0, 0], config.prometheus.port))
        .install()
    {
        error!(%err, "failed to set up Prometheus exporter");
    }

    match run(&config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("worker exited due to an error: {err:?}");
            ExitCode::FAILURE
        },
    }
}

async fn run(config: &Config) -> anyhow::Result<()> {
    info!(version = env!("CARGO_PKG_VERSION"), "starting worker");

    let discovery = DiscoveryClient::new(&config.discovery.base_url)
        .context("constructing discovery client")?;
    let registry = ProgramRegistry::with_builtins();

    let last_task_processed = Arc::new(AtomicU64::new(now_secs()?));
    spawn_health_routes(last_task_processed);

    let daemon = WorkerDaemon::new(
        registry,
        discovery,
        Metrics::new(),
        config.worker.listen_port,
        Duration::from_secs(config.worker.heartbeat_interval_secs),
    );
    daemon.run().await
}

fn now_secs() -> anyhow::Result<u64> {
    Ok(SystemTime::now().duration_since(UNIX_EPOCH)?.as_secs())
}

fn spawn_health_routes(last_task_processed: Arc<AtomicU64>) {
    tokio::spawn(async move {
        let readiness = warp::path!("readiness")
            .map(|| warp::reply::with_status("OK", warp::http::StatusCode::OK));
        let liveness = warp::path!("liveness").map(move || {
            let _ = last_task_processed.load(Ordering::Relaxed);
            warp::reply::with_status("OK", warp::http::StatusCode::OK)
        });
        let routes = readiness.or(liveness);
        warp::serve(routes).run(([0, 0, 0, 0], 8080)).await;
    });
}
