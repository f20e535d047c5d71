//! The foreman binary: reads an input dataset, connects to a fixed set of
//! workers, and runs one job end to end (§4, §6).
//!
//! Grounded on `lgn-worker/src/main.rs`'s CLI/logging/panic-hook/Prometheus
//! bootstrap, applied around `mr_coordinator::foreman::run_job` in place of
//! the teacher's gRPC gateway loop.

use std::fs;
use std::panic;
use std::process::ExitCode;

use anyhow::Context;
use backtrace::Backtrace;
use clap::Parser;
use mimalloc::MiMalloc;
use mr_coordinator::config::Config;
use mr_coordinator::foreman;
use mr_coordinator::metrics::Metrics;
use mr_discovery::DiscoveryClient;
use mr_messages::DataSource;
use mr_messages::Key;
use mr_messages::ProgramDescriptor;
use mr_messages::Val;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

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

    /// Path to the job's input dataset, a JSON object of `{key: value}`.
    #[clap(long)]
    input: String,

    /// Path to write the job's reduced output, as a JSON object.
    #[clap(long)]
    output: String,

    /// Worker addresses to connect to, e.g. `127.0.0.1:11235`.
    #[clap(long, value_delimiter = ',', required = true)]
    workers: Vec<String>,

    /// The map program to run.
    #[clap(long, default_value = "builtin.wordcount")]
    map_program: String,

    /// The reduce program to run.
    #[clap(long, default_value = "builtin.wordcount")]
    reduce_program: String,

    /// Capabilities granted to both programs, comma separated.
    #[clap(long, value_delimiter = ',', default_value = "text.split_whitespace")]
    capabilities: Vec<String>,
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

    match run(&cli, &config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("foreman exited due to an error: {err:?}");
            ExitCode::FAILURE
        },
    }
}

async fn run(cli: &Cli, config: &Config) -> anyhow::Result<()> {
    info!(version = env!("CARGO_PKG_VERSION"), "starting foreman");

    let raw = fs::read_to_string(&cli.input).context("reading input dataset")?;
    // `serde_json::Value` has no `Ord` impl, so the dataset is read as a JSON
    // object (string keys) and carried internally as a sorted `Vec`, not a
    // `BTreeMap`.
    let map: serde_json::Map<String, Val> =
        serde_json::from_str(&raw).context("parsing input dataset")?;
    let pairs: Vec<(Key, Val)> = map.into_iter().map(|(k, v)| (Key::from(k), v)).collect();
    let data = DataSource::new(pairs);

    let discovery = DiscoveryClient::new(&config.discovery.base_url)
        .context("constructing discovery client")?;
    let metrics = Metrics::new();

    let map_descriptor = ProgramDescriptor {
        program_id: cli.map_program.clone(),
        allowed_capabilities: cli.capabilities.clone(),
    };
    let reduce_descriptor = ProgramDescriptor {
        program_id: cli.reduce_program.clone(),
        allowed_capabilities: cli.capabilities.clone(),
    };

    let result = foreman::run_job(
        data,
        map_descriptor,
        reduce_descriptor,
        cli.workers.clone(),
        &discovery,
        &config.job,
        &metrics,
    )
    .await
    .context("running job")?;

    let key_count = result.len();
    let mut object = serde_json::Map::with_capacity(key_count);
    for (key, value) in result {
        let key_str = match key {
            Val::String(s) => s,
            other => other.to_string(),
        };
        object.insert(key_str, value);
    }
    let serialized = serde_json::to_string_pretty(&object).context("serializing job output")?;
    fs::write(&cli.output, serialized).context("writing job output")?;

    info!(keys = key_count, output = %cli.output, "job complete");
    Ok(())
}
