//! Layered configuration: a baked-in default, an optional file, then
//! environment overrides — grounded on `lgn-worker/src/config/mod.rs`.

use config::FileFormat;
use lazy_static_include::lazy_static_include_str;
use serde_derive::Deserialize;

lazy_static_include_str! {
    DEFAULT_CONFIG => "src/config/default.toml",
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Config {
    pub job: JobSection,
    pub discovery: DiscoverySection,
    pub foreman: ForemanSection,
    pub worker: WorkerSection,
    pub prometheus: PrometheusSection,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct JobSection {
    /// Number of replicas each task is run on (§4.4).
    pub replication: usize,
    /// Rows per map-phase chunk (§4.4, default 1).
    pub chunk_rows: usize,
}

impl JobSection {
    fn validate(&self) {
        assert!(self.replication >= 1, "replication must be at least 1");
        assert!(self.chunk_rows >= 1, "chunk_rows must be at least 1");
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DiscoverySection {
    pub base_url: String,
}

impl DiscoverySection {
    fn validate(&self) {
        assert!(!self.base_url.is_empty(), "discovery base_url is required");
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ForemanSection {
    pub listen_port: u16,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct WorkerSection {
    pub listen_port: u16,
    pub heartbeat_interval_secs: u64,
    pub heartbeat_ttl_secs: u64,
}

impl WorkerSection {
    fn validate(&self) {
        assert!(
            self.heartbeat_interval_secs < self.heartbeat_ttl_secs,
            "heartbeat interval must be shorter than its ttl"
        );
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PrometheusSection {
    pub port: u16,
}

impl Config {
    pub fn load(local_file: Option<String>) -> Config {
        let mut builder = config::Config::builder()
            .add_source(config::File::from_str(&DEFAULT_CONFIG, FileFormat::Toml));

        if let Some(local_file) = local_file {
            builder = builder.add_source(config::File::with_name(&local_file));
        }

        let builder = builder
            .add_source(
                config::Environment::default()
                    .separator("__")
                    .ignore_empty(true),
            )
            .build()
            .expect("could not load configuration");

        builder
            .try_deserialize()
            .expect("could not deserialize configuration")
    }

    pub fn validate(&self) {
        self.job.validate();
        self.discovery.validate();
        self.worker.validate();
    }
}
