//! The worker daemon: registers with the discovery service, then accepts
//! foreman connections and runs map/reduce tasks against its sandboxed
//! program registry (§4.1, §4.2, §4.3).
//!
//! Grounded on `examples/original_source/ec262/worker.py`'s `Server`, which
//! pairs a heartbeat thread with an `asyncore` accept loop.

pub mod handler;
pub mod heartbeat;

use std::sync::Arc;
use std::time::Duration;

use mr_discovery::DiscoveryClient;
use mr_sandbox::ProgramRegistry;
use tokio::net::TcpListener;
use tracing::error;
use tracing::info;
use tracing::warn;

use crate::metrics::Metrics;

pub struct WorkerDaemon {
    pub registry: Arc<ProgramRegistry>,
    pub discovery: Arc<DiscoveryClient>,
    pub metrics: Arc<Metrics>,
    pub port: u16,
    pub heartbeat_interval: Duration,
}

impl WorkerDaemon {
    pub fn new(
        registry: ProgramRegistry,
        discovery: DiscoveryClient,
        metrics: Metrics,
        port: u16,
        heartbeat_interval: Duration,
    ) -> Self {
        Self {
            registry: Arc::new(registry),
            discovery: Arc::new(discovery),
            metrics: Arc::new(metrics),
            port,
            heartbeat_interval,
        }
    }

    pub async fn run(self) -> anyhow::Result<()> {
        let listener = TcpListener::bind(("0.0.0.0", self.port)).await?;
        info!(port = self.port, "worker listening");

        tokio::spawn(heartbeat::run(
            self.discovery.clone(),
            self.port,
            self.heartbeat_interval,
        ));

        loop {
            let (stream, peer) = match listener.accept().await {
                Ok(accepted) => accepted,
                Err(err) => {
                    warn!(%err, "failed to accept foreman connection");
                    continue;
                },
            };
            info!(%peer, "foreman connected");

            let registry = self.registry.clone();
            let discovery = self.discovery.clone();
            let metrics = self.metrics.clone();
            tokio::spawn(async move {
                if let Err(err) =
                    handler::handle_connection(stream, registry, discovery, metrics).await
                {
                    error!(%peer, %err, "connection handler failed");
                }
            });
        }
    }
}
