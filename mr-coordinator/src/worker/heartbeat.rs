//! Periodic worker registration with the discovery service, keeping its
//! lease alive for the duration of the process (§4.3).
//!
//! Grounded on `examples/original_source/ec262/worker.py`'s `Server.heartbeat`
//! thread, which re-registers every 30 seconds against an implicit 60-second
//! TTL.

use std::sync::Arc;
use std::time::Duration;

use mr_discovery::DiscoveryClient;
use tracing::error;
use tracing::info;

/// Registers immediately, then re-registers every `interval` until the
/// process exits.
pub async fn run(discovery: Arc<DiscoveryClient>, port: u16, interval: Duration) {
    loop {
        match discovery.register_worker(port).await {
            Ok(registration) => info!(
                worker_id = registration.worker_id,
                ttl = registration.ttl,
                "registered with discovery service"
            ),
            Err(err) => error!(%err, "failed to register with discovery service"),
        }
        tokio::time::sleep(interval).await;
    }
}
