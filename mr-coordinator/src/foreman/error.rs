//! Errors a job run can fail with (§4.6, §7, §9(iii)).

#[derive(Debug, thiserror::Error)]
pub enum ForemanError {
    #[error("task {task_id} had no majority among its replicas; refunded and failed")]
    NoMajority { task_id: String },

    #[error("no workers are connected and reachable")]
    NoWorkersAvailable,

    #[error("winning replica's canonical encoding did not parse: {0}")]
    Canonical(#[from] serde_json::Error),

    #[error(transparent)]
    Discovery(#[from] mr_discovery::DiscoveryError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
