//! Errors surfaced by the discovery service client (§4.3, §7), grounded on
//! `examples/original_source/ec262/discovery.py`'s `ServerError`,
//! `InsufficientCredits`, and `UnknownTask` exceptions.

#[derive(Debug, thiserror::Error)]
pub enum DiscoveryError {
    #[error("discovery service returned {status}: {body}")]
    Server { status: u16, body: String },

    #[error("discovery service has no record of task {task_id}")]
    UnknownTask { task_id: String },

    #[error("insufficient credits: available {available}, needed {needed}")]
    InsufficientCredits { available: u64, needed: u64 },

    #[error("the task key did not decode as {expected}-byte base64")]
    MalformedKey { expected: usize },

    #[error(transparent)]
    Transport(#[from] reqwest::Error),

    #[error(transparent)]
    Decrypt(#[from] crate::crypto::CryptoError),
}
