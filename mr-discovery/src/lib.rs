//! A client for the external discovery service: worker registration, task
//! roster assignment, and the per-task AES key used for the encryption
//! envelope (§4.3, §4.6).

pub mod client;
pub mod crypto;
pub mod error;

pub use client::DiscoveryClient;
pub use client::TaskRoster;
pub use client::WorkerRegistration;
pub use error::DiscoveryError;
