//! The foreman/worker daemons that make up this map-reduce system, plus the
//! shared config and metrics scaffolding both run under.

pub mod config;
pub mod foreman;
pub mod metrics;
pub mod worker;

pub use config::Config;
pub use metrics::Metrics;
