//! Worker-side sandboxing: a registry of statically-compiled map/reduce
//! programs, selected and capability-checked against the descriptor the
//! foreman sends (§4.2).

pub mod builtin;
pub mod error;
pub mod program;
pub mod registry;

pub use error::SandboxError;
pub use program::MapFn;
pub use program::ProgramEntry;
pub use program::ReduceFn;
pub use registry::ProgramRegistry;
