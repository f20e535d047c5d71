//! The pluggable program traits a worker runs under a capability allow-list
//! (§4.2, option (a) of the original design notes: ship a `program_id`
//! naming a statically-compiled program rather than marshaling bytecode).

use mr_messages::Key;
use mr_messages::Val;

/// A map-phase user function: `(k, v) -> [(k', v')]`.
pub trait MapFn: Send + Sync {
    fn call(&self, key: &Key, value: &Val) -> anyhow::Result<Vec<(Key, Val)>>;
}

/// A reduce-phase user function: `(k, [v]) -> (k, v')` (§6, resolved per
/// SPEC_FULL.md §9(ii)).
pub trait ReduceFn: Send + Sync {
    fn call(&self, key: &Key, values: &[Val]) -> anyhow::Result<(Key, Val)>;
}

/// One entry in a [`crate::registry::ProgramRegistry`]: the map/reduce pair
/// and the capabilities a descriptor must grant before either may run.
pub struct ProgramEntry {
    pub map: Box<dyn MapFn>,
    pub reduce: Box<dyn ReduceFn>,
    pub required_capabilities: &'static [&'static str],
}
