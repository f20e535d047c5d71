//! A worker's set of runnable programs, keyed by the `program_id` carried in
//! a `ProgramDescriptor` (§4.1, `mapfn`/`reducefn`).
//!
//! Grounded on `lgn-provers/src/provers/mod.rs`'s `ProverType` ->
//! `Box<dyn LgnProver>` dispatch: a fixed, statically-compiled set of
//! handlers selected by a string/enum key, rather than code shipped over the
//! wire and marshaled at runtime.

use std::collections::HashMap;

use mr_messages::ProgramDescriptor;

use crate::builtin::wordcount;
use crate::error::SandboxError;
use crate::program::ProgramEntry;

pub struct ProgramRegistry {
    programs: HashMap<String, ProgramEntry>,
}

impl ProgramRegistry {
    pub fn new() -> Self {
        Self {
            programs: HashMap::new(),
        }
    }

    /// A registry preloaded with the programs this crate ships (§4.2's
    /// "statically-compiled program registry").
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(wordcount::PROGRAM_ID, wordcount::entry());
        registry
    }

    pub fn register(&mut self, program_id: impl Into<String>, entry: ProgramEntry) {
        self.programs.insert(program_id.into(), entry);
    }

    /// Resolves a descriptor against this registry, rejecting both unknown
    /// program ids and descriptors that don't grant every capability the
    /// program requires.
    pub fn resolve(&self, descriptor: &ProgramDescriptor) -> Result<&ProgramEntry, SandboxError> {
        let entry = self
            .programs
            .get(&descriptor.program_id)
            .ok_or_else(|| SandboxError::UnknownProgram(descriptor.program_id.clone()))?;
        for required in entry.required_capabilities {
            if !descriptor
                .allowed_capabilities
                .iter()
                .any(|granted| granted == required)
            {
                return Err(SandboxError::CapabilityDenied {
                    program_id: descriptor.program_id.clone(),
                    missing: required,
                });
            }
        }
        Ok(entry)
    }
}

impl Default for ProgramRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_program_is_rejected() {
        let registry = ProgramRegistry::with_builtins();
        let descriptor = ProgramDescriptor {
            program_id: "nonexistent".to_owned(),
            allowed_capabilities: vec![],
        };
        assert!(matches!(
            registry.resolve(&descriptor),
            Err(SandboxError::UnknownProgram(_))
        ));
    }

    #[test]
    fn missing_capability_is_rejected() {
        let registry = ProgramRegistry::with_builtins();
        let descriptor = ProgramDescriptor {
            program_id: wordcount::PROGRAM_ID.to_owned(),
            allowed_capabilities: vec![],
        };
        assert!(matches!(
            registry.resolve(&descriptor),
            Err(SandboxError::CapabilityDenied { .. })
        ));
    }

    #[test]
    fn granted_capability_resolves() {
        let registry = ProgramRegistry::with_builtins();
        let descriptor = ProgramDescriptor {
            program_id: wordcount::PROGRAM_ID.to_owned(),
            allowed_capabilities: vec!["text.split_whitespace".to_owned()],
        };
        assert!(registry.resolve(&descriptor).is_ok());
    }
}
