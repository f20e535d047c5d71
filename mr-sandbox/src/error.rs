//! Errors raised while resolving or running a sandboxed program (§4.2, §7).

#[derive(Debug, thiserror::Error)]
pub enum SandboxError {
    #[error("no program registered under id {0:?}")]
    UnknownProgram(String),

    #[error("program {program_id:?} requires capability {missing:?}, which the descriptor did not grant")]
    CapabilityDenied {
        program_id: String,
        missing: &'static str,
    },

    #[error("program {program_id:?} failed: {source}")]
    ProgramFailed {
        program_id: String,
        #[source]
        source: anyhow::Error,
    },
}
