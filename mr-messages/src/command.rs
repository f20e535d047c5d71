//! The recognized commands of §4.1 and their payloads.

use serde::Deserialize;
use serde::Serialize;

use crate::chunk::Chunk;
use crate::chunk::GroupedChunk;
use crate::vote::Fingerprint;

/// An ASCII command label, as it appears before the first colon on the wire.
/// No colons or newlines may appear in a command label.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum Command {
    MapFn,
    ReduceFn,
    Map,
    Reduce,
    Disconnect,
    Ready,
    TaskComplete,
}

impl Command {
    pub const fn as_str(self) -> &'static str {
        match self {
            Command::MapFn => "mapfn",
            Command::ReduceFn => "reducefn",
            Command::Map => "map",
            Command::Reduce => "reduce",
            Command::Disconnect => "disconnect",
            Command::Ready => "ready",
            Command::TaskComplete => "taskcomplete",
        }
    }
}

impl std::fmt::Display for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown command received: {0}")]
pub struct UnknownCommand(pub String);

impl std::str::FromStr for Command {
    type Err = UnknownCommand;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "mapfn" => Ok(Command::MapFn),
            "reducefn" => Ok(Command::ReduceFn),
            "map" => Ok(Command::Map),
            "reduce" => Ok(Command::Reduce),
            "disconnect" => Ok(Command::Disconnect),
            "ready" => Ok(Command::Ready),
            "taskcomplete" => Ok(Command::TaskComplete),
            other => Err(UnknownCommand(other.to_owned())),
        }
    }
}

/// Names one entry in the worker's program registry, plus the capabilities the
/// foreman is willing to grant it (§4.2). Carried by `mapfn`/`reducefn`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgramDescriptor {
    pub program_id: String,
    pub allowed_capabilities: Vec<String>,
}

/// Payload of a `map` command.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MapPayload {
    pub task_id: String,
    pub data: Chunk,
}

/// Payload of a `reduce` command.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReducePayload {
    pub task_id: String,
    pub data: GroupedChunk,
}

/// Payload of a `taskcomplete` reply: the AES-128-CBC ciphertext under the
/// task's key, plus the plaintext canonical fingerprint the worker computed
/// before encrypting (§4.6, §9(i)).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskCompletePayload {
    pub task_id: String,
    pub ciphertext: Vec<u8>,
    pub fingerprint: Fingerprint,
}
