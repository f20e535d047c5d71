//! Wire protocol and shared data model for the map-reduce coordinator and its
//! workers: the frame codec, the command set, chunking over opaque keyed
//! data, and the canonical encoding used for voting and encryption.

pub mod chunk;
pub mod command;
pub mod frame;
pub mod vote;

pub use chunk::compare_keys;
pub use chunk::find;
pub use chunk::upsert;
pub use chunk::Chunk;
pub use chunk::DataChunker;
pub use chunk::DataSource;
pub use chunk::GroupedChunk;
pub use chunk::Key;
pub use chunk::Val;
pub use command::Command;
pub use command::MapPayload;
pub use command::ProgramDescriptor;
pub use command::ReducePayload;
pub use command::TaskCompletePayload;
pub use command::UnknownCommand;
pub use frame::Frame;
pub use frame::FrameCodec;
pub use frame::FrameError;
pub use vote::Fingerprint;
