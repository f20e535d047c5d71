//! The `tokio_util` codec implementing the §4.1 frame syntax and parser
//! state machine: `CMD:\n` or `CMD:LEN\n<LEN bytes>`.
//!
//! Grounded on `examples/original_source/ec262/protocol.py`'s
//! `found_terminator`/`collect_incoming_data` state machine, reimplemented as
//! an explicit `AwaitHeader`/`AwaitPayload` state rather than the source's
//! mutable `set_terminator` callback style.

use bytes::Buf;
use bytes::BufMut;
use bytes::BytesMut;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio_util::codec::Decoder;
use tokio_util::codec::Encoder;

use crate::command::Command;

/// A maximum accepted payload length, guarding against a malicious or buggy
/// peer claiming an unbounded `LEN` and exhausting memory (§7, "oversize
/// length").
const MAX_PAYLOAD_BYTES: usize = 64 * 1024 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("unknown command received: {0}")]
    UnknownCommand(String),
    #[error("malformed frame header: {0:?}")]
    MalformedHeader(String),
    #[error("payload length {0} exceeds the maximum of {MAX_PAYLOAD_BYTES}")]
    OversizeLength(usize),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// One decoded command plus its optional opaque payload bytes. The payload
/// is deserialized into a concrete type by the caller, who knows which type
/// corresponds to `command` (see [`encode_payload`]/[`decode_payload`]).
#[derive(Debug, Clone)]
pub struct Frame {
    pub command: Command,
    pub payload: Option<Vec<u8>>,
}

impl Frame {
    pub fn bare(command: Command) -> Self {
        Self {
            command,
            payload: None,
        }
    }

    pub fn with_payload<T: Serialize>(command: Command, payload: &T) -> Self {
        Self {
            command,
            payload: Some(encode_payload(payload)),
        }
    }
}

enum State {
    AwaitHeader,
    AwaitPayload { command: Command, len: usize },
}

/// A per-connection frame codec. Each connection owns one instance; there is
/// no shared mutable state across connections (§5).
pub struct FrameCodec {
    state: State,
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self {
            state: State::AwaitHeader,
        }
    }
}

impl Decoder for FrameCodec {
    type Item = Frame;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Frame>, FrameError> {
        loop {
            match &self.state {
                State::AwaitHeader => {
                    let Some(newline) = src.iter().position(|&b| b == b'\n') else {
                        return Ok(None);
                    };
                    let header = src.split_to(newline + 1);
                    let header = &header[..header.len() - 1]; // drop the newline
                    let header = std::str::from_utf8(header)
                        .map_err(|e| FrameError::MalformedHeader(e.to_string()))?;
                    let Some((cmd, len)) = header.split_once(':') else {
                        return Err(FrameError::MalformedHeader(header.to_owned()));
                    };
                    let command: Command = cmd
                        .parse()
                        .map_err(|_| FrameError::UnknownCommand(cmd.to_owned()))?;
                    if len.is_empty() {
                        return Ok(Some(Frame::bare(command)));
                    }
                    let len: usize = len
                        .parse()
                        .map_err(|_| FrameError::MalformedHeader(header.to_owned()))?;
                    if len > MAX_PAYLOAD_BYTES {
                        return Err(FrameError::OversizeLength(len));
                    }
                    self.state = State::AwaitPayload { command, len };
                },
                State::AwaitPayload { command, len } => {
                    if src.len() < *len {
                        src.reserve(*len - src.len());
                        return Ok(None);
                    }
                    let command = *command;
                    let payload = src.split_to(*len).to_vec();
                    self.state = State::AwaitHeader;
                    return Ok(Some(Frame {
                        command,
                        payload: Some(payload),
                    }));
                },
            }
        }
    }
}

impl Encoder<Frame> for FrameCodec {
    type Error = FrameError;

    fn encode(&mut self, frame: Frame, dst: &mut BytesMut) -> Result<(), FrameError> {
        match frame.payload {
            None => {
                dst.put_slice(frame.command.as_str().as_bytes());
                dst.put_u8(b':');
                dst.put_u8(b'\n');
            },
            Some(payload) => {
                dst.put_slice(frame.command.as_str().as_bytes());
                dst.put_u8(b':');
                dst.put_slice(payload.len().to_string().as_bytes());
                dst.put_u8(b'\n');
                dst.put_slice(&payload);
            },
        }
        Ok(())
    }
}

/// Serializes a payload with `bincode`, the one wire serialization this
/// implementation fixes (§9).
pub fn encode_payload<T: Serialize>(value: &T) -> Vec<u8> {
    bincode::serialize(value).expect("payload types are always bincode-serializable")
}

/// Deserializes a payload previously produced by [`encode_payload`].
pub fn decode_payload<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, bincode::Error> {
    bincode::deserialize(bytes)
}
