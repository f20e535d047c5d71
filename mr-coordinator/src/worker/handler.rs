//! Handles one foreman connection: announces readiness, receives the
//! program descriptors, then runs map/reduce tasks against the sandboxed
//! registry and reports results back encrypted (§4.1, §4.2, §4.6).
//!
//! Grounded on `examples/original_source/ec262/worker.py`'s `Worker`
//! (`set_mapfn`/`set_reducefn`/`call_mapfn`/`call_reducefn`).

use std::sync::Arc;

use futures_util::SinkExt;
use mr_discovery::DiscoveryClient;
use mr_messages::chunk::group_by_key;
use mr_messages::frame::decode_payload;
use mr_messages::vote;
use mr_messages::Command;
use mr_messages::Frame;
use mr_messages::FrameCodec;
use mr_messages::Key;
use mr_messages::MapPayload;
use mr_messages::ProgramDescriptor;
use mr_messages::ReducePayload;
use mr_messages::TaskCompletePayload;
use mr_messages::Val;
use mr_sandbox::ProgramRegistry;
use tokio::net::TcpStream;
use tokio_stream::StreamExt;
use tokio_util::codec::Framed;
use tracing::info;
use tracing::warn;

use crate::metrics::Metrics;

#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    #[error("a map/reduce task arrived before its program descriptor was set")]
    ProgramNotSet,

    #[error("command expected a payload but the frame carried none")]
    MissingPayload,

    #[error(transparent)]
    Frame(#[from] mr_messages::FrameError),

    #[error(transparent)]
    Payload(#[from] bincode::Error),

    #[error(transparent)]
    Sandbox(#[from] mr_sandbox::SandboxError),

    #[error(transparent)]
    Discovery(#[from] mr_discovery::DiscoveryError),

    #[error(transparent)]
    Program(#[from] anyhow::Error),
}

pub async fn handle_connection(
    stream: TcpStream,
    registry: Arc<ProgramRegistry>,
    discovery: Arc<DiscoveryClient>,
    metrics: Arc<Metrics>,
) -> Result<(), HandlerError> {
    let mut framed = Framed::new(stream, FrameCodec::default());
    framed.send(Frame::bare(Command::Ready)).await?;

    let mut map_descriptor: Option<ProgramDescriptor> = None;
    let mut reduce_descriptor: Option<ProgramDescriptor> = None;

    while let Some(frame) = framed.next().await {
        let frame = frame?;
        match frame.command {
            Command::MapFn => {
                map_descriptor = Some(decode_payload(&require_payload(&frame)?)?);
            },
            Command::ReduceFn => {
                reduce_descriptor = Some(decode_payload(&require_payload(&frame)?)?);
            },
            Command::Map => {
                let payload: MapPayload = decode_payload(&require_payload(&frame)?)?;
                let descriptor = map_descriptor.as_ref().ok_or(HandlerError::ProgramNotSet)?;
                let reply = run_map(&registry, descriptor, payload, &discovery, &metrics).await?;
                framed.send(Frame::with_payload(Command::TaskComplete, &reply)).await?;
            },
            Command::Reduce => {
                let payload: ReducePayload = decode_payload(&require_payload(&frame)?)?;
                let descriptor = reduce_descriptor
                    .as_ref()
                    .ok_or(HandlerError::ProgramNotSet)?;
                let reply = run_reduce(&registry, descriptor, payload, &discovery, &metrics).await?;
                framed.send(Frame::with_payload(Command::TaskComplete, &reply)).await?;
            },
            Command::Disconnect => break,
            other => warn!(?other, "unexpected command from foreman"),
        }
    }

    info!("foreman disconnected");
    Ok(())
}

fn require_payload(frame: &Frame) -> Result<Vec<u8>, HandlerError> {
    frame.payload.clone().ok_or(HandlerError::MissingPayload)
}

async fn run_map(
    registry: &ProgramRegistry,
    descriptor: &ProgramDescriptor,
    payload: MapPayload,
    discovery: &DiscoveryClient,
    metrics: &Metrics,
) -> Result<TaskCompletePayload, HandlerError> {
    let entry = registry
        .resolve(descriptor)
        .map_err(|err| record_sandbox_rejection(metrics, err))?;
    let mut mapped: Vec<(Key, Val)> = Vec::new();
    for (key, value) in &payload.data {
        mapped.extend(entry.map.call(key, value)?);
    }
    let grouped = group_by_key(mapped);
    let encodable: Vec<(Key, Val)> = grouped
        .into_iter()
        .map(|(key, values)| (key, Val::Array(values)))
        .collect();
    seal(payload.task_id, &encodable, discovery).await
}

async fn run_reduce(
    registry: &ProgramRegistry,
    descriptor: &ProgramDescriptor,
    payload: ReducePayload,
    discovery: &DiscoveryClient,
    metrics: &Metrics,
) -> Result<TaskCompletePayload, HandlerError> {
    let entry = registry
        .resolve(descriptor)
        .map_err(|err| record_sandbox_rejection(metrics, err))?;
    let mut reduced: Vec<(Key, Val)> = Vec::new();
    for (key, values) in &payload.data {
        reduced.push(entry.reduce.call(key, values)?);
    }
    seal(payload.task_id, &reduced, discovery).await
}

fn record_sandbox_rejection(metrics: &Metrics, err: mr_sandbox::SandboxError) -> HandlerError {
    metrics.increment_sandbox_rejections();
    HandlerError::Sandbox(err)
}

/// Canonicalizes, fingerprints, and encrypts a task's result — the reply
/// every `map`/`reduce` command produces (§4.6).
async fn seal(
    task_id: String,
    pairs: &[(Key, Val)],
    discovery: &DiscoveryClient,
) -> Result<TaskCompletePayload, HandlerError> {
    let fingerprint = vote::fingerprint(pairs);
    let canonical = vote::encode_canonical(pairs);
    let ciphertext = discovery
        .encrypt_for_task(&task_id, canonical.as_bytes())
        .await?;
    Ok(TaskCompletePayload {
        task_id,
        ciphertext,
        fingerprint,
    })
}
