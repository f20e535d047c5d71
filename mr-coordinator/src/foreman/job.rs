//! Drives one map-reduce job end to end: connect to the assigned workers,
//! hand out the map phase, merge its output, hand out the reduce phase, and
//! disconnect (§4, §6).
//!
//! Grounded on `examples/original_source/ec262/task.py`'s `MapReduceJob`
//! (`merge_map_results` concatenates per-key value tuples across chunks;
//! `merge_reduce_results` takes the last result seen per key) and
//! `examples/original_source/ec262.py`'s top-level `run_job(datasource, port)`.

use std::collections::HashMap;
use std::collections::VecDeque;

use mr_discovery::DiscoveryClient;
use mr_messages::chunk::group_by_key;
use mr_messages::chunk::upsert;
use mr_messages::Chunk;
use mr_messages::DataChunker;
use mr_messages::DataSource;
use mr_messages::GroupedChunk;
use mr_messages::Key;
use mr_messages::MapPayload;
use mr_messages::ProgramDescriptor;
use mr_messages::ReducePayload;
use mr_messages::Val;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::config::JobSection;
use crate::foreman::connection;
use crate::foreman::connection::ConnectionEvent;
use crate::foreman::connection::OutgoingCommand;
use crate::foreman::error::ForemanError;
use crate::foreman::task::run_round;
use crate::foreman::task::PendingTask;
use crate::metrics::Metrics;

/// Connects to every worker address, hands each its map/reduce program
/// descriptors once it announces itself ready, runs the whole job, and
/// returns the final reduced mapping.
pub async fn run_job(
    data: DataSource,
    map_descriptor: ProgramDescriptor,
    reduce_descriptor: ProgramDescriptor,
    worker_addrs: Vec<String>,
    discovery: &DiscoveryClient,
    job: &JobSection,
    metrics: &Metrics,
) -> Result<Vec<(Key, Val)>, ForemanError> {
    let (events_tx, mut events_rx) = mpsc::channel(256);
    let mut workers = HashMap::new();
    for addr in &worker_addrs {
        let stream = TcpStream::connect(addr).await?;
        metrics.increment_worker_connections();
        let sender = connection::spawn(addr.clone(), stream, events_tx.clone());
        workers.insert(addr.clone(), sender);
    }
    drop(events_tx);

    if workers.is_empty() {
        return Err(ForemanError::NoWorkersAvailable);
    }

    let mut idle = VecDeque::new();
    for _ in 0..workers.len() {
        let Some(ConnectionEvent::Ready { worker_id }) = events_rx.recv().await else {
            return Err(ForemanError::NoWorkersAvailable);
        };
        if let Some(sender) = workers.get(&worker_id) {
            let _ = sender
                .send(OutgoingCommand::SetMapFn(map_descriptor.clone()))
                .await;
            let _ = sender
                .send(OutgoingCommand::SetReduceFn(reduce_descriptor.clone()))
                .await;
        }
        idle.push_back(worker_id);
    }

    let grouped = run_map_phase(
        &data,
        job,
        &mut workers,
        &mut idle,
        &mut events_rx,
        discovery,
        metrics,
    )
    .await?;

    let result = run_reduce_phase(
        grouped,
        job.replication,
        &mut workers,
        &mut idle,
        &mut events_rx,
        discovery,
        metrics,
    )
    .await?;

    for sender in workers.values() {
        let _ = sender.send(OutgoingCommand::Disconnect).await;
    }
    for _ in workers.values() {
        metrics.decrement_worker_connections();
    }

    Ok(result)
}

async fn run_map_phase(
    data: &DataSource,
    job: &JobSection,
    workers: &mut HashMap<String, mpsc::Sender<OutgoingCommand>>,
    idle: &mut VecDeque<String>,
    events_rx: &mut mpsc::Receiver<ConnectionEvent>,
    discovery: &DiscoveryClient,
    metrics: &Metrics,
) -> Result<GroupedChunk, ForemanError> {
    let tasks: Vec<PendingTask> = DataChunker::new(data, job.chunk_rows)
        .map(|chunk: Chunk| {
            let task_id = Uuid::new_v4().to_string();
            PendingTask {
                task_id: task_id.clone(),
                command: OutgoingCommand::Map(MapPayload {
                    task_id,
                    data: chunk,
                }),
            }
        })
        .collect();

    let outcomes = run_round(
        tasks,
        job.replication,
        "map",
        workers,
        idle,
        events_rx,
        discovery,
        metrics,
    )
    .await?;

    // Each outcome's pairs are (key, [values]) encoded as a JSON array value
    // (see the worker's map handler); flatten and re-group so values that
    // landed in different chunks are merged under the same key.
    let mut flattened: Vec<(Key, Val)> = Vec::new();
    for outcome in outcomes {
        for (key, values) in outcome.pairs {
            match values.as_array() {
                Some(values) => {
                    flattened.extend(values.iter().map(|v| (key.clone(), v.clone())));
                },
                None => flattened.push((key, values)),
            }
        }
    }
    Ok(group_by_key(flattened))
}

async fn run_reduce_phase(
    grouped: GroupedChunk,
    replication: usize,
    workers: &mut HashMap<String, mpsc::Sender<OutgoingCommand>>,
    idle: &mut VecDeque<String>,
    events_rx: &mut mpsc::Receiver<ConnectionEvent>,
    discovery: &DiscoveryClient,
    metrics: &Metrics,
) -> Result<Vec<(Key, Val)>, ForemanError> {
    let tasks: Vec<PendingTask> = grouped
        .into_iter()
        .map(|(key, values)| {
            let task_id = Uuid::new_v4().to_string();
            PendingTask {
                task_id: task_id.clone(),
                command: OutgoingCommand::Reduce(ReducePayload {
                    task_id,
                    data: vec![(key, values)],
                }),
            }
        })
        .collect();

    let outcomes = run_round(
        tasks,
        replication,
        "reduce",
        workers,
        idle,
        events_rx,
        discovery,
        metrics,
    )
    .await?;

    let mut result: Vec<(Key, Val)> = Vec::new();
    for outcome in outcomes {
        for (key, value) in outcome.pairs {
            upsert(&mut result, key, value);
        }
    }
    result.sort_by(|(a, _), (b, _)| mr_messages::compare_keys(a, b));
    Ok(result)
}
