//! The replicated-task scheduler: assigns a batch of same-phase tasks to
//! idle workers, re-attaches idle workers to in-flight tasks as a straggler
//! mitigation once the batch runs out, and resolves each task's majority as
//! its replicas report in.
//!
//! Grounded on `examples/original_source/ec262/task.py`'s `RepeatedTask`
//! (`task_workers`/`results` keyed by replica slot, completing once every
//! slot has reported) and `ec262.py`'s `TaskManager.get_task` (falls back to
//! `random.choice(running_tasks)` once the input iterator is exhausted).

use std::collections::HashMap;
use std::collections::VecDeque;

use mr_discovery::DiscoveryClient;
use mr_messages::Key;
use mr_messages::Val;
use rand::seq::IteratorRandom;
use tokio::sync::mpsc;
use tracing::debug;

use crate::foreman::connection::ConnectionEvent;
use crate::foreman::connection::OutgoingCommand;
use crate::foreman::error::ForemanError;
use crate::foreman::vote;
use crate::foreman::vote::Replica;
use crate::metrics::Metrics;

/// One task still needing its first assignment.
pub struct PendingTask {
    pub task_id: String,
    pub command: OutgoingCommand,
}

struct InFlightTask {
    command: OutgoingCommand,
    assignments: Vec<String>,
    results: Vec<(String, Vec<u8>, mr_messages::Fingerprint)>,
    dispatched_at: std::time::Instant,
}

/// A completed task's decoded, majority-accepted result.
pub struct TaskOutcome {
    pub task_id: String,
    pub pairs: Vec<(Key, Val)>,
}

/// Caps how many extra replicas a straggler mitigation round may attach to a
/// single task, beyond its initial `replication` assignments.
const MAX_STRAGGLER_REATTACHMENTS: usize = 1;

/// Runs `tasks` to completion: every task_id either yields a [`TaskOutcome`]
/// or the whole round fails with the first [`ForemanError`] encountered
/// (§9(iii): no per-task retry after a no-majority failure).
pub async fn run_round(
    tasks: Vec<PendingTask>,
    replication: usize,
    phase: &'static str,
    workers: &mut HashMap<String, mpsc::Sender<OutgoingCommand>>,
    idle: &mut VecDeque<String>,
    events_rx: &mut mpsc::Receiver<ConnectionEvent>,
    discovery: &DiscoveryClient,
    metrics: &Metrics,
) -> Result<Vec<TaskOutcome>, ForemanError> {
    let total = tasks.len();
    let mut queue: VecDeque<PendingTask> = tasks.into_iter().collect();
    let mut in_flight: HashMap<String, InFlightTask> = HashMap::new();
    let mut done: Vec<TaskOutcome> = Vec::new();

    loop {
        assign_idle_workers(
            &mut queue,
            &mut in_flight,
            workers,
            idle,
            phase,
            metrics,
        );

        if done.len() == total {
            return Ok(done);
        }

        match events_rx.recv().await {
            Some(ConnectionEvent::Ready { worker_id }) => idle.push_back(worker_id),
            Some(ConnectionEvent::Complete {
                worker_id,
                task_id,
                ciphertext,
                fingerprint,
            }) => {
                idle.push_back(worker_id.clone());
                if let Some(task) = in_flight.get_mut(&task_id) {
                    task.results.push((worker_id, ciphertext, fingerprint));
                    if task.results.len() >= replication {
                        let task = in_flight.remove(&task_id).expect("just looked it up");
                        let elapsed = task.dispatched_at.elapsed().as_secs_f64();
                        let replicas: Vec<Replica> = task
                            .results
                            .into_iter()
                            .map(|(_, ciphertext, fingerprint)| Replica {
                                ciphertext,
                                fingerprint,
                            })
                            .collect();
                        let resolved =
                            vote::resolve(&task_id, &replicas, phase, metrics, discovery).await;
                        metrics.observe_task_duration(phase, elapsed);
                        let pairs = resolved?;
                        metrics.increment_tasks_completed(phase);
                        done.push(TaskOutcome { task_id, pairs });
                    }
                }
            },
            Some(ConnectionEvent::Disconnected { worker_id }) => {
                workers.remove(&worker_id);
                idle.retain(|w| w != &worker_id);
                requeue_orphaned_assignments(&worker_id, &mut in_flight, &mut queue);
            },
            None => return Err(ForemanError::NoWorkersAvailable),
        }
    }
}

fn assign_idle_workers(
    queue: &mut VecDeque<PendingTask>,
    in_flight: &mut HashMap<String, InFlightTask>,
    workers: &HashMap<String, mpsc::Sender<OutgoingCommand>>,
    idle: &mut VecDeque<String>,
    phase: &'static str,
    metrics: &Metrics,
) {
    let mut still_idle = VecDeque::new();
    while let Some(worker_id) = idle.pop_front() {
        let Some(sender) = workers.get(&worker_id) else {
            continue;
        };

        if let Some(task) = queue.pop_front() {
            let command = task.command.clone();
            in_flight.insert(
                task.task_id.clone(),
                InFlightTask {
                    command: task.command,
                    assignments: vec![worker_id.clone()],
                    results: Vec::new(),
                    dispatched_at: std::time::Instant::now(),
                },
            );
            metrics.increment_tasks_dispatched(phase);
            let _ = sender.try_send(command);
            continue;
        }

        if let Some((task_id, command)) = pick_straggler(in_flight, &worker_id) {
            debug!(worker_id, task_id, "reattaching idle worker to straggling task");
            let _ = sender.try_send(command);
            continue;
        }

        still_idle.push_back(worker_id);
    }
    *idle = still_idle;
}

fn pick_straggler(
    in_flight: &mut HashMap<String, InFlightTask>,
    worker_id: &str,
) -> Option<(String, OutgoingCommand)> {
    let mut rng = rand::thread_rng();
    let candidate = in_flight
        .iter()
        .filter(|(_, task)| {
            task.assignments.len() <= MAX_STRAGGLER_REATTACHMENTS
                && !task.assignments.iter().any(|w| w == worker_id)
        })
        .map(|(task_id, _)| task_id.clone())
        .choose(&mut rng)?;

    let task = in_flight.get_mut(&candidate)?;
    task.assignments.push(worker_id.to_owned());
    Some((candidate, task.command.clone()))
}

fn requeue_orphaned_assignments(
    worker_id: &str,
    in_flight: &mut HashMap<String, InFlightTask>,
    queue: &mut VecDeque<PendingTask>,
) {
    in_flight
        .values_mut()
        .for_each(|task| task.assignments.retain(|w| w != worker_id));

    let orphaned: Vec<String> = in_flight
        .iter()
        .filter(|(_, task)| task.assignments.is_empty())
        .map(|(task_id, _)| task_id.clone())
        .collect();

    for task_id in orphaned {
        let task = in_flight.remove(&task_id).expect("just looked it up");
        queue.push_back(PendingTask {
            task_id,
            command: task.command,
        });
    }
}
