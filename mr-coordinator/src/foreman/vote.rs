//! Majority resolution for one task's replicated results: tally the
//! worker-reported fingerprints, decrypt the winner, or invalidate and fail
//! (§4.6, §9(i), §9(iii)).
//!
//! Grounded on `examples/original_source/ec262.py`'s
//! `TaskManager.verify_task`, which tabulates `hash(frozenset(...))` votes
//! and only accepts a result once it holds a strict majority of the
//! replicas.

use mr_discovery::DiscoveryClient;
use mr_messages::vote;
use mr_messages::Fingerprint;
use mr_messages::Key;
use mr_messages::Val;

use crate::foreman::error::ForemanError;
use crate::metrics::Metrics;

/// One replica's reported outcome for a task.
pub struct Replica {
    pub ciphertext: Vec<u8>,
    pub fingerprint: Fingerprint,
}

/// Tallies `replicas`' fingerprints and, on a majority, decrypts and decodes
/// the winner. On no majority, invalidates the task with the discovery
/// service (refunding its credits) and fails the task outright — no retry
/// (§9(iii)).
pub async fn resolve(
    task_id: &str,
    replicas: &[Replica],
    phase: &'static str,
    metrics: &Metrics,
    discovery: &DiscoveryClient,
) -> Result<Vec<(Key, Val)>, ForemanError> {
    let fingerprints: Vec<Fingerprint> = replicas.iter().map(|r| r.fingerprint).collect();
    match vote::majority_index(&fingerprints) {
        Some(winner) => {
            let plaintext = discovery
                .decrypt_for_task(task_id, &replicas[winner].ciphertext)
                .await?;
            let canonical = String::from_utf8_lossy(&plaintext);
            Ok(vote::decode_canonical(&canonical)?)
        },
        None => {
            metrics.increment_no_majority(phase);
            discovery.invalidate_data(task_id).await?;
            Err(ForemanError::NoMajority {
                task_id: task_id.to_owned(),
            })
        },
    }
}
