//! Prometheus counters for the foreman and worker daemons, grounded on
//! `lgn-worker/src/metrics/mod.rs`'s thin wrapper over the `metrics` facade.

use metrics::counter;
use metrics::gauge;
use metrics::histogram;

pub struct Metrics {}

impl Metrics {
    pub fn new() -> Self {
        Self {}
    }

    pub fn increment_tasks_dispatched(&self, phase: &'static str) {
        counter!("mr_tasks_dispatched_total", "phase" => phase).increment(1);
    }

    pub fn increment_tasks_completed(&self, phase: &'static str) {
        counter!("mr_tasks_completed_total", "phase" => phase).increment(1);
    }

    pub fn increment_no_majority(&self, phase: &'static str) {
        counter!("mr_tasks_no_majority_total", "phase" => phase).increment(1);
    }

    pub fn observe_task_duration(&self, phase: &'static str, seconds: f64) {
        histogram!("mr_task_duration_seconds", "phase" => phase).record(seconds);
    }

    pub fn increment_worker_connections(&self) {
        gauge!("mr_worker_connections").increment(1);
    }

    pub fn decrement_worker_connections(&self) {
        gauge!("mr_worker_connections").decrement(1);
    }

    pub fn increment_sandbox_rejections(&self) {
        counter!("mr_sandbox_rejections_total").increment(1);
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
