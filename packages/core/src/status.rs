//! Worker status and full system snapshots for observers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::Job;

/// Where the worker currently is in its execution loop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerPhase {
    /// Constructed but not started.
    #[default]
    Idle,
    /// Waiting for the device to report itself available.
    Probing,
    /// Blocked on the queue for the next job.
    Waiting,
    /// A job is on the device.
    Executing,
    /// Backing off after a transient failure.
    CoolingDown,
    /// The loop has exited or is about to.
    Stopped,
}

impl std::fmt::Display for WorkerPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WorkerPhase::Idle => write!(f, "idle"),
            WorkerPhase::Probing => write!(f, "probing"),
            WorkerPhase::Waiting => write!(f, "waiting"),
            WorkerPhase::Executing => write!(f, "executing"),
            WorkerPhase::CoolingDown => write!(f, "cooling_down"),
            WorkerPhase::Stopped => write!(f, "stopped"),
        }
    }
}

/// A consistent view of the worker, taken under a single lock acquisition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerStatus {
    /// True from start until a stop is requested.
    pub running: bool,
    /// Result of the last device probe.
    pub device_available: bool,
    /// The job on the device, if any.
    pub current_job: Option<Job>,
    /// Always equal to `current_job.is_some()`.
    pub is_executing: bool,
    pub phase: WorkerPhase,
}

impl WorkerStatus {
    /// Build a status whose `is_executing` flag is derived from `current_job`.
    pub fn new(
        running: bool,
        device_available: bool,
        current_job: Option<Job>,
        phase: WorkerPhase,
    ) -> Self {
        Self {
            running,
            device_available,
            is_executing: current_job.is_some(),
            current_job,
            phase,
        }
    }
}

/// Everything a status page needs in one push: worker state plus the queued jobs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemState {
    pub worker: WorkerStatus,
    /// Queued jobs in service order.
    pub queue: Vec<Job>,
    pub queue_length: usize,
    pub capacity: usize,
    pub timestamp: DateTime<Utc>,
}

impl SystemState {
    pub fn new(worker: WorkerStatus, queue: Vec<Job>, capacity: usize) -> Self {
        Self {
            worker,
            queue_length: queue.len(),
            queue,
            capacity,
            timestamp: Utc::now(),
        }
    }
}
