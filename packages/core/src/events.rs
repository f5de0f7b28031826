//! Lifecycle events published by the worker.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Job, JobId};

/// Coarse event category, as seen by a notification sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EventKind {
    Started,
    Finished,
    Error,
    Stopped,
    DeviceUnavailable,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Started => "started",
            EventKind::Finished => "finished",
            EventKind::Error => "error",
            EventKind::Stopped => "stopped",
            EventKind::DeviceUnavailable => "device-unavailable",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Events emitted by the spooler for real-time updates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SpoolEvent {
    /// A job was handed to the device.
    JobStarted {
        job: Job,
        worker: String,
        timestamp: DateTime<Utc>,
    },
    /// The device finished a job.
    JobFinished {
        job_id: JobId,
        name: String,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },
    /// A job failed; `will_retry` tells whether it went back to the queue.
    JobFailed {
        job_id: JobId,
        name: String,
        error: String,
        will_retry: bool,
        timestamp: DateTime<Utc>,
    },
    /// A probe found the device offline.
    DeviceUnavailable {
        device: String,
        timestamp: DateTime<Utc>,
    },
    /// The worker loop is shutting down.
    WorkerStopped {
        worker: String,
        reason: Option<String>,
        timestamp: DateTime<Utc>,
    },
}

impl SpoolEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            SpoolEvent::JobStarted { .. } => EventKind::Started,
            SpoolEvent::JobFinished { .. } => EventKind::Finished,
            SpoolEvent::JobFailed { .. } => EventKind::Error,
            SpoolEvent::DeviceUnavailable { .. } => EventKind::DeviceUnavailable,
            SpoolEvent::WorkerStopped { .. } => EventKind::Stopped,
        }
    }

    /// Get the timestamp of the event.
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            SpoolEvent::JobStarted { timestamp, .. } => *timestamp,
            SpoolEvent::JobFinished { timestamp, .. } => *timestamp,
            SpoolEvent::JobFailed { timestamp, .. } => *timestamp,
            SpoolEvent::DeviceUnavailable { timestamp, .. } => *timestamp,
            SpoolEvent::WorkerStopped { timestamp, .. } => *timestamp,
        }
    }

    /// Get the job ID associated with this event, if any.
    pub fn job_id(&self) -> Option<JobId> {
        match self {
            SpoolEvent::JobStarted { job, .. } => Some(job.id()),
            SpoolEvent::JobFinished { job_id, .. } => Some(*job_id),
            SpoolEvent::JobFailed { job_id, .. } => Some(*job_id),
            _ => None,
        }
    }

    /// Get a short description of this event for logging.
    pub fn description(&self) -> String {
        match self {
            SpoolEvent::JobStarted { job, worker, .. } => {
                format!("{} started on {}", job, worker)
            }
            SpoolEvent::JobFinished {
                name, duration_ms, ..
            } => format!("Job {} finished in {}ms", name, duration_ms),
            SpoolEvent::JobFailed {
                name,
                error,
                will_retry,
                ..
            } => {
                let retry = if *will_retry { " (will retry)" } else { "" };
                format!("Job {} failed: {}{}", name, error, retry)
            }
            SpoolEvent::DeviceUnavailable { device, .. } => {
                format!("Device {} is unavailable", device)
            }
            SpoolEvent::WorkerStopped { worker, reason, .. } => {
                let reason = reason.as_deref().unwrap_or("stop requested");
                format!("Worker {} stopped: {}", worker, reason)
            }
        }
    }
}
