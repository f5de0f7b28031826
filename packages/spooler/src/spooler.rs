//! One queue, one worker, one device, wired together.

use std::sync::Arc;

use spool_core::{Job, SystemState, WorkerStatus};

use crate::config::{ConfigError, SpoolerConfig};
use crate::device::Device;
use crate::notifier::Notifier;
use crate::payload::PayloadStore;
use crate::queue::{JobQueue, QueueError};
use crate::worker::{Worker, WorkerArgs, WorkerError};

#[derive(Debug, thiserror::Error)]
pub enum SpoolError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error(transparent)]
    Worker(#[from] WorkerError),
}

/// The surface an API layer talks to.
///
/// Owns the queue and its single worker. Producers may call [`Spooler::submit`]
/// from any thread; it blocks while the queue is full.
pub struct Spooler {
    queue: Arc<JobQueue>,
    worker: Worker,
    notifier: Arc<dyn Notifier>,
}

impl Spooler {
    /// Build the queue and an unstarted worker from `config`.
    pub fn new(
        config: &SpoolerConfig,
        device: Arc<dyn Device>,
        notifier: Arc<dyn Notifier>,
        payloads: Option<Arc<dyn PayloadStore>>,
    ) -> Result<Self, SpoolError> {
        config.validate()?;
        let queue = Arc::new(JobQueue::new(config.capacity)?);
        let worker = Worker::new(WorkerArgs {
            name: config.worker_name.clone(),
            queue: Arc::clone(&queue),
            device,
            notifier: Arc::clone(&notifier),
            payloads,
            probe_backoff: config.probe_backoff(),
            failure_cooldown: config.failure_cooldown(),
        });
        Ok(Self {
            queue,
            worker,
            notifier,
        })
    }

    /// Queue a job, blocking while the queue is full.
    pub fn submit(&self, job: Job) -> Result<(), SpoolError> {
        tracing::debug!(job = %job.id(), "submitting {}", job);
        self.queue.enqueue(job)?;
        self.notifier.publish_snapshot(self.system_state());
        Ok(())
    }

    /// Queue a job if there is room. A full queue hands the job back inside the error.
    pub fn try_submit(&self, job: Job) -> Result<(), SpoolError> {
        self.queue.try_enqueue(job)?;
        self.notifier.publish_snapshot(self.system_state());
        Ok(())
    }

    /// Ordered copy of the queued jobs.
    pub fn snapshot(&self) -> Vec<Job> {
        self.queue.snapshot()
    }

    /// Number of queued jobs.
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Whether no job is queued.
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Drop every queued job. The job on the device, if any, is unaffected.
    pub fn clear(&self) -> usize {
        let dropped = self.queue.clear();
        tracing::info!(dropped, "queue cleared");
        self.notifier.publish_snapshot(self.system_state());
        dropped
    }

    /// Consistent snapshot of the worker status.
    pub fn status(&self) -> WorkerStatus {
        self.worker.status()
    }

    /// Worker status together with the queued jobs.
    pub fn system_state(&self) -> SystemState {
        self.worker.system_state()
    }

    /// Start the worker thread.
    pub fn start(&self) -> Result<(), SpoolError> {
        self.worker.start()?;
        Ok(())
    }

    /// Ask the worker to exit once any in-flight job is done.
    pub fn stop(&self) {
        self.worker.stop();
    }

    /// Wait for the worker thread to exit. Call [`Spooler::stop`] first.
    pub fn join(&self) -> Result<(), SpoolError> {
        self.worker.join()?;
        Ok(())
    }

    /// The underlying job queue.
    pub fn queue(&self) -> &Arc<JobQueue> {
        &self.queue
    }

    /// The worker draining the queue.
    pub fn worker(&self) -> &Worker {
        &self.worker
    }
}
