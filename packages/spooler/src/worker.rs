//! The single consumer that drains a [`JobQueue`] into a [`Device`].

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use chrono::Utc;
use spool_core::{Job, SpoolEvent, SystemState, WorkerPhase, WorkerStatus};

use crate::device::{Device, DeviceError, FailureClass};
use crate::notifier::Notifier;
use crate::payload::PayloadStore;
use crate::queue::JobQueue;

#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    #[error("worker {0} was already started")]
    AlreadyStarted(String),

    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("worker {0} was stopped before it started")]
    StoppedBeforeStart(String),

    #[error("worker thread panicked")]
    Panicked,
}

/// Everything a worker needs to run.
pub struct WorkerArgs {
    pub name: String,
    pub queue: Arc<JobQueue>,
    pub device: Arc<dyn Device>,
    pub notifier: Arc<dyn Notifier>,
    pub payloads: Option<Arc<dyn PayloadStore>>,
    /// Pause between probes while the device is unavailable.
    pub probe_backoff: Duration,
    /// Pause after a transient failure before re-probing.
    pub failure_cooldown: Duration,
}

/// Mutable worker state, only touched under `Shared::status`.
#[derive(Default)]
struct StatusCell {
    running: bool,
    /// Sticky once set, so a stop that lands before `start` is not lost.
    stop_requested: bool,
    device_available: bool,
    current_job: Option<Job>,
    phase: WorkerPhase,
}

struct Shared {
    name: String,
    queue: Arc<JobQueue>,
    device: Arc<dyn Device>,
    notifier: Arc<dyn Notifier>,
    payloads: Option<Arc<dyn PayloadStore>>,
    probe_backoff: Duration,
    failure_cooldown: Duration,
    status: Mutex<StatusCell>,
    /// Paired with `status`; interrupts backoff and cooldown pauses on stop.
    stop_signal: Condvar,
}

/// What the loop does after a job leaves the device.
enum Outcome {
    /// Go back to the queue.
    Next,
    /// Cool down, re-probe, then retry. Carries the job if the queue had no room for it.
    Retry(Option<Job>),
    /// Leave the loop.
    Fatal,
}

/// A single-consumer execution loop on its own OS thread.
///
/// The loop probes the device until it is available, blocks on the queue,
/// prints each job, and reports every transition through the notifier.
/// Transient failures put the job back in the queue and force a re-probe;
/// permanent failures discard it; fatal faults end the loop.
pub struct Worker {
    shared: Arc<Shared>,
    started: AtomicBool,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl Worker {
    /// Create a worker; nothing runs until [`Worker::start`].
    pub fn new(args: WorkerArgs) -> Self {
        Self {
            shared: Arc::new(Shared {
                name: args.name,
                queue: args.queue,
                device: args.device,
                notifier: args.notifier,
                payloads: args.payloads,
                probe_backoff: args.probe_backoff,
                failure_cooldown: args.failure_cooldown,
                status: Mutex::new(StatusCell::default()),
                stop_signal: Condvar::new(),
            }),
            started: AtomicBool::new(false),
            handle: Mutex::new(None),
        }
    }

    /// Thread and event name of this worker.
    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// The queue this worker drains.
    pub fn queue(&self) -> &Arc<JobQueue> {
        &self.shared.queue
    }

    /// Spawn the worker thread. A worker can be started once.
    pub fn start(&self) -> Result<(), WorkerError> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(WorkerError::AlreadyStarted(self.shared.name.clone()));
        }

        {
            let mut status = self.shared.lock_status();
            if status.stop_requested {
                status.phase = WorkerPhase::Stopped;
                return Err(WorkerError::StoppedBeforeStart(self.shared.name.clone()));
            }
            status.running = true;
            status.phase = WorkerPhase::Probing;
        }

        let shared = Arc::clone(&self.shared);
        let spawned = std::thread::Builder::new()
            .name(self.shared.name.clone())
            .spawn(move || shared.run());

        match spawned {
            Ok(handle) => {
                *self.handle.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle);
                Ok(())
            }
            Err(e) => {
                let mut status = self.shared.lock_status();
                status.running = false;
                status.phase = WorkerPhase::Stopped;
                Err(WorkerError::Spawn(e))
            }
        }
    }

    /// Ask the loop to exit.
    ///
    /// Does not interrupt a job already on the device; the loop exits once
    /// that job finishes or fails. A worker blocked on an empty queue, or
    /// sleeping in a backoff, is woken immediately. Calling this more than
    /// once is harmless. A worker stopped before [`Worker::start`] never runs.
    pub fn stop(&self) {
        let was_running = {
            let mut status = self.shared.lock_status();
            status.stop_requested = true;
            if !self.started.load(Ordering::SeqCst) {
                status.phase = WorkerPhase::Stopped;
            }
            std::mem::replace(&mut status.running, false)
        };
        self.shared.stop_signal.notify_all();
        self.shared.queue.wake_consumers();

        if was_running {
            tracing::info!(worker = %self.shared.name, "stop requested");
            self.shared.notifier.publish(SpoolEvent::WorkerStopped {
                worker: self.shared.name.clone(),
                reason: None,
                timestamp: Utc::now(),
            });
        }
    }

    /// Wait for the worker thread to exit.
    pub fn join(&self) -> Result<(), WorkerError> {
        let handle = self
            .handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match handle {
            Some(handle) => handle.join().map_err(|_| WorkerError::Panicked),
            None => Ok(()),
        }
    }

    /// Check whether the worker thread has exited.
    pub fn is_finished(&self) -> bool {
        self.handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_none_or(JoinHandle::is_finished)
    }

    /// Status taken under a single lock acquisition.
    pub fn status(&self) -> WorkerStatus {
        self.shared.status()
    }

    /// Worker status together with the queued jobs.
    pub fn system_state(&self) -> SystemState {
        self.shared.system_state()
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        self.stop();
    }
}

impl Shared {
    fn lock_status(&self) -> MutexGuard<'_, StatusCell> {
        self.status.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_running(&self) -> bool {
        self.lock_status().running
    }

    fn set_phase(&self, phase: WorkerPhase) {
        self.lock_status().phase = phase;
    }

    fn status(&self) -> WorkerStatus {
        let status = self.lock_status();
        WorkerStatus::new(
            status.running,
            status.device_available,
            status.current_job.clone(),
            status.phase,
        )
    }

    fn system_state(&self) -> SystemState {
        SystemState::new(self.status(), self.queue.snapshot(), self.queue.capacity())
    }

    fn publish_state(&self) {
        self.notifier.publish_snapshot(self.system_state());
    }

    fn run(self: Arc<Self>) {
        tracing::info!(
            worker = %self.name,
            device = %self.device.name(),
            "worker started"
        );

        self.work_loop();

        {
            let mut status = self.lock_status();
            status.running = false;
            status.current_job = None;
            status.phase = WorkerPhase::Stopped;
        }
        tracing::info!(worker = %self.name, "worker stopped");
        self.publish_state();
    }

    fn work_loop(&self) {
        let mut needs_probe = true;
        let mut announced_offline = false;
        let mut held: Option<Job> = None;

        while self.is_running() {
            if needs_probe {
                if !self.probe() {
                    if !announced_offline {
                        announced_offline = true;
                        tracing::warn!(
                            worker = %self.name,
                            device = %self.device.name(),
                            "device unavailable, retrying in {:?}",
                            self.probe_backoff
                        );
                        self.notifier.publish(SpoolEvent::DeviceUnavailable {
                            device: self.device.name().to_string(),
                            timestamp: Utc::now(),
                        });
                        self.publish_state();
                    }
                    self.pause(self.probe_backoff, WorkerPhase::Probing);
                    continue;
                }
                announced_offline = false;
                needs_probe = false;
            }

            let job = match held.take() {
                Some(job) => job,
                None => {
                    self.set_phase(WorkerPhase::Waiting);
                    match self.queue.dequeue_unless(|| !self.is_running()) {
                        Some(job) => job,
                        None => continue,
                    }
                }
            };

            let Some(job) = self.claim(job) else {
                continue;
            };

            match self.execute(job) {
                Outcome::Next => {}
                Outcome::Retry(job) => {
                    held = job;
                    needs_probe = true;
                    self.pause(self.failure_cooldown, WorkerPhase::CoolingDown);
                }
                Outcome::Fatal => break,
            }
        }

        if let Some(job) = held {
            self.finish_held(job);
        }
    }

    /// Settle a job kept back after a transient failure once the loop has exited.
    ///
    /// Re-queued if there is room now; otherwise printed before exiting, as
    /// `claim` does. Reported lost only if that last attempt fails too.
    fn finish_held(&self, job: Job) {
        let job = match self.queue.try_enqueue(job) {
            Ok(()) => return,
            Err(e) => match e.into_job() {
                Some(job) => job,
                None => return,
            },
        };

        tracing::warn!(
            worker = %self.name,
            job = %job.id(),
            "queue full during stop, printing {} before exiting",
            job.name()
        );
        let outcome = if self.probe() {
            {
                let mut status = self.lock_status();
                status.current_job = Some(job.clone());
                status.phase = WorkerPhase::Executing;
            }
            self.execute(job)
        } else {
            Outcome::Retry(Some(job))
        };

        if let Outcome::Retry(Some(job)) = outcome {
            tracing::error!(
                worker = %self.name,
                job = %job.id(),
                "dropping {}: not printed and no room to re-queue at shutdown",
                job
            );
            self.notifier.publish(SpoolEvent::JobFailed {
                job_id: job.id(),
                name: job.name().to_string(),
                error: "not printed and no room to re-queue at shutdown".to_string(),
                will_retry: false,
                timestamp: Utc::now(),
            });
        }
    }

    fn probe(&self) -> bool {
        self.set_phase(WorkerPhase::Probing);
        let available = panic::catch_unwind(AssertUnwindSafe(|| self.device.probe_available()))
            .unwrap_or_else(|payload| {
                tracing::error!(
                    worker = %self.name,
                    "device probe panicked: {}",
                    panic_message(payload.as_ref())
                );
                false
            });
        self.lock_status().device_available = available;
        available
    }

    /// Sleep for `duration`, returning early if a stop is requested.
    fn pause(&self, duration: Duration, phase: WorkerPhase) {
        let mut status = self.lock_status();
        status.phase = phase;
        let _ = self
            .stop_signal
            .wait_timeout_while(status, duration, |s| s.running)
            .unwrap_or_else(PoisonError::into_inner);
    }

    /// Take ownership of a dequeued job, or hand it back if a stop landed first.
    fn claim(&self, job: Job) -> Option<Job> {
        {
            let mut status = self.lock_status();
            if status.running {
                status.current_job = Some(job.clone());
                status.phase = WorkerPhase::Executing;
                return Some(job);
            }
        }

        match self.queue.try_enqueue(job) {
            Ok(()) => {
                tracing::info!(worker = %self.name, "stop requested, job returned to queue");
                None
            }
            Err(e) => {
                let job = e.into_job()?;
                // No room to put it back: printing it is the only way not to lose it.
                tracing::warn!(
                    worker = %self.name,
                    job = %job.id(),
                    "queue full during stop, printing {} before exiting",
                    job.name()
                );
                let mut status = self.lock_status();
                status.current_job = Some(job.clone());
                status.phase = WorkerPhase::Executing;
                Some(job)
            }
        }
    }

    fn execute(&self, job: Job) -> Outcome {
        tracing::info!(worker = %self.name, job = %job.id(), "printing {}", job);
        self.notifier.publish(SpoolEvent::JobStarted {
            job: job.clone(),
            worker: self.name.clone(),
            timestamp: Utc::now(),
        });
        self.publish_state();

        let started = Instant::now();
        let result = panic::catch_unwind(AssertUnwindSafe(|| self.device.execute(&job)))
            .unwrap_or_else(|payload| {
                Err(DeviceError::Fatal(format!(
                    "device panicked: {}",
                    panic_message(payload.as_ref())
                )))
            });
        let duration_ms = started.elapsed().as_millis() as u64;

        {
            let mut status = self.lock_status();
            status.current_job = None;
            status.phase = WorkerPhase::Idle;
            if matches!(&result, Err(e) if e.is_offline()) {
                status.device_available = false;
            }
        }

        let outcome = match result {
            Ok(()) => {
                tracing::info!(
                    worker = %self.name,
                    job = %job.id(),
                    duration_ms,
                    "finished {}",
                    job.name()
                );
                self.notifier.publish(SpoolEvent::JobFinished {
                    job_id: job.id(),
                    name: job.name().to_string(),
                    duration_ms,
                    timestamp: Utc::now(),
                });
                self.release_payload(&job);
                Outcome::Next
            }
            Err(error) => match error.class() {
                FailureClass::Transient => self.requeue_after_failure(job, &error),
                FailureClass::Permanent => {
                    tracing::warn!(
                        worker = %self.name,
                        job = %job.id(),
                        "discarding {}: {}",
                        job.name(),
                        error
                    );
                    self.report_failure(&job, &error, false);
                    self.release_payload(&job);
                    Outcome::Next
                }
                FailureClass::Fatal => {
                    self.shut_down_after_fault(job, &error);
                    Outcome::Fatal
                }
            },
        };

        self.publish_state();
        outcome
    }

    fn requeue_after_failure(&self, job: Job, error: &DeviceError) -> Outcome {
        tracing::warn!(
            worker = %self.name,
            job = %job.id(),
            "transient failure on {}, re-queueing: {}",
            job.name(),
            error
        );
        self.report_failure(&job, error, true);

        // The worker is the only consumer, so blocking here on a full queue would never end.
        match self.queue.try_enqueue(job) {
            Ok(()) => Outcome::Retry(None),
            Err(e) => {
                let held = e.into_job();
                if let Some(job) = &held {
                    tracing::warn!(
                        worker = %self.name,
                        job = %job.id(),
                        "queue full, holding {} for the next attempt",
                        job.name()
                    );
                }
                Outcome::Retry(held)
            }
        }
    }

    fn shut_down_after_fault(&self, job: Job, error: &DeviceError) {
        tracing::error!(
            worker = %self.name,
            job = %job.id(),
            "fatal device fault while printing {}: {}",
            job.name(),
            error
        );
        let requeued = self.queue.try_enqueue(job.clone()).is_ok();
        self.report_failure(&job, error, requeued);

        let was_running = {
            let mut status = self.lock_status();
            std::mem::replace(&mut status.running, false)
        };
        if was_running {
            self.notifier.publish(SpoolEvent::WorkerStopped {
                worker: self.name.clone(),
                reason: Some(error.to_string()),
                timestamp: Utc::now(),
            });
        }
    }

    fn report_failure(&self, job: &Job, error: &DeviceError, will_retry: bool) {
        self.notifier.publish(SpoolEvent::JobFailed {
            job_id: job.id(),
            name: job.name().to_string(),
            error: error.to_string(),
            will_retry,
            timestamp: Utc::now(),
        });
    }

    fn release_payload(&self, job: &Job) {
        let (Some(store), Some(payload_ref)) = (&self.payloads, job.payload_ref()) else {
            return;
        };
        if let Err(e) = store.release(payload_ref) {
            tracing::warn!(
                worker = %self.name,
                job = %job.id(),
                payload = payload_ref,
                "failed to release payload: {}",
                e
            );
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
