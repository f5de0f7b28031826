//! Bounded, priority-ordered blocking queue of print jobs.

use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

use spool_core::{Job, JobError};

/// Errors returned by [`JobQueue`] operations.
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("queue capacity must be positive")]
    InvalidCapacity,

    #[error("invalid job: {0}")]
    InvalidJob(#[from] JobError),

    /// Non-blocking insert into a full queue; the job is handed back.
    #[error("queue is full")]
    Full(Box<Job>),
}

impl QueueError {
    /// Recover the job from a `Full` rejection.
    pub fn into_job(self) -> Option<Job> {
        match self {
            QueueError::Full(job) => Some(*job),
            _ => None,
        }
    }
}

/// A thread-safe job store served lowest priority value first, FIFO among equals.
///
/// All state lives behind one mutex. `not_empty` parks consumers and
/// `not_full` parks producers; both are tied to that mutex so a wakeup can
/// never slip between a waiter's check and its wait.
pub struct JobQueue {
    capacity: usize,
    jobs: Mutex<Vec<Job>>,
    not_empty: Condvar,
    not_full: Condvar,
}

impl JobQueue {
    /// Create an empty queue holding at most `capacity` jobs.
    pub fn new(capacity: usize) -> Result<Self, QueueError> {
        if capacity == 0 {
            return Err(QueueError::InvalidCapacity);
        }
        Ok(Self {
            capacity,
            jobs: Mutex::new(Vec::with_capacity(capacity)),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
        })
    }

    /// Maximum number of queued jobs.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Insert a job, blocking while the queue is full.
    ///
    /// A malformed job is rejected immediately, without waiting for space.
    pub fn enqueue(&self, job: Job) -> Result<(), QueueError> {
        job.validate()?;

        let mut jobs = self.lock();
        while jobs.len() >= self.capacity {
            tracing::debug!(
                size = jobs.len(),
                capacity = self.capacity,
                "queue full, producer waiting"
            );
            jobs = self
                .not_full
                .wait(jobs)
                .unwrap_or_else(PoisonError::into_inner);
        }
        self.insert(&mut jobs, job);
        Ok(())
    }

    /// Insert a job if there is room, otherwise hand it back in [`QueueError::Full`].
    pub fn try_enqueue(&self, job: Job) -> Result<(), QueueError> {
        job.validate()?;

        let mut jobs = self.lock();
        if jobs.len() >= self.capacity {
            return Err(QueueError::Full(Box::new(job)));
        }
        self.insert(&mut jobs, job);
        Ok(())
    }

    /// Remove the head job, blocking while the queue is empty.
    pub fn dequeue(&self) -> Job {
        let mut jobs = self.lock();
        loop {
            if let Some(job) = self.remove_head(&mut jobs) {
                return job;
            }
            tracing::debug!(capacity = self.capacity, "queue empty, consumer waiting");
            jobs = self
                .not_empty
                .wait(jobs)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Remove the head job, blocking while the queue is empty, unless `cancelled` returns true.
    ///
    /// `cancelled` is evaluated with the queue lock held, before every wait
    /// and after every wakeup, so a canceller that flips its flag and then
    /// calls [`JobQueue::wake_consumers`] cannot be missed. Returns `None`
    /// without removing anything once cancelled.
    pub fn dequeue_unless(&self, cancelled: impl Fn() -> bool) -> Option<Job> {
        let mut jobs = self.lock();
        loop {
            if cancelled() {
                return None;
            }
            if let Some(job) = self.remove_head(&mut jobs) {
                return Some(job);
            }
            jobs = self
                .not_empty
                .wait(jobs)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Remove the head job if there is one.
    pub fn try_dequeue(&self) -> Option<Job> {
        let mut jobs = self.lock();
        self.remove_head(&mut jobs)
    }

    /// Wake every consumer blocked in a dequeue so it re-checks its cancellation.
    pub fn wake_consumers(&self) {
        let _jobs = self.lock();
        self.not_empty.notify_all();
    }

    /// Ordered copy of the queued jobs.
    pub fn snapshot(&self) -> Vec<Job> {
        self.lock().clone()
    }

    /// Drop every queued job and wake all blocked producers and consumers.
    ///
    /// Returns how many jobs were discarded.
    pub fn clear(&self) -> usize {
        let mut jobs = self.lock();
        let discarded = jobs.len();
        jobs.clear();
        self.not_full.notify_all();
        self.not_empty.notify_all();
        discarded
    }

    /// Number of queued jobs. May be stale by the time it is read.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether no job is queued.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Whether an `enqueue` would block right now.
    pub fn is_full(&self) -> bool {
        self.lock().len() >= self.capacity
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Job>> {
        // Every mutation is a single Vec call, so a poisoned guard still holds a sorted queue.
        self.jobs.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn insert(&self, jobs: &mut Vec<Job>, job: Job) {
        // First slot whose priority is strictly greater: equal priorities stay FIFO.
        let position = jobs.partition_point(|queued| queued.priority() <= job.priority());
        jobs.insert(position, job);
        self.not_empty.notify_one();
    }

    fn remove_head(&self, jobs: &mut Vec<Job>) -> Option<Job> {
        if jobs.is_empty() {
            return None;
        }
        let job = jobs.remove(0);
        self.not_full.notify_one();
        Some(job)
    }
}

impl std::fmt::Debug for JobQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobQueue")
            .field("capacity", &self.capacity)
            .field("len", &self.len())
            .finish()
    }
}

impl std::fmt::Display for JobQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let jobs = self.snapshot();
        writeln!(f, "Current jobs ({}/{}):", jobs.len(), self.capacity)?;
        for job in &jobs {
            writeln!(f, "{}", job)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::disallowed_methods)]

    use super::*;
    use std::error::Error;

    fn job(name: &str, priority: i32) -> Result<Job, JobError> {
        Job::new(name, 1, priority, "tester")
    }

    fn names(jobs: &[Job]) -> Vec<&str> {
        jobs.iter().map(Job::name).collect()
    }

    #[test]
    fn zero_capacity_is_rejected() {
        assert!(matches!(JobQueue::new(0), Err(QueueError::InvalidCapacity)));
    }

    #[test]
    fn orders_by_priority_then_arrival() -> Result<(), Box<dyn Error>> {
        let queue = JobQueue::new(10)?;
        queue.enqueue(job("low", 10)?)?;
        queue.enqueue(job("high", 2)?)?;
        queue.enqueue(job("mid", 3)?)?;
        queue.enqueue(job("mid-2", 3)?)?;
        queue.enqueue(job("top", 1)?)?;
        queue.enqueue(job("high-2", 2)?)?;

        assert_eq!(
            names(&queue.snapshot()),
            ["top", "high", "high-2", "mid", "mid-2", "low"]
        );
        assert_eq!(queue.dequeue().name(), "top");
        assert_eq!(queue.len(), 5);
        Ok(())
    }

    #[test]
    fn try_enqueue_hands_back_job_when_full() -> Result<(), Box<dyn Error>> {
        let queue = JobQueue::new(1)?;
        queue.try_enqueue(job("first", 1)?)?;
        assert!(queue.is_full());

        let rejected = queue.try_enqueue(job("second", 0)?);
        let returned = rejected.err().and_then(QueueError::into_job);
        assert_eq!(returned.as_ref().map(Job::name), Some("second"));
        assert_eq!(names(&queue.snapshot()), ["first"]);
        Ok(())
    }

    #[test]
    fn malformed_job_fails_fast_on_full_queue() -> Result<(), Box<dyn Error>> {
        let queue = JobQueue::new(1)?;
        queue.enqueue(job("resident", 1)?)?;

        let raw = serde_json::json!({
            "id": spool_core::JobId::new(),
            "name": "",
            "page_count": 1,
            "priority": 1,
            "submitter": "mallory",
            "submitted_at": chrono::Utc::now(),
        });
        let bad: Job = serde_json::from_value(raw)?;
        // Would block forever if validation happened after the capacity wait.
        assert!(matches!(
            queue.enqueue(bad),
            Err(QueueError::InvalidJob(JobError::EmptyName))
        ));
        Ok(())
    }

    #[test]
    fn clear_discards_everything() -> Result<(), Box<dyn Error>> {
        let queue = JobQueue::new(3)?;
        queue.enqueue(job("a", 1)?)?;
        queue.enqueue(job("b", 2)?)?;
        assert_eq!(queue.clear(), 2);
        assert!(queue.is_empty());
        assert!(queue.try_dequeue().is_none());
        Ok(())
    }

    #[test]
    fn dequeue_unless_returns_none_once_cancelled() -> Result<(), Box<dyn Error>> {
        let queue = JobQueue::new(2)?;
        queue.enqueue(job("kept", 1)?)?;
        assert!(queue.dequeue_unless(|| true).is_none());
        assert_eq!(queue.len(), 1);
        let next = queue.dequeue_unless(|| false);
        assert_eq!(next.as_ref().map(Job::name), Some("kept"));
        Ok(())
    }

    #[test]
    fn display_lists_jobs_in_order() -> Result<(), Box<dyn Error>> {
        let queue = JobQueue::new(4)?;
        queue.enqueue(job("b", 2)?)?;
        queue.enqueue(job("a", 1)?)?;
        let rendered = queue.to_string();
        let lines: Vec<&str> = rendered.lines().collect();
        assert_eq!(lines[0], "Current jobs (2/4):");
        assert!(lines[1].starts_with("Job a,"));
        assert!(lines[2].starts_with("Job b,"));
        Ok(())
    }
}
