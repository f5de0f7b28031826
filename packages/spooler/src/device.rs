//! The device capability the worker prints through.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use spool_core::Job;

/// Failure reported by a [`Device`] while executing a job.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeviceError {
    /// The device dropped off mid-job.
    #[error("device offline: {0}")]
    Offline(String),

    /// A retryable I/O fault (paper out, cable hiccup, busy spooler).
    #[error("device I/O error: {0}")]
    Io(String),

    /// The payload is in a format the device cannot render.
    #[error("unsupported content: {0}")]
    Unsupported(String),

    /// The payload could not be read or decoded.
    #[error("corrupt content: {0}")]
    Corrupt(String),

    /// The device or its driver is in a state the worker cannot recover from.
    #[error("fatal device fault: {0}")]
    Fatal(String),
}

/// How the worker reacts to a [`DeviceError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// Requeue the job, cool down, re-probe.
    Transient,
    /// Discard the job and move on.
    Permanent,
    /// Stop the worker.
    Fatal,
}

impl DeviceError {
    pub fn class(&self) -> FailureClass {
        match self {
            DeviceError::Offline(_) | DeviceError::Io(_) => FailureClass::Transient,
            DeviceError::Unsupported(_) | DeviceError::Corrupt(_) => FailureClass::Permanent,
            DeviceError::Fatal(_) => FailureClass::Fatal,
        }
    }

    /// Whether the error means the device itself is gone.
    pub fn is_offline(&self) -> bool {
        matches!(self, DeviceError::Offline(_))
    }
}

/// A physical or virtual printer.
///
/// Only the worker thread calls into a device, one call at a time, so
/// implementations need no internal locking around the hardware itself.
/// Rendering a document into printer-control bytes belongs inside an
/// implementation of this trait.
pub trait Device: Send + Sync + 'static {
    /// Human-readable device name used in events and logs.
    fn name(&self) -> &str;

    /// Whether the device can accept work right now.
    fn probe_available(&self) -> bool;

    /// Print a job. Expected to take time roughly proportional to its page count.
    fn execute(&self, job: &Job) -> Result<(), DeviceError>;
}

/// A stand-in printer that spends a fixed time per page.
pub struct SimulatedDevice {
    name: String,
    page_duration: Duration,
    online: AtomicBool,
}

impl SimulatedDevice {
    /// Create an online simulated printer.
    pub fn new(name: impl Into<String>, page_duration: Duration) -> Self {
        Self {
            name: name.into(),
            page_duration,
            online: AtomicBool::new(true),
        }
    }

    /// Take the device on- or offline; the next probe observes the change.
    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }
}

impl Device for SimulatedDevice {
    fn name(&self) -> &str {
        &self.name
    }

    fn probe_available(&self) -> bool {
        self.is_online()
    }

    fn execute(&self, job: &Job) -> Result<(), DeviceError> {
        if !self.is_online() {
            return Err(DeviceError::Offline(self.name.clone()));
        }
        tracing::info!(
            device = %self.name,
            job = %job.id(),
            pages = job.page_count(),
            "printing {}",
            job.name()
        );
        std::thread::sleep(self.page_duration * job.page_count());
        if !self.is_online() {
            return Err(DeviceError::Offline(self.name.clone()));
        }
        Ok(())
    }
}
