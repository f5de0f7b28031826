//! Print spooler core.
//!
//! A bounded, priority-ordered blocking queue drained by a single worker
//! thread that prints through a [`Device`] and reports through a [`Notifier`].
//!
//! # Architecture
//!
//! - `JobQueue` - Thread-safe store, lowest priority value first, FIFO among ties
//! - `Worker` - Probes the device, executes jobs, retries transient failures
//! - `Spooler` - Owns one queue and its worker
//!
//! # Usage
//!
//! ```ignore
//! use spooler::{Spooler, SpoolerConfig, SimulatedDevice, TracingNotifier};
//!
//! let config = SpoolerConfig::from_env()?;
//! let device = Arc::new(SimulatedDevice::new("lp0", config.page_duration()));
//! let spooler = Spooler::new(&config, device, Arc::new(TracingNotifier), None)?;
//! spooler.start()?;
//! spooler.submit(Job::new("report.pdf", 3, 1, "alice")?)?;
//! ```

mod config;
mod device;
mod notifier;
mod payload;
mod queue;
mod spooler;
mod worker;

pub use config::{ConfigError, SpoolerConfig};
pub use device::{Device, DeviceError, FailureClass, SimulatedDevice};
pub use notifier::{BroadcastNotifier, FanoutNotifier, Notification, Notifier, TracingNotifier};
pub use payload::{PayloadError, PayloadStore};
pub use queue::{JobQueue, QueueError};
pub use spooler::{SpoolError, Spooler};
pub use worker::{Worker, WorkerArgs, WorkerError};

/// Re-export the shared value types.
pub use spool_core::{
    EventKind, Job, JobError, JobId, SpoolEvent, SystemState, WorkerPhase, WorkerStatus,
};
