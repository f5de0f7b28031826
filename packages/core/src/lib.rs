//! Core domain types for the print spooler.
//!
//! This crate contains shared types used across all packages:
//! - Job and JobId for print work items
//! - WorkerStatus and SystemState for status snapshots
//! - Events for real-time updates

mod events;
mod job;
mod status;

pub use events::{EventKind, SpoolEvent};
pub use job::{Job, JobError, JobId};
pub use status::{SystemState, WorkerPhase, WorkerStatus};
