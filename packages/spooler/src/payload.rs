//! Capability for releasing externally stored job content.

/// Error returned when a payload cannot be released.
#[derive(Debug, thiserror::Error)]
pub enum PayloadError {
    #[error("payload not found: {0}")]
    NotFound(String),

    #[error("payload backend error: {0}")]
    Backend(String),
}

/// Owner of uploaded document content referenced by [`spool_core::Job::payload_ref`].
///
/// The worker calls [`PayloadStore::release`] once a job no longer needs its
/// content: after it printed, or after it was discarded as unprintable.
/// Failures are logged by the worker and never affect the job outcome.
pub trait PayloadStore: Send + Sync + 'static {
    fn release(&self, payload_ref: &str) -> Result<(), PayloadError>;
}
