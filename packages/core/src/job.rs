//! Print job domain types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Unique identifier for a print job, using ULID for chronological sorting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub Ulid);

impl JobId {
    /// Create a new unique job ID.
    pub fn new() -> Self {
        Self(Ulid::new())
    }

    /// Parse a job ID from a string.
    pub fn parse(s: &str) -> Result<Self, ulid::DecodeError> {
        Ok(Self(Ulid::from_string(s)?))
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Reasons a job is rejected at construction or enqueue time.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum JobError {
    #[error("job name must not be empty")]
    EmptyName,

    #[error("page count must be positive")]
    NoPages,

    #[error("submitter must not be empty")]
    EmptySubmitter,

    #[error("payload reference must not be empty when present")]
    EmptyPayloadRef,
}

/// A document submitted for printing.
///
/// Fields are private so that a constructed job stays valid: everything is
/// checked in [`Job::new`] and nothing mutates a job afterwards. Jobs that
/// arrive through `serde` skip the constructor, which is why the queue calls
/// [`Job::validate`] again on insert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    id: JobId,
    name: String,
    page_count: u32,
    priority: i32,
    submitter: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    payload_ref: Option<String>,
    submitted_at: DateTime<Utc>,
}

impl Job {
    /// Create a validated job with no stored payload.
    ///
    /// Lower `priority` values are served first.
    pub fn new(
        name: impl Into<String>,
        page_count: u32,
        priority: i32,
        submitter: impl Into<String>,
    ) -> Result<Self, JobError> {
        let job = Self {
            id: JobId::new(),
            name: name.into(),
            page_count,
            priority,
            submitter: submitter.into(),
            payload_ref: None,
            submitted_at: Utc::now(),
        };
        job.validate()?;
        Ok(job)
    }

    /// Attach a reference to externally stored content (a file path or object key).
    pub fn with_payload_ref(mut self, payload_ref: impl Into<String>) -> Result<Self, JobError> {
        self.payload_ref = Some(payload_ref.into());
        self.validate()?;
        Ok(self)
    }

    /// Check every field invariant.
    pub fn validate(&self) -> Result<(), JobError> {
        if self.name.trim().is_empty() {
            return Err(JobError::EmptyName);
        }
        if self.page_count == 0 {
            return Err(JobError::NoPages);
        }
        if self.submitter.trim().is_empty() {
            return Err(JobError::EmptySubmitter);
        }
        if self
            .payload_ref
            .as_deref()
            .is_some_and(|r| r.trim().is_empty())
        {
            return Err(JobError::EmptyPayloadRef);
        }
        Ok(())
    }

    /// Unique job identifier.
    pub fn id(&self) -> JobId {
        self.id
    }

    /// Document identifier.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of billable pages.
    pub fn page_count(&self) -> u32 {
        self.page_count
    }

    /// Scheduling priority; lower values are served first.
    pub fn priority(&self) -> i32 {
        self.priority
    }

    /// Who submitted the job.
    pub fn submitter(&self) -> &str {
        &self.submitter
    }

    /// Reference to the stored document content, if any.
    pub fn payload_ref(&self) -> Option<&str> {
        self.payload_ref.as_deref()
    }

    /// When the job was created.
    pub fn submitted_at(&self) -> DateTime<Utc> {
        self.submitted_at
    }
}

impl std::fmt::Display for Job {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Job {}, pages={}, priority={} by {}",
            self.name, self.page_count, self.priority, self.submitter
        )
    }
}
