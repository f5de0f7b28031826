//! Spooler configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for {var}={value}: {reason}")]
    InvalidValue {
        var: &'static str,
        value: String,
        reason: String,
    },

    #[error("failed reading {var}: {source}")]
    Env {
        var: &'static str,
        source: std::env::VarError,
    },

    #[error("capacity must be positive")]
    ZeroCapacity,
}

/// Tunables for the queue and worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpoolerConfig {
    /// Maximum number of queued jobs.
    pub capacity: usize,
    /// Pause between probes while the device is unavailable.
    pub probe_backoff_ms: u64,
    /// Pause after a transient failure before re-probing.
    pub failure_cooldown_ms: u64,
    /// Time the simulated device spends per page.
    pub page_duration_ms: u64,
    pub device_name: String,
    pub worker_name: String,
}

impl Default for SpoolerConfig {
    fn default() -> Self {
        Self {
            capacity: 10,
            probe_backoff_ms: 2_000,
            failure_cooldown_ms: 3_000,
            page_duration_ms: 1_000,
            device_name: "printer".to_string(),
            worker_name: "worker-1".to_string(),
        }
    }
}

impl SpoolerConfig {
    /// Build a config from environment variables, falling back to defaults.
    ///
    /// - `SPOOL_CAPACITY` (default: 10)
    /// - `SPOOL_PROBE_BACKOFF_MS` (default: 2000)
    /// - `SPOOL_FAILURE_COOLDOWN_MS` (default: 3000)
    /// - `SPOOL_PAGE_DURATION_MS` (default: 1000)
    /// - `SPOOL_DEVICE_NAME` (default: `printer`)
    /// - `SPOOL_WORKER_NAME` (default: `worker-1`)
    ///
    /// Blank values count as unset.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let cfg = Self {
            capacity: parse_env("SPOOL_CAPACITY")?.unwrap_or(defaults.capacity),
            probe_backoff_ms: parse_env("SPOOL_PROBE_BACKOFF_MS")?
                .unwrap_or(defaults.probe_backoff_ms),
            failure_cooldown_ms: parse_env("SPOOL_FAILURE_COOLDOWN_MS")?
                .unwrap_or(defaults.failure_cooldown_ms),
            page_duration_ms: parse_env("SPOOL_PAGE_DURATION_MS")?
                .unwrap_or(defaults.page_duration_ms),
            device_name: read_env("SPOOL_DEVICE_NAME")?.unwrap_or(defaults.device_name),
            worker_name: read_env("SPOOL_WORKER_NAME")?.unwrap_or(defaults.worker_name),
        };
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.capacity == 0 {
            return Err(ConfigError::ZeroCapacity);
        }
        Ok(())
    }

    pub fn probe_backoff(&self) -> Duration {
        Duration::from_millis(self.probe_backoff_ms)
    }

    pub fn failure_cooldown(&self) -> Duration {
        Duration::from_millis(self.failure_cooldown_ms)
    }

    pub fn page_duration(&self) -> Duration {
        Duration::from_millis(self.page_duration_ms)
    }

    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Set both the probe backoff and the failure cooldown.
    pub fn with_intervals(mut self, probe_backoff: Duration, failure_cooldown: Duration) -> Self {
        self.probe_backoff_ms = probe_backoff.as_millis() as u64;
        self.failure_cooldown_ms = failure_cooldown.as_millis() as u64;
        self
    }
}

fn read_env(var: &'static str) -> Result<Option<String>, ConfigError> {
    match std::env::var(var) {
        Ok(v) => Ok(non_empty(v)),
        Err(std::env::VarError::NotPresent) => Ok(None),
        Err(source) => Err(ConfigError::Env { var, source }),
    }
}

fn parse_env<T>(var: &'static str) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    let Some(raw) = read_env(var)? else {
        return Ok(None);
    };
    raw.parse::<T>()
        .map(Some)
        .map_err(|e: T::Err| ConfigError::InvalidValue {
            var,
            value: raw.clone(),
            reason: e.to_string(),
        })
}

fn non_empty(s: String) -> Option<String> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}
