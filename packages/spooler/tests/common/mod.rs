#![allow(dead_code, clippy::disallowed_methods)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, Once};
use std::time::{Duration, Instant};

use spooler::{
    Device, DeviceError, EventKind, Job, Notifier, PayloadError, PayloadStore, SpoolEvent,
    SystemState,
};

static TRACING: Once = Once::new();

pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_test_writer()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .try_init();
    });
}

/// Device whose `execute` results are scripted in advance.
///
/// Once the script runs out every job succeeds.
pub struct ScriptedDevice {
    available: AtomicBool,
    script: Mutex<VecDeque<Result<(), DeviceError>>>,
    executed: Mutex<Vec<String>>,
    probes: AtomicUsize,
    delay: Duration,
}

impl ScriptedDevice {
    pub fn new() -> Self {
        Self {
            available: AtomicBool::new(true),
            script: Mutex::new(VecDeque::new()),
            executed: Mutex::new(Vec::new()),
            probes: AtomicUsize::new(0),
            delay: Duration::ZERO,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_script(self, results: impl IntoIterator<Item = Result<(), DeviceError>>) -> Self {
        self.script.lock().unwrap().extend(results);
        self
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Names of jobs passed to `execute`, in call order.
    pub fn executed(&self) -> Vec<String> {
        self.executed.lock().unwrap().clone()
    }

    pub fn probes(&self) -> usize {
        self.probes.load(Ordering::SeqCst)
    }
}

impl Device for ScriptedDevice {
    fn name(&self) -> &str {
        "scripted"
    }

    fn probe_available(&self) -> bool {
        self.probes.fetch_add(1, Ordering::SeqCst);
        self.available.load(Ordering::SeqCst)
    }

    fn execute(&self, job: &Job) -> Result<(), DeviceError> {
        self.executed.lock().unwrap().push(job.name().to_string());
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
        self.script.lock().unwrap().pop_front().unwrap_or(Ok(()))
    }
}

/// Records everything it is handed.
#[derive(Default)]
pub struct RecordingNotifier {
    events: Mutex<Vec<SpoolEvent>>,
    snapshots: Mutex<Vec<SystemState>>,
}

impl RecordingNotifier {
    pub fn events(&self) -> Vec<SpoolEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn kinds(&self) -> Vec<EventKind> {
        self.events().iter().map(SpoolEvent::kind).collect()
    }

    pub fn count(&self, kind: EventKind) -> usize {
        self.kinds().into_iter().filter(|k| *k == kind).count()
    }

    pub fn snapshots(&self) -> Vec<SystemState> {
        self.snapshots.lock().unwrap().clone()
    }
}

impl Notifier for RecordingNotifier {
    fn publish(&self, event: SpoolEvent) {
        self.events.lock().unwrap().push(event);
    }

    fn publish_snapshot(&self, state: SystemState) {
        self.snapshots.lock().unwrap().push(state);
    }
}

/// Payload store that remembers which references were released.
#[derive(Default)]
pub struct RecordingPayloadStore {
    released: Mutex<Vec<String>>,
    fail: AtomicBool,
}

impl RecordingPayloadStore {
    pub fn failing() -> Self {
        Self {
            released: Mutex::new(Vec::new()),
            fail: AtomicBool::new(true),
        }
    }

    pub fn released(&self) -> Vec<String> {
        self.released.lock().unwrap().clone()
    }
}

impl PayloadStore for RecordingPayloadStore {
    fn release(&self, payload_ref: &str) -> Result<(), PayloadError> {
        self.released.lock().unwrap().push(payload_ref.to_string());
        if self.fail.load(Ordering::SeqCst) {
            return Err(PayloadError::Backend("disk full".into()));
        }
        Ok(())
    }
}

pub fn job(name: &str, priority: i32) -> Job {
    Job::new(name, 1, priority, "tester").unwrap()
}

pub fn names(jobs: &[Job]) -> Vec<&str> {
    jobs.iter().map(Job::name).collect()
}

/// Poll `cond` until it holds or `timeout` elapses.
pub fn wait_until(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    cond()
}
