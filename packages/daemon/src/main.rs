//! Spooler daemon.
//!
//! Starts a spooler on a simulated printer and runs a handful of producer
//! users that upload and submit documents concurrently. Exits once the
//! queue has drained, or on Ctrl-C.

use std::error::Error;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use spooler::{
    BroadcastNotifier, FanoutNotifier, Job, Notification, QueueError, SimulatedDevice, SpoolError,
    Spooler, SpoolerConfig, TracingNotifier, WorkerPhase,
};
use storage::{Storage, StoragePayloadStore};
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

type BoxError = Box<dyn Error + Send + Sync>;

const DEFAULT_USERS: u32 = 5;
const RETRY_FULL: Duration = Duration::from_millis(200);
const DRAIN_POLL: Duration = Duration::from_millis(100);

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false))
        .with(env_filter)
        .init();

    let config = SpoolerConfig::from_env()?;
    let users = read_users()?;

    let storage = Storage::from_env().await?;
    info!(backend = storage.kind_str(), "payload storage ready");
    let payloads = Arc::new(StoragePayloadStore::from_current(storage.clone())?);

    let broadcast = BroadcastNotifier::default();
    let notifier = FanoutNotifier::new()
        .with(Arc::new(broadcast.clone()))
        .with(Arc::new(TracingNotifier));
    let device = Arc::new(SimulatedDevice::new(
        config.device_name.clone(),
        config.page_duration(),
    ));
    let spooler = Arc::new(Spooler::new(
        &config,
        device,
        Arc::new(notifier),
        Some(payloads),
    )?);

    let watcher = tokio::spawn(watch_events(broadcast.subscribe()));

    spooler.start()?;
    info!(
        capacity = config.capacity,
        device = %config.device_name,
        users,
        "spooler started"
    );

    let mut producers = JoinSet::new();
    for user in 1..=users {
        producers.spawn(produce(
            format!("user{user}"),
            user,
            Arc::clone(&spooler),
            storage.clone(),
        ));
    }

    tokio::select! {
        _ = drain(&mut producers, &spooler) => info!("all jobs processed"),
        _ = tokio::signal::ctrl_c() => info!("received shutdown signal"),
    }

    producers.abort_all();
    spooler.stop();
    let joined = {
        let spooler = Arc::clone(&spooler);
        tokio::task::spawn_blocking(move || spooler.join()).await?
    };
    if let Err(e) = joined {
        error!("worker exited abnormally: {}", e);
    }

    let leftover = spooler.len();
    if leftover > 0 {
        warn!(leftover, "jobs still queued at shutdown");
    }
    watcher.abort();
    Ok(())
}

fn read_users() -> Result<u32, Box<dyn Error>> {
    match std::env::var("SPOOLD_USERS") {
        Ok(v) if !v.trim().is_empty() => Ok(v.trim().parse()?),
        _ => Ok(DEFAULT_USERS),
    }
}

/// Wait for every producer, then for the queue and the device to go idle.
async fn drain(producers: &mut JoinSet<Result<(), BoxError>>, spooler: &Spooler) {
    while let Some(res) = producers.join_next().await {
        match res {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!("producer failed: {}", e),
            Err(e) => error!("producer task panicked: {}", e),
        }
    }

    loop {
        let status = spooler.status();
        if !status.running {
            warn!("worker is no longer running");
            return;
        }
        if spooler.is_empty() && !status.is_executing {
            return;
        }
        tokio::time::sleep(DRAIN_POLL).await;
    }
}

/// Upload and submit `count` documents on behalf of `user`.
async fn produce(
    user: String,
    count: u32,
    spooler: Arc<Spooler>,
    storage: Storage,
) -> Result<(), BoxError> {
    for i in 0..count {
        let name = format!("Doc-{user}-{i}");
        let pages = 1 + (i * 3 + count) % 5;
        let priority = 1 + ((count * 7 + i * 3) % 10) as i32;

        let body = format!("{name}\n").repeat(pages as usize * 40);
        let stored = storage
            .store_document(&format!("{name}.txt"), Bytes::from(body))
            .await?;

        let job = Job::new(&name, pages, priority, &user)?.with_payload_ref(stored.key)?;
        submit_with_backpressure(&spooler, job).await?;
        info!(user = %user, "submitted {}", name);

        tokio::time::sleep(Duration::from_millis(150 + u64::from(i * 97 % 400))).await;
    }
    Ok(())
}

/// Submit without parking a runtime thread: retry while the queue is full
/// and the worker is still draining it.
async fn submit_with_backpressure(spooler: &Spooler, job: Job) -> Result<(), BoxError> {
    let mut job = job;
    loop {
        match spooler.try_submit(job) {
            Ok(()) => return Ok(()),
            Err(SpoolError::Queue(QueueError::Full(returned))) => {
                let status = spooler.status();
                // A worker that has been told to stop will not make room again.
                if !status.running && status.phase != WorkerPhase::Idle {
                    return Err(format!(
                        "worker is {:?}, giving up on {}",
                        status.phase,
                        returned.name()
                    )
                    .into());
                }
                debug!(job = %returned.id(), "queue full, retrying");
                job = *returned;
                tokio::time::sleep(RETRY_FULL).await;
            }
            Err(e) => return Err(e.into()),
        }
    }
}

async fn watch_events(mut rx: tokio::sync::broadcast::Receiver<Notification>) {
    loop {
        match rx.recv().await {
            Ok(notification) => match notification.to_json() {
                Ok(json) => debug!(target: "spoold::events", "{}", json),
                Err(e) => warn!("failed to encode notification: {}", e),
            },
            Err(RecvError::Lagged(skipped)) => warn!(skipped, "event watcher lagged"),
            Err(RecvError::Closed) => break,
        }
    }
}
