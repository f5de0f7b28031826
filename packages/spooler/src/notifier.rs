//! Notification sinks for worker lifecycle events and state pushes.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use spool_core::{SpoolEvent, SystemState};
use tokio::sync::broadcast;

/// Receiver of lifecycle events. Both methods are fire-and-forget.
pub trait Notifier: Send + Sync + 'static {
    /// Publish a single lifecycle event.
    fn publish(&self, event: SpoolEvent);

    /// Push the full system state.
    fn publish_snapshot(&self, state: SystemState);
}

/// Everything a live observer receives, in one stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum Notification {
    Event(SpoolEvent),
    SystemState(SystemState),
}

impl Notification {
    /// Render as a JSON text frame for a WebSocket or SSE layer.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Fans notifications out over a tokio broadcast channel.
///
/// Sending never blocks; with no subscribers the notification is dropped,
/// and slow subscribers see `RecvError::Lagged` rather than stalling the worker.
#[derive(Clone)]
pub struct BroadcastNotifier {
    tx: broadcast::Sender<Notification>,
}

impl BroadcastNotifier {
    pub fn new(buffer: usize) -> Self {
        let (tx, _) = broadcast::channel(buffer);
        Self { tx }
    }

    /// Subscribe to the notification stream.
    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.tx.subscribe()
    }

    pub fn sender(&self) -> broadcast::Sender<Notification> {
        self.tx.clone()
    }
}

impl Default for BroadcastNotifier {
    fn default() -> Self {
        Self::new(1024)
    }
}

impl Notifier for BroadcastNotifier {
    fn publish(&self, event: SpoolEvent) {
        let _ = self.tx.send(Notification::Event(event));
    }

    fn publish_snapshot(&self, state: SystemState) {
        let _ = self.tx.send(Notification::SystemState(state));
    }
}

/// Writes every event to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn publish(&self, event: SpoolEvent) {
        let kind = event.kind();
        match kind {
            spool_core::EventKind::Error | spool_core::EventKind::DeviceUnavailable => {
                tracing::warn!(kind = %kind, "{}", event.description());
            }
            _ => tracing::info!(kind = %kind, "{}", event.description()),
        }
    }

    fn publish_snapshot(&self, state: SystemState) {
        tracing::debug!(
            queued = state.queue_length,
            capacity = state.capacity,
            executing = state.worker.is_executing,
            phase = %state.worker.phase,
            "system state"
        );
    }
}

/// Forwards to several notifiers in order.
#[derive(Default, Clone)]
pub struct FanoutNotifier {
    sinks: Vec<Arc<dyn Notifier>>,
}

impl FanoutNotifier {
    pub fn new() -> Self {
        Self { sinks: Vec::new() }
    }

    /// Add a sink.
    pub fn with(mut self, sink: Arc<dyn Notifier>) -> Self {
        self.sinks.push(sink);
        self
    }
}

impl Notifier for FanoutNotifier {
    fn publish(&self, event: SpoolEvent) {
        for sink in &self.sinks {
            sink.publish(event.clone());
        }
    }

    fn publish_snapshot(&self, state: SystemState) {
        for sink in &self.sinks {
            sink.publish_snapshot(state.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::disallowed_methods)]

    use super::*;
    use chrono::Utc;
    use spool_core::{WorkerPhase, WorkerStatus};

    fn stopped_event() -> SpoolEvent {
        SpoolEvent::WorkerStopped {
            worker: "w".into(),
            reason: None,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn broadcast_reaches_every_subscriber() -> Result<(), Box<dyn std::error::Error>> {
        let notifier = BroadcastNotifier::new(8);
        let mut first = notifier.subscribe();
        let mut second = notifier.subscribe();

        notifier.publish(stopped_event());
        notifier.publish_snapshot(SystemState::new(
            WorkerStatus::new(false, true, None, WorkerPhase::Stopped),
            Vec::new(),
            4,
        ));

        assert!(matches!(first.try_recv()?, Notification::Event(_)));
        assert!(matches!(first.try_recv()?, Notification::SystemState(_)));
        assert!(matches!(second.try_recv()?, Notification::Event(_)));
        Ok(())
    }

    #[test]
    fn publishing_without_subscribers_is_harmless() {
        let notifier = BroadcastNotifier::default();
        notifier.publish(stopped_event());
    }

    #[test]
    fn notification_json_is_tagged() -> Result<(), serde_json::Error> {
        let json = Notification::Event(stopped_event()).to_json()?;
        let value: serde_json::Value = serde_json::from_str(&json)?;
        assert_eq!(value["type"], "event");
        assert_eq!(value["data"]["event"], "worker_stopped");
        Ok(())
    }

    #[test]
    fn fanout_forwards_to_all_sinks() -> Result<(), Box<dyn std::error::Error>> {
        let a = BroadcastNotifier::new(4);
        let b = BroadcastNotifier::new(4);
        let mut rx_a = a.subscribe();
        let mut rx_b = b.subscribe();
        let fanout = FanoutNotifier::new()
            .with(Arc::new(a))
            .with(Arc::new(b))
            .with(Arc::new(TracingNotifier));

        fanout.publish(stopped_event());
        assert!(matches!(rx_a.try_recv()?, Notification::Event(_)));
        assert!(matches!(rx_b.try_recv()?, Notification::Event(_)));
        Ok(())
    }
}
