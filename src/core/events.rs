// src/core/events.rs

//! Observability event bus: reconcilers and the poller publish events about
//! records (new BMC log entries, power operations), a background task drains
//! them into the log, and tests subscribe to assert fan-out.

use tokio::sync::broadcast;
use tracing::{info, warn};

/// Capacity of the event channel. Events are advisory; a lagged subscriber
/// loses the oldest entries rather than blocking publishers.
const EVENT_BUS_CAPACITY: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Normal,
    Warning,
}

/// One observability event about a named record.
#[derive(Debug, Clone)]
pub struct AgentEvent {
    pub kind: EventKind,
    pub object_kind: &'static str,
    pub object_name: String,
    pub reason: String,
    pub message: String,
}

/// Broadcast hub for [`AgentEvent`]s.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<AgentEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_BUS_CAPACITY);
        EventBus { tx }
    }

    pub fn publish(&self, event: AgentEvent) {
        // No subscriber is fine; the logger task normally holds one.
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AgentEvent> {
        self.tx.subscribe()
    }
}

/// Background task that logs every published event.
pub struct EventLogger {
    rx: broadcast::Receiver<AgentEvent>,
}

impl EventLogger {
    pub fn new(bus: &EventBus) -> Self {
        EventLogger {
            rx: bus.subscribe(),
        }
    }

    pub async fn run(mut self, mut shutdown_rx: broadcast::Receiver<()>) {
        loop {
            tokio::select! {
                event = self.rx.recv() => match event {
                    Ok(ev) => match ev.kind {
                        EventKind::Normal => info!(
                            "event {} {}: {}: {}",
                            ev.object_kind, ev.object_name, ev.reason, ev.message
                        ),
                        EventKind::Warning => warn!(
                            "event {} {}: {}: {}",
                            ev.object_kind, ev.object_name, ev.reason, ev.message
                        ),
                    },
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        warn!("event logger lagged, {} events dropped", missed);
                    }
                    Err(broadcast::error::RecvError::Closed) => return,
                },
                _ = shutdown_rx.recv() => {
                    info!("Event logger shutting down.");
                    return;
                }
            }
        }
    }
}
