//! Event emission system.
//!
//! Pipeline and claim outcomes are broadcast on an in-process bus. The audit
//! task writes every event to the log; further subscribers (webhooks, push
//! delivery) attach to the same bus.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tally_revenue::notify::{NotificationSink, PayoutNotification};
use tally_types::ClaimKind;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

/// Event categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum EventKind {
    PayoutAvailable,
    ReferralBonusAvailable,
    PayoutClaimed,
    OrchestrationCompleted,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::PayoutAvailable => "PayoutAvailable",
            EventKind::ReferralBonusAvailable => "ReferralBonusAvailable",
            EventKind::PayoutClaimed => "PayoutClaimed",
            EventKind::OrchestrationCompleted => "OrchestrationCompleted",
        }
    }
}

/// An event emitted by the daemon.
#[derive(Debug, Clone, Serialize)]
pub struct Event {
    pub kind: EventKind,
    /// Unix timestamp.
    pub timestamp: i64,
    /// Type-specific payload.
    pub payload: serde_json::Value,
}

impl Event {
    pub fn new(kind: EventKind, payload: serde_json::Value) -> Self {
        Self {
            kind,
            timestamp: tally_db::now_secs(),
            payload,
        }
    }
}

/// Event bus for broadcasting events to subscribers.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<Event>,
    sequence: Arc<AtomicU64>,
}

impl EventBus {
    /// Create a new event bus with the given buffer capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            sequence: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Emit an event to all subscribers.
    pub fn emit(&self, event: Event) {
        self.sequence.fetch_add(1, Ordering::SeqCst);
        // No subscribers is not an error
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.sender.subscribe()
    }

    /// Number of events emitted so far.
    pub fn sequence(&self) -> u64 {
        self.sequence.load(Ordering::SeqCst)
    }
}

/// Notification sink that publishes to the bus.
pub struct BusSink {
    bus: EventBus,
}

impl BusSink {
    pub fn new(bus: EventBus) -> Self {
        Self { bus }
    }
}

impl NotificationSink for BusSink {
    fn deliver(&self, n: &PayoutNotification) {
        let kind = match n.kind {
            ClaimKind::PayoutAvailable => EventKind::PayoutAvailable,
            ClaimKind::ReferralBonus => EventKind::ReferralBonusAvailable,
        };
        self.bus.emit(Event::new(
            kind,
            serde_json::json!({
                "userId": n.user_id,
                "periodStart": n.window.start(),
                "periodEnd": n.window.end(),
                "amountSol": n.amount_sol,
                "title": n.title,
            }),
        ));
    }
}

/// Spawn the audit task that logs every event until the bus closes.
pub fn spawn_audit_log(bus: &EventBus) -> JoinHandle<()> {
    let mut rx = bus.subscribe();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => tracing::info!(
                    event = event.kind.as_str(),
                    timestamp = event.timestamp,
                    payload = %event.payload,
                    "event"
                ),
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    tracing::warn!(missed, "audit log lagged behind event bus");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}
