//! Internal event broadcast: tokio::broadcast channel for cross-component events.

use serde::Serialize;
use tokio::sync::broadcast;

/// Gateway-wide events for notification, logging, and monitoring.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GatewayEvent {
    /// A persisted alert row was claimed for notification.
    AlertRaised {
        alert_id: i64,
        kind: String,
        severity: String,
        title: String,
        message: String,
    },
    /// An enhanced operation failed and the basic path served the request.
    AnalyticsDegraded { operation: String, reason: String },
    /// A broker or data connection was tested or authorized.
    ConnectionStatusChanged {
        user_id: String,
        provider: String,
        status: String,
        detail: Option<String>,
    },
    /// One strategy sync pass finished.
    StrategiesSynced {
        updated: usize,
        degraded: usize,
        failed: usize,
    },
}

/// Central event bus for broadcasting events to all subscribers.
pub struct EventBus {
    tx: broadcast::Sender<GatewayEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Publish an event to all subscribers.
    pub fn publish(&self, event: GatewayEvent) {
        // No subscribers is fine.
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<GatewayEvent> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}
