// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Event Bus Implementation - Pub/Sub for Monitor Events
//
// Provides in-memory event streaming using tokio broadcast channels.
// Both engines publish here; the escalation component subscribes to the
// unified issue stream via `subscribe_issues()`.
//
// In-memory only (events lost on restart)

use crate::domain::events::{BaselineEvent, IssueDetected, ReconciliationEvent};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, warn};

/// Unified monitor event type for the event bus
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MonitorEvent {
    Reconciliation(ReconciliationEvent),
    Baseline(BaselineEvent),
    Issue(IssueDetected),
}

/// Event bus for publishing and subscribing to monitor events
#[derive(Clone)]
pub struct EventBus {
    sender: Arc<broadcast::Sender<MonitorEvent>>,
}

impl EventBus {
    /// Create a new event bus with specified channel capacity
    /// Capacity determines how many events can be buffered before slow
    /// receivers start lagging
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Create event bus with default capacity (1000)
    pub fn with_default_capacity() -> Self {
        Self::new(1000)
    }

    pub fn publish_reconciliation_event(&self, event: ReconciliationEvent) {
        self.publish(MonitorEvent::Reconciliation(event));
    }

    pub fn publish_baseline_event(&self, event: BaselineEvent) {
        self.publish(MonitorEvent::Baseline(event));
    }

    pub fn publish_issue(&self, issue: IssueDetected) {
        metrics::counter!("aegis_monitor_issues_total", "type" => issue.issue_type.as_str())
            .increment(1);
        self.publish(MonitorEvent::Issue(issue));
    }

    fn publish(&self, event: MonitorEvent) {
        // send() only fails when nobody is subscribed
        if self.sender.send(event).is_err() {
            debug!("No subscribers listening to monitor event");
        }
    }

    /// Subscribe to all monitor events
    pub fn subscribe(&self) -> EventReceiver {
        EventReceiver {
            receiver: self.sender.subscribe(),
        }
    }

    /// Subscribe to issues raised by either engine
    pub fn subscribe_issues(&self) -> IssueReceiver {
        IssueReceiver {
            receiver: self.sender.subscribe(),
        }
    }

    /// Get the number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::with_default_capacity()
    }
}

fn map_recv_error(e: broadcast::error::RecvError) -> EventBusError {
    match e {
        broadcast::error::RecvError::Closed => EventBusError::Closed,
        broadcast::error::RecvError::Lagged(n) => {
            warn!("Event receiver lagged by {} events", n);
            EventBusError::Lagged(n)
        }
    }
}

/// Receiver for all monitor events
pub struct EventReceiver {
    receiver: broadcast::Receiver<MonitorEvent>,
}

impl EventReceiver {
    /// Receive the next event (waits until one is available)
    pub async fn recv(&mut self) -> Result<MonitorEvent, EventBusError> {
        self.receiver.recv().await.map_err(map_recv_error)
    }

    /// Try to receive an event without blocking
    pub fn try_recv(&mut self) -> Result<MonitorEvent, EventBusError> {
        self.receiver.try_recv().map_err(|e| match e {
            broadcast::error::TryRecvError::Empty => EventBusError::Empty,
            broadcast::error::TryRecvError::Closed => EventBusError::Closed,
            broadcast::error::TryRecvError::Lagged(n) => {
                warn!("Event receiver lagged by {} events", n);
                EventBusError::Lagged(n)
            }
        })
    }
}

/// Receiver filtered down to `MonitorEvent::Issue`
pub struct IssueReceiver {
    receiver: broadcast::Receiver<MonitorEvent>,
}

impl IssueReceiver {
    /// Receive the next issue, skipping every other event kind
    pub async fn recv(&mut self) -> Result<IssueDetected, EventBusError> {
        loop {
            let event = self.receiver.recv().await.map_err(map_recv_error)?;
            if let MonitorEvent::Issue(issue) = event {
                return Ok(issue);
            }
        }
    }
}

/// Errors that can occur when receiving events
#[derive(Debug, thiserror::Error)]
pub enum EventBusError {
    #[error("Event bus is closed")]
    Closed,

    #[error("No events available")]
    Empty,

    #[error("Receiver lagged by {0} events (events were dropped)")]
    Lagged(u64),
}
