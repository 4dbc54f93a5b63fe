// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Event Bus - Pub/Sub for Allocation Events
//
// In-memory event streaming on a tokio broadcast channel. Services publish
// after a successful commit; subscribers (the audit log started by
// `btp serve` and `btp finalize`, tests) receive every event published
// after they subscribed.
// Events are not persisted and are lost on restart.

use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::domain::events::AllocationEvent;
use crate::domain::ledger::ApplicationId;

#[derive(Clone)]
pub struct EventBus {
    sender: Arc<broadcast::Sender<AllocationEvent>>,
}

impl EventBus {
    /// Capacity is how many events are buffered before slow receivers lag.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender: Arc::new(sender),
        }
    }

    pub fn with_default_capacity() -> Self {
        Self::new(1000)
    }

    pub fn publish(&self, event: AllocationEvent) {
        debug!(kind = event.kind(), "Publishing event");

        let receiver_count = self.sender.send(event).unwrap_or(0);
        if receiver_count == 0 {
            debug!("No subscribers listening to event");
        }
    }

    pub fn subscribe(&self) -> EventReceiver {
        EventReceiver {
            receiver: self.sender.subscribe(),
        }
    }

    /// Receive only events about one application.
    pub fn subscribe_application(&self, application_id: ApplicationId) -> ApplicationEventReceiver {
        ApplicationEventReceiver {
            receiver: self.sender.subscribe(),
            application_id,
        }
    }

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

pub struct EventReceiver {
    receiver: broadcast::Receiver<AllocationEvent>,
}

impl EventReceiver {
    pub async fn recv(&mut self) -> Result<AllocationEvent, EventBusError> {
        self.receiver.recv().await.map_err(map_recv_error)
    }

    pub fn try_recv(&mut self) -> Result<AllocationEvent, EventBusError> {
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

pub struct ApplicationEventReceiver {
    receiver: broadcast::Receiver<AllocationEvent>,
    application_id: ApplicationId,
}

impl ApplicationEventReceiver {
    /// Next event for this application; others are skipped.
    pub async fn recv(&mut self) -> Result<AllocationEvent, EventBusError> {
        loop {
            let event = self.receiver.recv().await.map_err(map_recv_error)?;
            if event.application_id() == Some(self.application_id) {
                return Ok(event);
            }
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EventBusError {
    #[error("Event bus is closed")]
    Closed,

    #[error("No events available")]
    Empty,

    #[error("Receiver lagged by {0} events (events were dropped)")]
    Lagged(u64),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::project::ProjectId;
    use crate::domain::user::UserId;
    use chrono::Utc;

    fn submitted(application_id: ApplicationId) -> AllocationEvent {
        AllocationEvent::ApplicationSubmitted {
            application_id,
            project_id: ProjectId::new(),
            student: UserId::new("S1"),
            submitted_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_publish_subscribe() {
        let bus = EventBus::new(10);
        let mut receiver = bus.subscribe();
        let id = ApplicationId::new();

        bus.publish(submitted(id));

        let received = receiver.recv().await.unwrap();
        assert_eq!(received.application_id(), Some(id));
    }

    #[tokio::test]
    async fn test_application_filtering() {
        let bus = EventBus::new(10);
        let id = ApplicationId::new();
        let mut receiver = bus.subscribe_application(id);

        bus.publish(submitted(ApplicationId::new()));
        bus.publish(submitted(id));

        let received = receiver.recv().await.unwrap();
        assert_eq!(received.application_id(), Some(id));
    }

    #[tokio::test]
    async fn test_try_recv_empty() {
        let bus = EventBus::new(10);
        let mut receiver = bus.subscribe();
        assert!(matches!(receiver.try_recv(), Err(EventBusError::Empty)));
        assert_eq!(bus.subscriber_count(), 1);
    }
}
