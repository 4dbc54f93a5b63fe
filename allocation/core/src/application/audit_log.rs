// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Event Audit Log
//!
//! Background subscriber that writes every [`AllocationEvent`] to the
//! `btp::audit` tracing target as one structured record, so ledger changes
//! can be reconstructed from the logs. It never fails the server: lag and
//! serialization problems are logged and skipped.

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::domain::events::AllocationEvent;
use crate::infrastructure::event_bus::{EventBus, EventBusError};

pub struct EventAuditLog {
    event_bus: EventBus,
}

impl EventAuditLog {
    pub fn new(event_bus: EventBus) -> Self {
        Self { event_bus }
    }

    /// Subscribe now and spawn the consumer. The task ends when `stop` flips
    /// or the bus closes, and yields how many events it recorded.
    ///
    /// Events already buffered when `stop` flips are still recorded.
    pub fn start(self, mut stop: watch::Receiver<bool>) -> JoinHandle<u64> {
        let mut receiver = self.event_bus.subscribe();
        info!("Starting event audit log");

        tokio::spawn(async move {
            let mut recorded = 0u64;
            loop {
                tokio::select! {
                    biased;
                    received = receiver.recv() => match received {
                        Ok(event) => {
                            record(&event);
                            recorded += 1;
                        }
                        Err(EventBusError::Lagged(n)) => {
                            warn!(missed = n, "Audit log lagged; some events were not recorded");
                            metrics::counter!("btp_audit_events_missed_total").increment(n);
                        }
                        Err(EventBusError::Closed) => break,
                        Err(EventBusError::Empty) => {}
                    },
                    _ = stop.changed() => break,
                }
            }
            info!(recorded, "Event audit log stopped");
            recorded
        })
    }
}

fn record(event: &AllocationEvent) {
    metrics::counter!("btp_audit_events_total", "kind" => event.kind()).increment(1);
    match serde_json::to_string(event) {
        Ok(payload) => info!(
            target: "btp::audit",
            kind = event.kind(),
            application_id = ?event.application_id(),
            project_id = ?event.project_id(),
            payload = %payload,
            "Allocation event"
        ),
        Err(e) => debug!(kind = event.kind(), error = %e, "Could not serialize event for audit"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ledger::ApplicationId;
    use crate::domain::project::ProjectId;
    use crate::domain::user::UserId;
    use chrono::Utc;

    #[tokio::test]
    async fn test_records_until_stopped() {
        let bus = EventBus::new(16);
        let (stop_tx, stop_rx) = watch::channel(false);
        let handle = EventAuditLog::new(bus.clone()).start(stop_rx);
        assert_eq!(bus.subscriber_count(), 1);

        for _ in 0..2 {
            bus.publish(AllocationEvent::ApplicationSubmitted {
                application_id: ApplicationId::new(),
                project_id: ProjectId::new(),
                student: UserId::new("S1"),
                submitted_at: Utc::now(),
            });
        }
        stop_tx.send(true).unwrap();

        assert_eq!(handle.await.unwrap(), 2);
        assert_eq!(bus.subscriber_count(), 0);
    }
}
