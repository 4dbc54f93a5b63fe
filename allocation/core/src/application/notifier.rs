// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Best-effort delivery of notification mail.
//!
//! Mail is sent only after the state change it describes has committed.
//! A slow or failing relay never fails the request: each send is bounded by
//! a timeout, and failures are logged and counted.

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::domain::notification::{Notification, NotificationSender};

#[derive(Clone)]
pub struct Notifier {
    sender: Arc<dyn NotificationSender>,
    timeout: Duration,
}

impl Notifier {
    pub fn new(sender: Arc<dyn NotificationSender>, timeout: Duration) -> Self {
        Self { sender, timeout }
    }

    /// Returns whether the mail was handed to the transport.
    pub async fn notify(&self, notification: Notification) -> bool {
        match tokio::time::timeout(self.timeout, self.sender.send_mail(&notification)).await {
            Ok(Ok(())) => {
                debug!(to = %notification.to, subject = %notification.subject, "Notification sent");
                metrics::counter!("btp_notifications_sent_total").increment(1);
                true
            }
            Ok(Err(e)) => {
                warn!(to = %notification.to, error = %e, "Notification failed");
                metrics::counter!("btp_notifications_failed_total").increment(1);
                false
            }
            Err(_) => {
                warn!(to = %notification.to, timeout = ?self.timeout, "Notification timed out");
                metrics::counter!("btp_notifications_failed_total").increment(1);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::notification::NotificationError;
    use crate::infrastructure::mail::RecordingNotificationSender;
    use async_trait::async_trait;

    struct StalledSender;

    #[async_trait]
    impl NotificationSender for StalledSender {
        async fn send_mail(&self, _: &Notification) -> Result<(), NotificationError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_failure_is_swallowed() {
        let notifier = Notifier::new(Arc::new(RecordingNotificationSender::failing()), Duration::from_secs(1));
        assert!(!notifier.notify(Notification::new("a@example.com", "s", "b")).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_relay_times_out() {
        let notifier = Notifier::new(Arc::new(StalledSender), Duration::from_millis(50));
        assert!(!notifier.notify(Notification::new("a@example.com", "s", "b")).await);
    }

    #[tokio::test]
    async fn test_success() {
        let sender = RecordingNotificationSender::new();
        let notifier = Notifier::new(Arc::new(sender.clone()), Duration::from_secs(1));
        assert!(notifier.notify(Notification::new("a@example.com", "s", "b")).await);
        assert_eq!(sender.sent().len(), 1);
    }
}
