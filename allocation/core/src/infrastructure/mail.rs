// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Outbound Mail Adapters
//!
//! | Sender | Transport |
//! |--------|-----------|
//! | [`LogNotificationSender`] | `tracing` only, for development |
//! | [`WebhookNotificationSender`] | JSON POST to a mail relay |
//! | [`RecordingNotificationSender`] | Keeps mails in memory for tests |

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;

use crate::domain::notification::{Notification, NotificationError, NotificationSender};

#[derive(Debug, Clone, Default)]
pub struct LogNotificationSender;

#[async_trait]
impl NotificationSender for LogNotificationSender {
    async fn send_mail(&self, notification: &Notification) -> Result<(), NotificationError> {
        tracing::info!(
            to = %notification.to,
            subject = %notification.subject,
            "Mail (log transport): {}",
            notification.body
        );
        Ok(())
    }
}

pub struct WebhookNotificationSender {
    client: reqwest::Client,
    endpoint: String,
    from: String,
}

#[derive(Serialize)]
struct RelayMessage<'a> {
    from: &'a str,
    to: &'a str,
    subject: &'a str,
    body: &'a str,
}

impl WebhookNotificationSender {
    pub fn new(endpoint: String, from: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint,
            from,
        }
    }
}

#[async_trait]
impl NotificationSender for WebhookNotificationSender {
    async fn send_mail(&self, notification: &Notification) -> Result<(), NotificationError> {
        let message = RelayMessage {
            from: &self.from,
            to: &notification.to,
            subject: &notification.subject,
            body: &notification.body,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .json(&message)
            .send()
            .await
            .map_err(|e| NotificationError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(NotificationError::Rejected(format!("HTTP {}: {}", status, error_text)));
        }

        Ok(())
    }
}

/// Captures every mail. Can be told to fail to exercise best-effort delivery.
#[derive(Clone, Default)]
pub struct RecordingNotificationSender {
    sent: Arc<Mutex<Vec<Notification>>>,
    failing: Arc<Mutex<bool>>,
}

impl RecordingNotificationSender {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        let sender = Self::default();
        *sender.failing.lock() = true;
        sender
    }

    pub fn sent(&self) -> Vec<Notification> {
        self.sent.lock().clone()
    }

    pub fn sent_to(&self, address: &str) -> Vec<Notification> {
        self.sent.lock().iter().filter(|n| n.to == address).cloned().collect()
    }
}

#[async_trait]
impl NotificationSender for RecordingNotificationSender {
    async fn send_mail(&self, notification: &Notification) -> Result<(), NotificationError> {
        if *self.failing.lock() {
            return Err(NotificationError::Transport("relay unavailable".to_string()));
        }
        self.sent.lock().push(notification.clone());
        Ok(())
    }
}
