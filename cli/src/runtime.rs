// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Service graph construction shared by every command that touches storage.

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::info;

use btp_allocation_core::application::{Repositories, Services};
use btp_allocation_core::config::{AllocationConfigManifest, MailTransport};
use btp_allocation_core::files::FileStore;
use btp_allocation_core::infrastructure::db::Database;
use btp_allocation_core::infrastructure::event_bus::EventBus;
use btp_allocation_core::infrastructure::files::{InMemoryFileStore, LocalFileStore};
use btp_allocation_core::infrastructure::mail::{LogNotificationSender, WebhookNotificationSender};
use btp_allocation_core::notification::NotificationSender;
use btp_allocation_core::repository::StorageBackend;

/// Validate the manifest, open storage and build the services.
pub async fn build_services(config: &AllocationConfigManifest) -> Result<Services> {
    config.validate().context("Configuration validation failed")?;
    let spec = &config.spec;

    let backend = config.storage_backend();
    let pool = match &backend {
        StorageBackend::PostgreSQL(pg) => {
            let database = Database::new(pg).await?;
            database.migrate().await?;
            info!(max_connections = pg.max_connections, "Using PostgreSQL storage");
            Some(database.get_pool().clone())
        }
        StorageBackend::InMemory => {
            info!("Using in-memory storage; data is lost on exit");
            None
        }
    };
    let repositories = Repositories::for_backend(&backend, pool);

    let files: Arc<dyn FileStore> = match &spec.files.root {
        Some(root) => {
            info!(root = %root.display(), "Storing uploads on disk");
            Arc::new(LocalFileStore::new(root.clone()).await?)
        }
        None => Arc::new(InMemoryFileStore::new()),
    };

    let mail: Arc<dyn NotificationSender> = match (spec.mail.transport, &spec.mail.endpoint) {
        (MailTransport::Webhook, Some(endpoint)) => {
            info!(endpoint = %endpoint, "Delivering mail through webhook relay");
            Arc::new(WebhookNotificationSender::new(endpoint.clone(), spec.mail.from.clone()))
        }
        _ => Arc::new(LogNotificationSender),
    };

    Ok(Services::new(
        &repositories,
        files,
        mail,
        EventBus::with_default_capacity(),
        spec,
    ))
}
