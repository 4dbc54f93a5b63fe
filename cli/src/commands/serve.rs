// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! HTTP server
//!
//! Runs the API until Ctrl+C or SIGTERM. Every allocation event is written
//! to the audit log. When `spec.workflow.sweep_interval` is set a background
//! task runs the finalize sweep on that period.

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Args;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info, warn};

use btp_allocation_core::application::{EventAuditLog, Services};
use btp_allocation_core::context::RequestContext;
use btp_allocation_core::presentation::api;

use crate::runtime::build_services;

#[derive(Args, Debug, Default)]
pub struct ServeArgs {
    /// HTTP API host (overrides spec.server.bind_address)
    #[arg(long, env = "BTP_HOST")]
    pub host: Option<String>,

    /// HTTP API port (overrides spec.server.port)
    #[arg(long, env = "BTP_PORT")]
    pub port: Option<u16>,
}

pub async fn execute(args: ServeArgs, config_path: Option<PathBuf>) -> Result<()> {
    let config = crate::load_config(config_path).context("Failed to load configuration")?;
    info!(name = %config.metadata.name, "Configuration loaded");

    if let Some(port) = config.spec.observability.metrics_port {
        let addr = SocketAddr::from(([0, 0, 0, 0], port));
        metrics_exporter_prometheus::PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()
            .context("Failed to install Prometheus exporter")?;
        info!("Metrics exporter listening on {}", addr);
    }

    let services = build_services(&config).await?;

    let host = args.host.unwrap_or_else(|| config.spec.server.bind_address.clone());
    let port = args.port.unwrap_or(config.spec.server.port);
    let bind_addr = format!("{}:{}", host, port);
    let listener = TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", bind_addr))?;
    info!("BTP allocation API listening on {}", bind_addr);

    let (stop_tx, stop_rx) = watch::channel(false);
    let audit = EventAuditLog::new(services.event_bus.clone()).start(stop_rx.clone());
    let sweeper = config
        .spec
        .workflow
        .sweep_interval
        .map(|period| tokio::spawn(run_sweeper(services.clone(), period, stop_rx)));

    let app = api::router(services);
    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error");

    let _ = stop_tx.send(true);
    if let Some(handle) = sweeper {
        if let Err(e) = handle.await {
            warn!("Sweep task ended abnormally: {}", e);
        }
    }
    if let Err(e) = audit.await {
        warn!("Audit log task ended abnormally: {}", e);
    }

    info!("BTP allocation API stopped");
    served
}

async fn run_sweeper(services: Services, period: Duration, mut stop: watch::Receiver<bool>) {
    info!(period = ?period, "Finalize sweep scheduled");
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // The first tick fires immediately.
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = stop.changed() => break,
        }
        match services
            .workflow
            .finalize_confirmations(&RequestContext::system(), Utc::now())
            .await
        {
            Ok(summary) if summary.confirmed.is_empty() && summary.conflicts.is_empty() => {}
            Ok(summary) => info!(
                confirmed = summary.confirmed.len(),
                conflicts = summary.conflicts.len(),
                "Scheduled finalize sweep"
            ),
            Err(e) => error!("Scheduled finalize sweep failed: {}", e),
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            info!("Received SIGTERM signal");
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use btp_allocation_core::application::Repositories;
    use btp_allocation_core::config::AllocationConfigSpec;
    use btp_allocation_core::infrastructure::event_bus::EventBus;
    use btp_allocation_core::infrastructure::files::InMemoryFileStore;
    use btp_allocation_core::infrastructure::mail::RecordingNotificationSender;
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_stops_on_signal() {
        let services = Services::new(
            &Repositories::in_memory(),
            Arc::new(InMemoryFileStore::new()),
            Arc::new(RecordingNotificationSender::new()),
            EventBus::new(16),
            &AllocationConfigSpec::default(),
        );
        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(run_sweeper(services, Duration::from_secs(60), rx));

        tokio::time::sleep(Duration::from_secs(150)).await;
        tx.send(true).unwrap();
        handle.await.unwrap();
    }
}
