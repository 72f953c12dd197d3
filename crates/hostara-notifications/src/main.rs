// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Hostara Notifications - WebSocket fan-out service
//!
//! Consumes server status changes from the broker and pushes them to the
//! owners' open WebSocket connections.

use std::future::IntoFuture;
use std::sync::Arc;

use anyhow::Result;
use tokio::sync::Notify;
use tracing::{error, info, warn};

use hostara_messaging::{DlqConfig, LogErrors, MessageManager, RedisBroker};
use hostara_notifications::config::Config;
use hostara_notifications::http::{self, WsState};
use hostara_notifications::{Hub, NotificationSender, Notifier, ServerUpdatedHandler, WsSender};
use hostara_protocol::ExchangeConfig;
use hostara_protocol::events::SERVER_UPDATED;
use hostara_protocol::topology::EVENTS_EXCHANGE;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file (from crate directory or parent directories)
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("hostara_notifications=info".parse()?)
                .add_directive("hostara_messaging=info".parse()?),
        )
        .init();

    info!("Starting Hostara Notifications");

    let config = Config::from_env().map_err(|e| {
        error!("Configuration error: {}", e);
        e
    })?;

    info!(
        addr = %config.addr,
        queue = %config.queue,
        ping_interval_secs = config.connection.ping_interval.as_secs(),
        pong_wait_secs = config.connection.pong_wait.as_secs(),
        client_buffer = config.hub.client_buffer,
        "Configuration loaded"
    );

    let hub = Hub::start(&config.hub);
    let senders: Vec<Arc<dyn NotificationSender>> = vec![Arc::new(WsSender::new(hub.clone()))];
    let notifier = Arc::new(Notifier::new(senders));

    info!("Connecting to broker...");
    let broker = RedisBroker::connect(
        &config.messaging.broker_url,
        config.messaging.consumer_name.clone(),
    )
    .await?
    .with_claim_idle(config.messaging.claim_idle);
    let manager =
        MessageManager::new(Arc::new(broker), &ExchangeConfig::defaults(), &config.messaging)
            .await?;

    manager
        .subscribe(
            &config.queue,
            SERVER_UPDATED,
            EVENTS_EXCHANGE,
            LogErrors::new(ServerUpdatedHandler::new(notifier)),
            Some(DlqConfig::default()),
        )
        .await?;

    let app = http::router(WsState {
        hub: hub.clone(),
        connection: config.connection.clone(),
    });
    let listener = tokio::net::TcpListener::bind(config.addr).await?;
    info!(addr = %config.addr, "WebSocket endpoint listening");

    let shutdown = Arc::new(Notify::new());
    let signal = shutdown.clone();
    let server = tokio::spawn(
        axum::serve(listener, app)
            .with_graceful_shutdown(async move { signal.notified().await })
            .into_future(),
    );

    // Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    info!("Shutting down...");

    if let Err(e) = manager.stop(config.shutdown_timeout).await {
        error!(error = %e, "Consumers did not drain cleanly");
    }

    shutdown.notify_one();
    if let Err(e) = hub.stop(config.shutdown_timeout).await {
        error!(error = %e, "Connections did not close cleanly");
    }

    match tokio::time::timeout(config.shutdown_timeout, server).await {
        Ok(Ok(Ok(()))) => {}
        Ok(Ok(Err(e))) => error!(error = %e, "HTTP server error"),
        Ok(Err(e)) => error!(error = %e, "HTTP server task panicked"),
        Err(_) => warn!("Connections did not finish before the shutdown timeout"),
    }

    info!("Shutdown complete");

    Ok(())
}
