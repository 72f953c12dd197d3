// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Hostara Core - server lifecycle service
//!
//! Serves the public API, runs the provisioning saga and consumes
//! provisioning results from the broker.

use std::future::IntoFuture;
use std::sync::Arc;

use anyhow::Result;
use sqlx::postgres::PgPoolOptions;
use tokio::sync::Notify;
use tracing::{error, info, warn};

use hostara_core::config::Config;
use hostara_core::http::{self, ApiState};
use hostara_core::{
    HttpResourcesManager, MessagingNotifier, MessagingProvisioner, PlanManager,
    PostgresPlanStore, PostgresServerStore, ProvisionResultHandler, ServerManager, compose,
    migrations,
};
use hostara_messaging::{DlqConfig, LogErrors, MessageManager, RedisBroker};
use hostara_protocol::ExchangeConfig;
use hostara_protocol::events::PROVISION_RESULTS;
use hostara_protocol::topology::EVENTS_EXCHANGE;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file (from crate directory or parent directories)
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("hostara_core=info".parse()?)
                .add_directive("hostara_messaging=info".parse()?),
        )
        .init();

    info!("Starting Hostara Core");

    let config = Config::from_env().map_err(|e| {
        error!("Configuration error: {}", e);
        e
    })?;

    info!(
        addr = %config.addr,
        resources_url = %config.resources_url,
        queue = %config.queue,
        "Configuration loaded"
    );

    info!("Connecting to database...");
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.database_url)
        .await?;

    info!("Running database migrations...");
    migrations::run_postgres(&pool).await?;
    info!("Migrations completed");

    info!("Connecting to broker...");
    let broker = RedisBroker::connect(
        &config.messaging.broker_url,
        config.messaging.consumer_name.clone(),
    )
    .await?
    .with_claim_idle(config.messaging.claim_idle);
    let manager = Arc::new(
        MessageManager::new(Arc::new(broker), &ExchangeConfig::defaults(), &config.messaging)
            .await?,
    );

    let plans = PlanManager::new(Arc::new(PostgresPlanStore::new(pool.clone())));
    let servers = compose(ServerManager::new(
        Arc::new(PostgresServerStore::new(pool.clone())),
        plans.clone(),
        Arc::new(HttpResourcesManager::new(
            &config.resources_url,
            config.resources_timeout,
        )?),
        Arc::new(MessagingProvisioner::new(manager.clone())),
        Arc::new(MessagingNotifier::new(manager.clone())),
    ));

    manager
        .subscribe(
            &config.queue,
            PROVISION_RESULTS,
            EVENTS_EXCHANGE,
            LogErrors::new(ProvisionResultHandler::new(servers.clone())),
            Some(DlqConfig::default()),
        )
        .await?;

    let app = http::router(ApiState { servers, plans });
    let listener = tokio::net::TcpListener::bind(config.addr).await?;
    info!(addr = %config.addr, "API listening");

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
    shutdown.notify_one();

    match tokio::time::timeout(config.shutdown_timeout, server).await {
        Ok(Ok(Ok(()))) => {}
        Ok(Ok(Err(e))) => error!(error = %e, "HTTP server error"),
        Ok(Err(e)) => error!(error = %e, "HTTP server task panicked"),
        Err(_) => warn!("In-flight requests did not finish before the shutdown timeout"),
    }

    if let Err(e) = manager.stop(config.shutdown_timeout).await {
        error!(error = %e, "Consumers did not drain cleanly");
    }

    pool.close().await;
    info!("Shutdown complete");

    Ok(())
}
