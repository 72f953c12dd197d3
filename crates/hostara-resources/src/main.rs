// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Hostara Resources - resource pool allocator service
//!
//! Serves the consume/return boundary used by hostara-core and the pool
//! admin endpoints over HTTP.

use std::future::IntoFuture;
use std::sync::Arc;

use anyhow::Result;
use sqlx::postgres::PgPoolOptions;
use tokio::sync::Notify;
use tracing::{error, info, warn};

use hostara_resources::config::Config;
use hostara_resources::{PostgresPoolStore, compose, http, migrations};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file (from crate directory or parent directories)
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("hostara_resources=info".parse()?),
        )
        .init();

    info!("Starting Hostara Resources");

    let config = Config::from_env().map_err(|e| {
        error!("Configuration error: {}", e);
        e
    })?;

    info!(addr = %config.addr, "Configuration loaded");

    info!("Connecting to database...");
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.database_url)
        .await?;

    info!("Running database migrations...");
    migrations::run_postgres(&pool).await?;
    info!("Migrations completed");

    let service = compose(Arc::new(PostgresPoolStore::new(pool.clone())));
    let app = http::router(service);

    let listener = tokio::net::TcpListener::bind(config.addr).await?;
    info!(addr = %config.addr, "Resources API listening");

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

    pool.close().await;
    info!("Shutdown complete");

    Ok(())
}
