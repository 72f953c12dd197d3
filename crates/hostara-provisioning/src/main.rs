// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Hostara Provisioning - provisioning worker
//!
//! Consumes provisioning commands from the broker and publishes the
//! simulated results back to the events exchange.

use std::sync::Arc;

use anyhow::Result;
use tracing::{error, info};

use hostara_messaging::{DlqConfig, LogErrors, MessageManager, RedisBroker};
use hostara_protocol::ExchangeConfig;
use hostara_protocol::events::PROVISION_REQUEST;
use hostara_protocol::topology::COMMANDS_EXCHANGE;
use hostara_provisioning::config::Config;
use hostara_provisioning::{
    MessagingNotifier, ProvisionRequestHandler, ProvisioningSimulator, compose,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file (from crate directory or parent directories)
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("hostara_provisioning=info".parse()?)
                .add_directive("hostara_messaging=info".parse()?),
        )
        .init();

    info!("Starting Hostara Provisioning");

    let config = Config::from_env().map_err(|e| {
        error!("Configuration error: {}", e);
        e
    })?;

    info!(
        queue = %config.queue,
        delay_ms = config.delay.as_millis() as u64,
        failure_rate = config.failure_rate,
        handler_timeout_ms = config.messaging.handler_timeout.as_millis() as u64,
        "Configuration loaded"
    );

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

    let notifier = Arc::new(MessagingNotifier::new(manager.clone()));
    let provisioning = compose(ProvisioningSimulator::new(
        config.delay,
        config.failure_rate,
        notifier,
    ));

    manager
        .subscribe(
            &config.queue,
            PROVISION_REQUEST,
            COMMANDS_EXCHANGE,
            LogErrors::new(ProvisionRequestHandler::new(provisioning)),
            Some(DlqConfig::default()),
        )
        .await?;

    info!("Provisioning worker running");

    // Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    info!("Shutting down...");

    if let Err(e) = manager.stop(config.shutdown_timeout).await {
        error!(error = %e, "Consumers did not drain cleanly");
    }

    info!("Shutdown complete");

    Ok(())
}
