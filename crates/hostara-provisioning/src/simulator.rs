// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Simulated provisioning.

use async_trait::async_trait;
use chrono::Utc;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::error::ProvisioningError;
use crate::notifier::ProvisioningNotifier;

/// Reason reported when the simulated allocation fails.
pub const FAILURE_REASON: &str = "IP generation failed";

#[async_trait]
pub trait Provisioning: Send + Sync {
    /// Provision an address for `server_id` and emit exactly one result event.
    ///
    /// Returns early with [`ProvisioningError::Cancelled`] if `cancel` fires
    /// before provisioning completes; in that case nothing is emitted.
    async fn generate_ip(
        &self,
        server_id: Uuid,
        cancel: &CancellationToken,
    ) -> Result<(), ProvisioningError>;
}

enum Outcome {
    Address(String),
    Failure,
}

/// Waits `delay`, then reports failure with probability `failure_rate` or a
/// synthesized `10.0.0.N` address otherwise.
pub struct ProvisioningSimulator {
    delay: Duration,
    failure_rate: f64,
    rng: Mutex<StdRng>,
    notifier: Arc<dyn ProvisioningNotifier>,
}

impl ProvisioningSimulator {
    pub fn new(
        delay: Duration,
        failure_rate: f64,
        notifier: Arc<dyn ProvisioningNotifier>,
    ) -> Self {
        Self::with_rng(delay, failure_rate, notifier, StdRng::from_entropy())
    }

    /// Deterministic simulator for tests.
    pub fn seeded(
        delay: Duration,
        failure_rate: f64,
        notifier: Arc<dyn ProvisioningNotifier>,
        seed: u64,
    ) -> Self {
        Self::with_rng(delay, failure_rate, notifier, StdRng::seed_from_u64(seed))
    }

    fn with_rng(
        delay: Duration,
        failure_rate: f64,
        notifier: Arc<dyn ProvisioningNotifier>,
        rng: StdRng,
    ) -> Self {
        Self {
            delay,
            failure_rate: failure_rate.clamp(0.0, 1.0),
            rng: Mutex::new(rng),
            notifier,
        }
    }

    fn roll(&self) -> Outcome {
        let mut rng = self.rng.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if rng.r#gen::<f64>() < self.failure_rate {
            Outcome::Failure
        } else {
            Outcome::Address(format!("10.0.0.{}", rng.gen_range(1..=254u8)))
        }
    }
}

#[async_trait]
impl Provisioning for ProvisioningSimulator {
    async fn generate_ip(
        &self,
        server_id: Uuid,
        cancel: &CancellationToken,
    ) -> Result<(), ProvisioningError> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ProvisioningError::Cancelled(server_id)),
            _ = tokio::time::sleep(self.delay) => {}
        }

        let now = Utc::now();
        let emitted = match self.roll() {
            Outcome::Failure => {
                self.notifier
                    .notify_failure(server_id, FAILURE_REASON, now)
                    .await
            }
            Outcome::Address(ip) => self.notifier.notify_success(server_id, &ip, now).await,
        };

        emitted.map_err(|e| ProvisioningError::Notify {
            server_id,
            reason: e.to_string(),
        })
    }
}

/// Tracing decorator for any [`Provisioning`].
pub struct TracedProvisioning<P> {
    inner: P,
}

impl<P> TracedProvisioning<P> {
    pub fn new(inner: P) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl<P: Provisioning> Provisioning for TracedProvisioning<P> {
    #[instrument(name = "provisioning.generate_ip", skip(self, cancel))]
    async fn generate_ip(
        &self,
        server_id: Uuid,
        cancel: &CancellationToken,
    ) -> Result<(), ProvisioningError> {
        let result = self.inner.generate_ip(server_id, cancel).await;
        match &result {
            Ok(()) => info!("Provisioning result emitted"),
            Err(e) => warn!(code = e.error_code(), error = %e, "Provisioning did not complete"),
        }
        result
    }
}

/// Wrap order: simulator then tracing.
pub fn compose(simulator: ProvisioningSimulator) -> Arc<dyn Provisioning> {
    Arc::new(TracedProvisioning::new(simulator))
}
