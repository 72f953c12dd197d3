// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Hostara Resources - resource pool allocator
//!
//! Tracks the available CPU, RAM, disk and IP capacity of named pools and
//! hands it out with atomic consume/return operations. Every mutation is a
//! single conditional store operation, so concurrent consumers can never
//! both succeed against capacity that only covers one of them.
//!
//! The allocator is exposed to other services over HTTP/JSON (see [`http`]).

pub mod config;
pub mod error;
pub mod http;
pub mod migrations;
pub mod pool;
pub mod service;
pub mod store;

pub use error::PoolError;
pub use pool::Pool;
pub use service::{PoolManager, PoolService, TracedPools, compose};
pub use store::{InMemoryPoolStore, PoolStore, PostgresPoolStore};
