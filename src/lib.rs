// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Transfer Ledger - wallet-to-wallet transfers with asynchronous
//! notification fan-out.
//!
//! A transfer debits one wallet and credits another inside a single embedded
//! ACID transaction, records the movement, and publishes a
//! `transfer.completed` event. Supervised background consumers turn those
//! events into in-app notifications and signed webhooks, at least once and
//! without duplicates.
//!
//! ## Modules
//!
//! - `api` - HTTP API handlers (Axum)
//! - `auth` - Bearer token authentication (HS256 JWT)
//! - `ledger` - Wallets, transfers, history
//! - `queue` - Durable event queue with leases and dead letters
//! - `notify` - Notification consumer, webhook delivery, outbox reconciler
//! - `storage` - redb database and store implementations

pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod ledger;
pub mod logging;
pub mod models;
pub mod notify;
pub mod queue;
pub mod state;
pub mod storage;
