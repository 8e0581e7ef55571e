// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Ledger Storage
//!
//! Persistent storage using the **redb** embedded database. One database file
//! holds wallets, the transfer log, notifications and the event queue.
//!
//! ## Storage Layout
//!
//! ```text
//! $DATA_DIR/
//!   ledger.redb     # all tables, see `database` for the layout
//! ```
//!
//! ## Important Notes
//!
//! - Write transactions are serialized by redb; readers see committed
//!   snapshots only, so no dirty reads are possible.
//! - Callers on the async runtime should move multi-step writes onto the
//!   blocking pool.

pub mod database;
pub mod error;
pub mod redb_store;

pub use database::{in_memory_database, open_database};
pub use error::{StoreError, StoreResult};
pub use redb_store::RedbStore;
