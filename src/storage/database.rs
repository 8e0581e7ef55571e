// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Embedded ledger database backed by redb (pure Rust, ACID).
//!
//! ## Table Layout
//!
//! - `wallets`: user_id → serialized Wallet
//! - `transfers`: transfer_id → serialized TransferRecord
//! - `user_transfer_index`: composite key (user|!timestamp|transfer_id) → direction
//! - `transfer_outbox`: transfer_id → commit timestamp (event not yet published)
//! - `notifications`: notification_id → serialized Notification
//! - `notification_dedup`: "transfer_id|recipient" → notification_id
//! - `user_notification_index`: composite key (user|!timestamp|notification_id) → notification_id
//! - `queue_events`: event_id → serialized queue entry
//! - `queue_visibility`: (visible_at_be|event_id) → event_id
//! - `queue_dead_letters`: event_id → serialized dead letter

use std::path::Path;
use std::sync::Arc;

use redb::backends::InMemoryBackend;
use redb::{Database, TableDefinition};
use uuid::Uuid;

use super::StoreResult;

// =============================================================================
// Table Definitions
// =============================================================================

pub(crate) const WALLETS: TableDefinition<&str, &[u8]> = TableDefinition::new("wallets");

pub(crate) const TRANSFERS: TableDefinition<&str, &[u8]> = TableDefinition::new("transfers");

/// Key format: see [`index_key`]. Value is "in" or "out".
pub(crate) const USER_TRANSFER_INDEX: TableDefinition<&[u8], &str> =
    TableDefinition::new("user_transfer_index");

/// Committed transfers whose completion event has not been published yet.
pub(crate) const TRANSFER_OUTBOX: TableDefinition<&str, i64> =
    TableDefinition::new("transfer_outbox");

pub(crate) const NOTIFICATIONS: TableDefinition<&str, &[u8]> =
    TableDefinition::new("notifications");

pub(crate) const NOTIFICATION_DEDUP: TableDefinition<&str, &str> =
    TableDefinition::new("notification_dedup");

pub(crate) const USER_NOTIFICATION_INDEX: TableDefinition<&[u8], &str> =
    TableDefinition::new("user_notification_index");

pub(crate) const QUEUE_EVENTS: TableDefinition<&str, &[u8]> = TableDefinition::new("queue_events");

/// Key: visible_at (ms, big-endian) followed by the 16 event id bytes.
pub(crate) const QUEUE_VISIBILITY: TableDefinition<&[u8], &str> =
    TableDefinition::new("queue_visibility");

pub(crate) const QUEUE_DEAD_LETTERS: TableDefinition<&str, &[u8]> =
    TableDefinition::new("queue_dead_letters");

// =============================================================================
// Open
// =============================================================================

/// Open (or create) the database file at `path`.
pub fn open_database(path: &Path) -> StoreResult<Arc<Database>> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let db = Database::create(path)?;
    create_tables(&db)?;
    tracing::info!(path = %path.display(), "Ledger database opened");
    Ok(Arc::new(db))
}

/// Open a database that lives only in memory.
pub fn in_memory_database() -> StoreResult<Arc<Database>> {
    let db = Database::builder().create_with_backend(InMemoryBackend::new())?;
    create_tables(&db)?;
    Ok(Arc::new(db))
}

/// Pre-create all tables so later read transactions don't fail.
fn create_tables(db: &Database) -> StoreResult<()> {
    let write_txn = db.begin_write()?;
    {
        let _ = write_txn.open_table(WALLETS)?;
        let _ = write_txn.open_table(TRANSFERS)?;
        let _ = write_txn.open_table(USER_TRANSFER_INDEX)?;
        let _ = write_txn.open_table(TRANSFER_OUTBOX)?;
        let _ = write_txn.open_table(NOTIFICATIONS)?;
        let _ = write_txn.open_table(NOTIFICATION_DEDUP)?;
        let _ = write_txn.open_table(USER_NOTIFICATION_INDEX)?;
        let _ = write_txn.open_table(QUEUE_EVENTS)?;
        let _ = write_txn.open_table(QUEUE_VISIBILITY)?;
        let _ = write_txn.open_table(QUEUE_DEAD_LETTERS)?;
    }
    write_txn.commit()?;
    Ok(())
}

// =============================================================================
// Index Key Helpers
// =============================================================================

/// Build a composite key for a per-user index.
///
/// Format: `len(user) as u16 BE | user | inverted_timestamp_be | id_bytes`
///
/// The length prefix keeps one user's keys from matching another user's
/// prefix. The inverted timestamp gives newest-first ordering on a forward
/// scan.
pub(crate) fn index_key(user_id: &str, timestamp_micros: i64, id: Uuid) -> Vec<u8> {
    let mut key = user_prefix(user_id);
    let inverted = u64::MAX - timestamp_micros.max(0) as u64;
    key.extend_from_slice(&inverted.to_be_bytes());
    key.extend_from_slice(id.as_bytes());
    key
}

/// Prefix covering every index entry of `user_id`.
pub(crate) fn user_prefix(user_id: &str) -> Vec<u8> {
    let bytes = user_id.as_bytes();
    let len = u16::try_from(bytes.len()).unwrap_or(u16::MAX);
    let mut prefix = Vec::with_capacity(2 + bytes.len() + 8 + 16);
    prefix.extend_from_slice(&len.to_be_bytes());
    prefix.extend_from_slice(&bytes[..len as usize]);
    prefix
}

/// Exclusive upper bound for a prefix scan over `user_id`.
pub(crate) fn user_prefix_end(user_id: &str) -> Vec<u8> {
    let mut end = user_prefix(user_id);
    end.extend_from_slice(&[0xFF; 25]);
    end
}

/// Extract the trailing id from a composite index key.
pub(crate) fn id_from_key(key: &[u8]) -> Option<Uuid> {
    let start = key.len().checked_sub(16)?;
    Uuid::from_slice(&key[start..]).ok()
}

/// Key for the queue visibility index.
pub(crate) fn visibility_key(visible_at_ms: i64, event_id: Uuid) -> Vec<u8> {
    let mut key = Vec::with_capacity(8 + 16);
    key.extend_from_slice(&(visible_at_ms.max(0) as u64).to_be_bytes());
    key.extend_from_slice(event_id.as_bytes());
    key
}

/// Inverse of [`visibility_key`] for the timestamp half.
pub(crate) fn visible_at_from_key(key: &[u8]) -> Option<i64> {
    let bytes: [u8; 8] = key.get(..8)?.try_into().ok()?;
    i64::try_from(u64::from_be_bytes(bytes)).ok()
}
