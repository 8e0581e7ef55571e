// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! redb implementation of the ledger and notification stores.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use redb::{Database, ReadableDatabase, ReadableTable, WriteTransaction};
use serde::de::DeserializeOwned;
use uuid::Uuid;

use super::database::{
    id_from_key, in_memory_database, index_key, user_prefix, user_prefix_end, NOTIFICATIONS,
    NOTIFICATION_DEDUP, TRANSFERS, TRANSFER_OUTBOX, USER_NOTIFICATION_INDEX, USER_TRANSFER_INDEX,
    WALLETS,
};
use super::{StoreError, StoreResult};
use crate::ledger::{
    Direction, LedgerError, LedgerResult, LedgerStore, Page, PageRequest, SortOrder,
    TransferRecord, Wallet,
};
use crate::notify::{Notification, NotificationStore};

/// Wallets, transfers and notifications in one embedded database.
#[derive(Clone)]
pub struct RedbStore {
    db: Arc<Database>,
}

impl RedbStore {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    pub fn in_memory() -> StoreResult<Self> {
        Ok(Self::new(in_memory_database()?))
    }

    /// Shared handle, so the event queue can live in the same file.
    pub fn database(&self) -> Arc<Database> {
        self.db.clone()
    }
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> StoreResult<T> {
    Ok(serde_json::from_slice(bytes)?)
}

/// Steps 2-4 of a transfer. The outer `Result` is an infrastructure failure,
/// the inner one a business-rule rejection. Either way the caller aborts.
fn apply_transfer(
    txn: &WriteTransaction,
    from: &str,
    to: &str,
    amount: u64,
) -> StoreResult<Result<TransferRecord, LedgerError>> {
    let mut wallets = txn.open_table(WALLETS)?;

    let sender_bytes = wallets.get(from)?.map(|v| v.value().to_vec());
    let recipient_bytes = wallets.get(to)?.map(|v| v.value().to_vec());

    let Some(sender_bytes) = sender_bytes else {
        return Ok(Err(LedgerError::SenderNotFound(from.to_string())));
    };
    let Some(recipient_bytes) = recipient_bytes else {
        return Ok(Err(LedgerError::RecipientNotFound(to.to_string())));
    };

    let mut sender: Wallet = decode(&sender_bytes)?;
    let mut recipient: Wallet = decode(&recipient_bytes)?;

    if sender.balance < amount {
        return Ok(Err(LedgerError::InsufficientBalance {
            available: sender.balance,
            requested: amount,
        }));
    }
    let Some(credited) = recipient.balance.checked_add(amount) else {
        return Ok(Err(LedgerError::BalanceOverflow));
    };

    let record = TransferRecord::committed(from, to, amount);

    sender.balance -= amount;
    sender.version += 1;
    sender.updated_at = record.created_at;
    recipient.balance = credited;
    recipient.version += 1;
    recipient.updated_at = record.created_at;

    wallets.insert(from, serde_json::to_vec(&sender)?.as_slice())?;
    wallets.insert(to, serde_json::to_vec(&recipient)?.as_slice())?;

    let id = record.id.to_string();
    let timestamp = record.created_at.timestamp_micros();

    let mut transfers = txn.open_table(TRANSFERS)?;
    transfers.insert(id.as_str(), serde_json::to_vec(&record)?.as_slice())?;

    let mut index = txn.open_table(USER_TRANSFER_INDEX)?;
    index.insert(
        index_key(from, timestamp, record.id).as_slice(),
        Direction::Out.as_str(),
    )?;
    index.insert(
        index_key(to, timestamp, record.id).as_slice(),
        Direction::In.as_str(),
    )?;

    let mut outbox = txn.open_table(TRANSFER_OUTBOX)?;
    outbox.insert(id.as_str(), timestamp)?;

    Ok(Ok(record))
}

/// Apply ordering and the page window to entries collected newest first.
fn window<T>(mut entries: Vec<T>, request: &PageRequest) -> Vec<T> {
    if request.sort == SortOrder::OldestFirst {
        entries.reverse();
    }
    entries
        .into_iter()
        .skip(request.offset())
        .take(request.limit as usize)
        .collect()
}

// =============================================================================
// LedgerStore
// =============================================================================

impl LedgerStore for RedbStore {
    fn open_wallet(&self, user_id: &str, initial_balance: u64) -> StoreResult<Wallet> {
        let write_txn = self.db.begin_write()?;
        let wallet = {
            let mut wallets = write_txn.open_table(WALLETS)?;
            let existing = wallets.get(user_id)?.map(|v| v.value().to_vec());
            match existing {
                Some(bytes) => decode(&bytes)?,
                None => {
                    let wallet = Wallet::open(user_id, initial_balance);
                    wallets.insert(user_id, serde_json::to_vec(&wallet)?.as_slice())?;
                    tracing::info!(user_id, balance = initial_balance, "Wallet opened");
                    wallet
                }
            }
        };
        write_txn.commit()?;
        Ok(wallet)
    }

    fn wallet(&self, user_id: &str) -> StoreResult<Option<Wallet>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(WALLETS)?;
        let wallet = match table.get(user_id)? {
            Some(value) => Some(decode(value.value())?),
            None => None,
        };
        Ok(wallet)
    }

    fn commit_transfer(&self, from: &str, to: &str, amount: u64) -> LedgerResult<TransferRecord> {
        let write_txn = self.db.begin_write().map_err(StoreError::from)?;

        match apply_transfer(&write_txn, from, to, amount) {
            Ok(Ok(record)) => {
                write_txn.commit().map_err(StoreError::from)?;
                Ok(record)
            }
            Ok(Err(rejected)) => {
                write_txn.abort().map_err(StoreError::from)?;
                Err(rejected)
            }
            Err(failure) => {
                if let Err(e) = write_txn.abort() {
                    tracing::error!(error = %e, "Failed to abort transfer transaction");
                }
                Err(failure.into())
            }
        }
    }

    fn transfer(&self, id: Uuid) -> StoreResult<Option<TransferRecord>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(TRANSFERS)?;
        let record = match table.get(id.to_string().as_str())? {
            Some(value) => Some(decode(value.value())?),
            None => None,
        };
        Ok(record)
    }

    fn list_transfers(
        &self,
        user_id: &str,
        request: PageRequest,
    ) -> StoreResult<Page<(TransferRecord, Direction)>> {
        // Count and page come from the same snapshot.
        let read_txn = self.db.begin_read()?;
        let index = read_txn.open_table(USER_TRANSFER_INDEX)?;
        let transfers = read_txn.open_table(TRANSFERS)?;

        let prefix = user_prefix(user_id);
        let prefix_end = user_prefix_end(user_id);

        let mut matches = Vec::new();
        for entry in index.range(prefix.as_slice()..prefix_end.as_slice())? {
            let (key, value) = entry?;
            let id = id_from_key(key.value())
                .ok_or_else(|| StoreError::Corrupt("transfer index key".to_string()))?;
            let direction = Direction::parse(value.value())
                .ok_or_else(|| StoreError::Corrupt(format!("direction {:?}", value.value())))?;
            matches.push((id, direction));
        }

        let total = matches.len() as u64;
        let mut items = Vec::with_capacity(request.limit as usize);
        for (id, direction) in window(matches, &request) {
            let value = transfers
                .get(id.to_string().as_str())?
                .ok_or_else(|| StoreError::Corrupt(format!("indexed transfer {id} missing")))?;
            items.push((decode(value.value())?, direction));
        }

        Ok(Page {
            items,
            total,
            request,
        })
    }

    fn mark_published(&self, transfer_id: Uuid) -> StoreResult<()> {
        let write_txn = self.db.begin_write()?;
        {
            let mut outbox = write_txn.open_table(TRANSFER_OUTBOX)?;
            outbox.remove(transfer_id.to_string().as_str())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    fn unpublished_before(&self, cutoff: DateTime<Utc>, limit: usize) -> StoreResult<Vec<Uuid>> {
        let cutoff = cutoff.timestamp_micros();
        let read_txn = self.db.begin_read()?;
        let outbox = read_txn.open_table(TRANSFER_OUTBOX)?;

        let mut ids = Vec::new();
        for entry in outbox.iter()? {
            let (key, committed_at) = entry?;
            if committed_at.value() >= cutoff {
                continue;
            }
            match Uuid::parse_str(key.value()) {
                Ok(id) => ids.push(id),
                Err(e) => tracing::warn!(key = key.value(), error = %e, "Skipping malformed outbox key"),
            }
            if ids.len() >= limit {
                break;
            }
        }
        Ok(ids)
    }

    fn ping(&self) -> StoreResult<()> {
        let read_txn = self.db.begin_read()?;
        let _ = read_txn.open_table(WALLETS)?;
        Ok(())
    }
}

// =============================================================================
// NotificationStore
// =============================================================================

fn dedup_key(notification: &Notification) -> String {
    format!(
        "{}|{}",
        notification.related_transfer_id, notification.recipient_user_id
    )
}

impl NotificationStore for RedbStore {
    fn insert_if_absent(&self, notification: &Notification) -> StoreResult<bool> {
        let write_txn = self.db.begin_write()?;
        let inserted = {
            let mut dedup = write_txn.open_table(NOTIFICATION_DEDUP)?;
            let key = dedup_key(notification);
            let exists = dedup.get(key.as_str())?.is_some();
            if exists {
                false
            } else {
                let id = notification.id.to_string();
                dedup.insert(key.as_str(), id.as_str())?;

                let mut rows = write_txn.open_table(NOTIFICATIONS)?;
                rows.insert(id.as_str(), serde_json::to_vec(notification)?.as_slice())?;

                let mut index = write_txn.open_table(USER_NOTIFICATION_INDEX)?;
                let key = index_key(
                    &notification.recipient_user_id,
                    notification.created_at.timestamp_micros(),
                    notification.id,
                );
                index.insert(key.as_slice(), id.as_str())?;
                true
            }
        };

        if inserted {
            write_txn.commit()?;
        } else {
            write_txn.abort()?;
        }
        Ok(inserted)
    }

    fn notifications_for(
        &self,
        user_id: &str,
        request: PageRequest,
    ) -> StoreResult<Page<Notification>> {
        let read_txn = self.db.begin_read()?;
        let index = read_txn.open_table(USER_NOTIFICATION_INDEX)?;
        let rows = read_txn.open_table(NOTIFICATIONS)?;

        let prefix = user_prefix(user_id);
        let prefix_end = user_prefix_end(user_id);

        let mut ids = Vec::new();
        for entry in index.range(prefix.as_slice()..prefix_end.as_slice())? {
            let (_, value) = entry?;
            ids.push(value.value().to_string());
        }

        let total = ids.len() as u64;
        let mut items = Vec::with_capacity(request.limit as usize);
        for id in window(ids, &request) {
            let value = rows
                .get(id.as_str())?
                .ok_or_else(|| StoreError::Corrupt(format!("indexed notification {id} missing")))?;
            items.push(decode(value.value())?);
        }

        Ok(Page {
            items,
            total,
            request,
        })
    }

    fn mark_read(&self, user_id: &str, notification_id: Uuid) -> StoreResult<Option<Notification>> {
        let id = notification_id.to_string();
        let write_txn = self.db.begin_write()?;
        let updated = {
            let mut rows = write_txn.open_table(NOTIFICATIONS)?;
            let existing = rows.get(id.as_str())?.map(|v| v.value().to_vec());
            match existing {
                Some(bytes) => {
                    let mut notification: Notification = decode(&bytes)?;
                    if notification.recipient_user_id != user_id {
                        None
                    } else {
                        notification.mark_read();
                        rows.insert(id.as_str(), serde_json::to_vec(&notification)?.as_slice())?;
                        Some(notification)
                    }
                }
                None => None,
            }
        };

        if updated.is_some() {
            write_txn.commit()?;
        } else {
            write_txn.abort()?;
        }
        Ok(updated)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::TransferStatus;

    fn store_with(wallets: &[(&str, u64)]) -> RedbStore {
        let store = RedbStore::in_memory().unwrap();
        for (user, balance) in wallets {
            store.open_wallet(user, *balance).unwrap();
        }
        store
    }

    fn balance(store: &RedbStore, user: &str) -> u64 {
        store.wallet(user).unwrap().unwrap().balance
    }

    #[test]
    fn commit_transfer_moves_balance_and_records() {
        let store = store_with(&[("alice", 100), ("bob", 0)]);

        let record = store.commit_transfer("alice", "bob", 40).unwrap();
        assert_eq!(record.status, TransferStatus::Success);
        assert_eq!(balance(&store, "alice"), 60);
        assert_eq!(balance(&store, "bob"), 40);
        assert_eq!(store.wallet("alice").unwrap().unwrap().version, 1);

        let stored = store.transfer(record.id).unwrap().unwrap();
        assert_eq!(stored, record);
    }

    #[test]
    fn insufficient_balance_leaves_no_trace() {
        let store = store_with(&[("alice", 10), ("bob", 0)]);

        let err = store.commit_transfer("alice", "bob", 40).unwrap_err();
        assert!(matches!(
            err,
            LedgerError::InsufficientBalance {
                available: 10,
                requested: 40
            }
        ));
        assert_eq!(balance(&store, "alice"), 10);
        assert_eq!(balance(&store, "bob"), 0);

        let page = store.list_transfers("alice", PageRequest::default()).unwrap();
        assert_eq!(page.total, 0);
        assert!(store.unpublished_before(Utc::now(), 10).unwrap().is_empty());
    }

    #[test]
    fn missing_parties_are_reported() {
        let store = store_with(&[("alice", 10)]);

        let err = store.commit_transfer("alice", "ghost", 1).unwrap_err();
        assert!(matches!(err, LedgerError::RecipientNotFound(ref u) if u == "ghost"));
        assert_eq!(balance(&store, "alice"), 10);

        let err = store.commit_transfer("nobody", "alice", 1).unwrap_err();
        assert!(matches!(err, LedgerError::SenderNotFound(_)));
    }

    #[test]
    fn credit_overflow_is_rejected() {
        let store = store_with(&[("alice", 10), ("bob", u64::MAX)]);
        let err = store.commit_transfer("alice", "bob", 1).unwrap_err();
        assert!(matches!(err, LedgerError::BalanceOverflow));
        assert!(!err.is_persistence_failure());
        assert_eq!(balance(&store, "alice"), 10);
        assert_eq!(balance(&store, "bob"), u64::MAX);
    }

    #[test]
    fn open_wallet_is_idempotent() {
        let store = store_with(&[("alice", 10)]);
        let again = store.open_wallet("alice", 999).unwrap();
        assert_eq!(again.balance, 10);
    }

    #[test]
    fn list_transfers_annotates_direction_and_counts() {
        let store = store_with(&[("alice", 100), ("bob", 100), ("carol", 100)]);
        for (from, to, amount) in [("alice", "bob", 1), ("bob", "alice", 2), ("bob", "carol", 3)] {
            store.commit_transfer(from, to, amount).unwrap();
            std::thread::sleep(std::time::Duration::from_millis(2));
        }

        let page = store.list_transfers("alice", PageRequest::default()).unwrap();
        assert_eq!(page.total, 2);
        assert_eq!(page.items.len(), 2);
        // Newest first
        assert_eq!(page.items[0].0.amount, 2);
        assert_eq!(page.items[0].1, Direction::In);
        assert_eq!(page.items[1].0.amount, 1);
        assert_eq!(page.items[1].1, Direction::Out);

        let page = store.list_transfers("carol", PageRequest::default()).unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.items[0].1, Direction::In);
    }

    #[test]
    fn list_transfers_paginates_and_sorts() {
        let store = store_with(&[("alice", 100), ("bob", 0)]);
        for amount in 1..=5 {
            store.commit_transfer("alice", "bob", amount).unwrap();
            std::thread::sleep(std::time::Duration::from_millis(2));
        }

        let request = PageRequest::new(Some(1), Some(2), SortOrder::NewestFirst);
        let page = store.list_transfers("bob", request).unwrap();
        assert_eq!(page.total, 5);
        let amounts: Vec<u64> = page.items.iter().map(|(r, _)| r.amount).collect();
        assert_eq!(amounts, vec![3, 2]);

        let request = PageRequest::new(Some(0), Some(2), SortOrder::OldestFirst);
        let page = store.list_transfers("bob", request).unwrap();
        let amounts: Vec<u64> = page.items.iter().map(|(r, _)| r.amount).collect();
        assert_eq!(amounts, vec![1, 2]);

        let request = PageRequest::new(Some(9), Some(2), SortOrder::NewestFirst);
        let page = store.list_transfers("bob", request).unwrap();
        assert_eq!(page.total, 5);
        assert!(page.items.is_empty());
    }

    #[test]
    fn outbox_tracks_unpublished_transfers() {
        let store = store_with(&[("alice", 100), ("bob", 0)]);
        let first = store.commit_transfer("alice", "bob", 1).unwrap();
        let second = store.commit_transfer("alice", "bob", 1).unwrap();

        let later = Utc::now() + chrono::Duration::seconds(1);
        let pending = store.unpublished_before(later, 10).unwrap();
        assert_eq!(pending.len(), 2);

        let earlier = first.created_at - chrono::Duration::seconds(1);
        assert!(store.unpublished_before(earlier, 10).unwrap().is_empty());

        store.mark_published(first.id).unwrap();
        assert_eq!(store.unpublished_before(later, 10).unwrap(), vec![second.id]);
    }

    #[test]
    fn notification_insert_is_idempotent_per_recipient() {
        let store = store_with(&[]);
        let record = TransferRecord::committed("alice", "bob", 5);

        assert!(store.insert_if_absent(&Notification::funds_received(&record)).unwrap());
        // A redelivery builds a fresh row with a new id; dedup is by transfer + recipient.
        assert!(!store.insert_if_absent(&Notification::funds_received(&record)).unwrap());
        assert!(store.insert_if_absent(&Notification::funds_sent(&record)).unwrap());

        let bob = store.notifications_for("bob", PageRequest::default()).unwrap();
        assert_eq!(bob.total, 1);
        let alice = store.notifications_for("alice", PageRequest::default()).unwrap();
        assert_eq!(alice.total, 1);
    }

    #[test]
    fn mark_read_only_for_owner() {
        let store = store_with(&[]);
        let record = TransferRecord::committed("alice", "bob", 5);
        let notification = Notification::funds_received(&record);
        store.insert_if_absent(&notification).unwrap();

        assert!(store.mark_read("alice", notification.id).unwrap().is_none());
        assert!(store.mark_read("bob", Uuid::new_v4()).unwrap().is_none());

        let read = store.mark_read("bob", notification.id).unwrap().unwrap();
        assert!(read.read);
        assert!(read.read_at.is_some());

        let page = store.notifications_for("bob", PageRequest::default()).unwrap();
        assert!(page.items[0].read);
    }

    #[test]
    fn transfers_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.redb");

        let id = {
            let store = RedbStore::new(crate::storage::open_database(&path).unwrap());
            store.open_wallet("alice", 50).unwrap();
            store.open_wallet("bob", 0).unwrap();
            store.commit_transfer("alice", "bob", 20).unwrap().id
        };

        let store = RedbStore::new(crate::storage::open_database(&path).unwrap());
        assert_eq!(balance(&store, "alice"), 30);
        assert_eq!(balance(&store, "bob"), 20);
        assert!(store.transfer(id).unwrap().is_some());
    }
}
