// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Event queue stored in the ledger's redb database.
//!
//! Each event has one row in `queue_events` and one key in
//! `queue_visibility` ordered by the time it becomes visible. Leasing an
//! event moves its visibility key into the future, so an expired lease needs
//! no sweeper: the event is simply visible again.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use redb::{Database, ReadableDatabase, ReadableTable, WriteTransaction};
use serde::{Deserialize, Serialize};
use tokio::sync::{futures::Notified, Notify};
use uuid::Uuid;

use super::{
    DeadLetter, Delivery, DomainEvent, EventQueue, QueueError, QueueResult, Receipt,
};
use crate::storage::database::{
    in_memory_database, visibility_key, visible_at_from_key, QUEUE_DEAD_LETTERS, QUEUE_EVENTS,
    QUEUE_VISIBILITY,
};
use crate::storage::StoreResult;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct QueueEntry {
    event: DomainEvent,
    visible_at_ms: i64,
    lease_id: Option<Uuid>,
    last_error: Option<String>,
}

/// Result of checking a receipt against the stored lease.
enum Settle {
    Done,
    Missing,
    Stale,
}

fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

fn after(duration: Duration) -> i64 {
    let millis = i64::try_from(duration.as_millis()).unwrap_or(i64::MAX);
    now_ms().saturating_add(millis)
}

pub struct RedbEventQueue {
    db: Arc<Database>,
    wakeup: Notify,
}

impl RedbEventQueue {
    pub fn new(db: Arc<Database>) -> Self {
        Self {
            db,
            wakeup: Notify::new(),
        }
    }

    pub fn in_memory() -> StoreResult<Self> {
        Ok(Self::new(in_memory_database()?))
    }

    fn insert_entry(txn: &WriteTransaction, entry: &QueueEntry) -> StoreResult<()> {
        let id = entry.event.id.to_string();
        let mut events = txn.open_table(QUEUE_EVENTS)?;
        events.insert(id.as_str(), serde_json::to_vec(entry)?.as_slice())?;
        let mut visibility = txn.open_table(QUEUE_VISIBILITY)?;
        visibility.insert(
            visibility_key(entry.visible_at_ms, entry.event.id).as_slice(),
            id.as_str(),
        )?;
        Ok(())
    }

    fn publish_blocking(&self, event: DomainEvent) -> StoreResult<bool> {
        let id = event.id.to_string();
        let write_txn = self.db.begin_write()?;
        let exists = {
            let events = write_txn.open_table(QUEUE_EVENTS)?;
            let found = events.get(id.as_str())?.is_some();
            found
        };
        if exists {
            write_txn.abort()?;
            return Ok(false);
        }

        let entry = QueueEntry {
            event,
            visible_at_ms: now_ms(),
            lease_id: None,
            last_error: None,
        };
        Self::insert_entry(&write_txn, &entry)?;
        write_txn.commit()?;
        Ok(true)
    }

    fn receive_blocking(&self, visibility_timeout: Duration) -> StoreResult<Option<Delivery>> {
        let write_txn = self.db.begin_write()?;
        let upper = visibility_key(now_ms(), Uuid::max());

        let delivery = loop {
            let next = {
                let visibility = write_txn.open_table(QUEUE_VISIBILITY)?;
                let lower: &[u8] = &[];
                let mut range = visibility.range(lower..=upper.as_slice())?;
                let first = match range.next() {
                    Some(entry) => {
                        let (key, id) = entry?;
                        Some((key.value().to_vec(), id.value().to_string()))
                    }
                    None => None,
                };
                first
            };

            let Some((key, id)) = next else {
                break None;
            };

            write_txn.open_table(QUEUE_VISIBILITY)?.remove(key.as_slice())?;

            let stored = {
                let events = write_txn.open_table(QUEUE_EVENTS)?;
                let bytes = events.get(id.as_str())?.map(|v| v.value().to_vec());
                bytes
            };
            let Some(bytes) = stored else {
                tracing::warn!(event_id = %id, "Dropping dangling visibility entry");
                continue;
            };

            let mut entry: QueueEntry = serde_json::from_slice(&bytes)?;
            let lease_id = Uuid::new_v4();
            entry.event.attempts = entry.event.attempts.saturating_add(1);
            entry.lease_id = Some(lease_id);
            entry.visible_at_ms = after(visibility_timeout);
            Self::insert_entry(&write_txn, &entry)?;

            break Some(Delivery {
                receipt: Receipt {
                    event_id: entry.event.id,
                    lease_id,
                },
                event: entry.event,
            });
        };

        write_txn.commit()?;
        Ok(delivery)
    }

    /// Validate `receipt` against the stored lease, drop the event's
    /// visibility key, then run `action` in the same transaction.
    fn settle<F>(&self, receipt: &Receipt, action: F) -> StoreResult<Settle>
    where
        F: FnOnce(&WriteTransaction, QueueEntry) -> StoreResult<()>,
    {
        let key = receipt.event_id.to_string();
        let write_txn = self.db.begin_write()?;

        let stored = {
            let events = write_txn.open_table(QUEUE_EVENTS)?;
            let bytes = events.get(key.as_str())?.map(|v| v.value().to_vec());
            bytes
        };
        let Some(bytes) = stored else {
            write_txn.abort()?;
            return Ok(Settle::Missing);
        };
        let entry: QueueEntry = serde_json::from_slice(&bytes)?;
        if entry.lease_id != Some(receipt.lease_id) {
            write_txn.abort()?;
            return Ok(Settle::Stale);
        }

        write_txn
            .open_table(QUEUE_VISIBILITY)?
            .remove(visibility_key(entry.visible_at_ms, receipt.event_id).as_slice())?;
        action(&write_txn, entry)?;
        write_txn.commit()?;
        Ok(Settle::Done)
    }

    /// Visibility time of the earliest key, leased events included.
    fn next_visible_blocking(&self) -> StoreResult<Option<i64>> {
        let read_txn = self.db.begin_read()?;
        let visibility = read_txn.open_table(QUEUE_VISIBILITY)?;
        let first = visibility
            .first()?
            .and_then(|(key, _)| visible_at_from_key(key.value()));
        Ok(first)
    }

    fn dead_letters_blocking(&self, limit: usize) -> StoreResult<Vec<DeadLetter>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(QUEUE_DEAD_LETTERS)?;
        let mut letters = Vec::new();
        for entry in table.iter()? {
            let (_, value) = entry?;
            letters.push(serde_json::from_slice(value.value())?);
            if letters.len() >= limit {
                break;
            }
        }
        Ok(letters)
    }

    fn redrive_blocking(&self, event_id: Uuid) -> StoreResult<bool> {
        let key = event_id.to_string();
        let write_txn = self.db.begin_write()?;
        let parked = {
            let mut dead = write_txn.open_table(QUEUE_DEAD_LETTERS)?;
            let bytes = dead.remove(key.as_str())?.map(|v| v.value().to_vec());
            bytes
        };
        let Some(bytes) = parked else {
            write_txn.abort()?;
            return Ok(false);
        };

        let letter: DeadLetter = serde_json::from_slice(&bytes)?;
        let mut event = letter.event;
        event.attempts = 0;
        let entry = QueueEntry {
            event,
            visible_at_ms: now_ms(),
            lease_id: None,
            last_error: Some(letter.reason),
        };
        Self::insert_entry(&write_txn, &entry)?;
        write_txn.commit()?;
        Ok(true)
    }
}

fn settled(outcome: Settle, receipt: &Receipt) -> QueueResult<()> {
    match outcome {
        Settle::Done => Ok(()),
        Settle::Missing => Err(QueueError::NotFound(receipt.event_id)),
        Settle::Stale => Err(QueueError::StaleReceipt(receipt.event_id)),
    }
}

#[async_trait]
impl EventQueue for RedbEventQueue {
    async fn publish(&self, event: DomainEvent) -> QueueResult<()> {
        let event_id = event.id;
        let event_type = event.event_type.clone();
        if self.publish_blocking(event)? {
            tracing::debug!(%event_id, %event_type, "Event published");
            self.wakeup.notify_waiters();
        } else {
            tracing::debug!(%event_id, "Event already queued, skipping publish");
        }
        Ok(())
    }

    async fn receive(&self, visibility_timeout: Duration) -> QueueResult<Option<Delivery>> {
        Ok(self.receive_blocking(visibility_timeout)?)
    }

    async fn ack(&self, receipt: &Receipt) -> QueueResult<()> {
        let key = receipt.event_id.to_string();
        let outcome = self.settle(receipt, |txn, _| {
            txn.open_table(QUEUE_EVENTS)?.remove(key.as_str())?;
            Ok(())
        })?;
        match outcome {
            Settle::Missing => {
                tracing::debug!(event_id = %receipt.event_id, "Ack for event already removed");
                Ok(())
            }
            other => settled(other, receipt),
        }
    }

    async fn retry_later(
        &self,
        receipt: &Receipt,
        backoff: Duration,
        error: &str,
    ) -> QueueResult<()> {
        let outcome = self.settle(receipt, |txn, mut entry| {
            entry.lease_id = None;
            entry.visible_at_ms = after(backoff);
            entry.last_error = Some(error.to_string());
            Self::insert_entry(txn, &entry)
        })?;
        if matches!(outcome, Settle::Done) {
            // Parked peers recompute their wake-up time.
            self.wakeup.notify_waiters();
        }
        settled(outcome, receipt)
    }

    async fn dead_letter(&self, receipt: &Receipt, reason: &str) -> QueueResult<()> {
        let key = receipt.event_id.to_string();
        let outcome = self.settle(receipt, |txn, entry| {
            txn.open_table(QUEUE_EVENTS)?.remove(key.as_str())?;
            let letter = DeadLetter {
                event: entry.event,
                reason: reason.to_string(),
                dead_lettered_at: Utc::now(),
            };
            txn.open_table(QUEUE_DEAD_LETTERS)?
                .insert(key.as_str(), serde_json::to_vec(&letter)?.as_slice())?;
            Ok(())
        })?;
        settled(outcome, receipt)
    }

    fn changed(&self) -> Notified<'_> {
        self.wakeup.notified()
    }

    async fn next_visible_in(&self) -> QueueResult<Option<Duration>> {
        let due = self.next_visible_blocking()?.map(|visible_at_ms| {
            let remaining = visible_at_ms.saturating_sub(now_ms()).max(0);
            Duration::from_millis(remaining as u64)
        });
        Ok(due)
    }

    async fn dead_letters(&self, limit: usize) -> QueueResult<Vec<DeadLetter>> {
        Ok(self.dead_letters_blocking(limit)?)
    }

    async fn redrive(&self, event_id: Uuid) -> QueueResult<()> {
        if self.redrive_blocking(event_id)? {
            tracing::info!(%event_id, "Dead-lettered event redriven");
            self.wakeup.notify_waiters();
            Ok(())
        } else {
            Err(QueueError::NotFound(event_id))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LEASE: Duration = Duration::from_secs(30);

    fn event() -> DomainEvent {
        DomainEvent::transfer_completed(Uuid::new_v4())
    }

    #[tokio::test]
    async fn receive_on_empty_queue_returns_none() {
        let queue = RedbEventQueue::in_memory().unwrap();
        assert!(queue.receive(LEASE).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn publish_receive_ack() {
        let queue = RedbEventQueue::in_memory().unwrap();
        let published = event();
        queue.publish(published.clone()).await.unwrap();

        let delivery = queue.receive(LEASE).await.unwrap().unwrap();
        assert_eq!(delivery.event.id, published.id);
        assert_eq!(delivery.event.attempts, 1);

        // Leased events are invisible to other consumers.
        assert!(queue.receive(LEASE).await.unwrap().is_none());

        queue.ack(&delivery.receipt).await.unwrap();
        // Second ack is a no-op.
        queue.ack(&delivery.receipt).await.unwrap();
        assert!(queue.receive(Duration::ZERO).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn duplicate_publish_is_ignored() {
        let queue = RedbEventQueue::in_memory().unwrap();
        let published = event();
        queue.publish(published.clone()).await.unwrap();
        queue.publish(published).await.unwrap();

        let first = queue.receive(LEASE).await.unwrap();
        assert!(first.is_some());
        assert!(queue.receive(LEASE).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn expired_lease_is_redelivered_and_old_receipt_goes_stale() {
        let queue = RedbEventQueue::in_memory().unwrap();
        queue.publish(event()).await.unwrap();

        let first = queue.receive(Duration::from_millis(20)).await.unwrap().unwrap();
        tokio::time::sleep(Duration::from_millis(40)).await;

        let second = queue.receive(LEASE).await.unwrap().unwrap();
        assert_eq!(second.event.id, first.event.id);
        assert_eq!(second.event.attempts, 2);

        let err = queue.ack(&first.receipt).await.unwrap_err();
        assert!(matches!(err, QueueError::StaleReceipt(_)));
        queue.ack(&second.receipt).await.unwrap();
    }

    #[tokio::test]
    async fn retry_later_hides_event_until_backoff_elapses() {
        let queue = RedbEventQueue::in_memory().unwrap();
        queue.publish(event()).await.unwrap();

        let delivery = queue.receive(LEASE).await.unwrap().unwrap();
        queue
            .retry_later(&delivery.receipt, Duration::from_millis(30), "webhook timeout")
            .await
            .unwrap();
        assert!(queue.receive(LEASE).await.unwrap().is_none());

        tokio::time::sleep(Duration::from_millis(50)).await;
        let again = queue.receive(LEASE).await.unwrap().unwrap();
        assert_eq!(again.event.id, delivery.event.id);
        assert_eq!(again.event.attempts, 2);
    }

    #[tokio::test]
    async fn next_visible_in_tracks_earliest_event() {
        let queue = RedbEventQueue::in_memory().unwrap();
        assert_eq!(queue.next_visible_in().await.unwrap(), None);

        queue.publish(event()).await.unwrap();
        assert_eq!(queue.next_visible_in().await.unwrap(), Some(Duration::ZERO));

        let delivery = queue.receive(LEASE).await.unwrap().unwrap();
        queue
            .retry_later(&delivery.receipt, Duration::from_secs(2), "busy")
            .await
            .unwrap();
        let due = queue.next_visible_in().await.unwrap().unwrap();
        assert!(due > Duration::from_secs(1) && due <= Duration::from_secs(2));
        assert!(queue.receive(LEASE).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn dead_letter_and_redrive() {
        let queue = RedbEventQueue::in_memory().unwrap();
        let published = event();
        queue.publish(published.clone()).await.unwrap();

        let delivery = queue.receive(LEASE).await.unwrap().unwrap();
        queue
            .dead_letter(&delivery.receipt, "transfer missing")
            .await
            .unwrap();
        assert!(queue.receive(Duration::ZERO).await.unwrap().is_none());

        let letters = queue.dead_letters(10).await.unwrap();
        assert_eq!(letters.len(), 1);
        assert_eq!(letters[0].event.id, published.id);
        assert_eq!(letters[0].reason, "transfer missing");

        queue.redrive(published.id).await.unwrap();
        assert!(queue.dead_letters(10).await.unwrap().is_empty());
        let redriven = queue.receive(LEASE).await.unwrap().unwrap();
        assert_eq!(redriven.event.attempts, 1);

        let err = queue.redrive(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, QueueError::NotFound(_)));
    }

    #[tokio::test]
    async fn settling_unknown_event_fails() {
        let queue = RedbEventQueue::in_memory().unwrap();
        let receipt = Receipt {
            event_id: Uuid::new_v4(),
            lease_id: Uuid::new_v4(),
        };
        let err = queue.dead_letter(&receipt, "x").await.unwrap_err();
        assert!(matches!(err, QueueError::NotFound(_)));
    }

    #[tokio::test]
    async fn leased_event_survives_restart() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("queue.redb");
        let published = event();

        {
            let queue = RedbEventQueue::new(crate::storage::open_database(&path).unwrap());
            queue.publish(published.clone()).await.unwrap();
            // Lease it and "crash" without acking.
            let _ = queue.receive(Duration::from_millis(10)).await.unwrap().unwrap();
        }

        tokio::time::sleep(Duration::from_millis(20)).await;
        let queue = RedbEventQueue::new(crate::storage::open_database(&path).unwrap());
        let redelivered = queue.receive(LEASE).await.unwrap().unwrap();
        assert_eq!(redelivered.event.id, published.id);
        assert_eq!(redelivered.event.attempts, 2);
    }
}
