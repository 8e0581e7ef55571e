// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Transfer Ledger
//!
//! Moves funds between two wallets and records the movement.
//!
//! ## Execution
//!
//! 1. Validate the request without touching the store.
//! 2. Lock both wallets in ascending user-id order.
//! 3. Debit, credit, record and mark the outbox in one write transaction.
//! 4. Publish `transfer.completed`, then clear the outbox marker.
//!
//! Steps 2-4 run in a detached task. A caller that goes away mid-transfer
//! cannot leave a committed transfer without its event.

use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

use super::error::{LedgerError, LedgerResult};
use super::locks::WalletLocks;
use super::store::LedgerStore;
use super::types::TransferRecord;
use crate::queue::{DomainEvent, EventQueue};

pub struct TransferLedger {
    store: Arc<dyn LedgerStore>,
    queue: Arc<dyn EventQueue>,
    locks: Arc<WalletLocks>,
    lock_wait_timeout: Duration,
}

impl TransferLedger {
    pub fn new(
        store: Arc<dyn LedgerStore>,
        queue: Arc<dyn EventQueue>,
        lock_wait_timeout: Duration,
    ) -> Self {
        Self {
            store,
            queue,
            locks: Arc::new(WalletLocks::new()),
            lock_wait_timeout,
        }
    }

    /// Transfer `amount` from `caller_id` to `to_user_id`.
    pub async fn transfer(
        &self,
        caller_id: &str,
        to_user_id: &str,
        amount: u64,
    ) -> LedgerResult<TransferRecord> {
        if amount == 0 {
            return Err(LedgerError::InvalidAmount);
        }
        if caller_id == to_user_id {
            return Err(LedgerError::SameAccountTransfer);
        }

        let store = self.store.clone();
        let queue = self.queue.clone();
        let locks = self.locks.clone();
        let timeout = self.lock_wait_timeout;
        let from = caller_id.to_string();
        let to = to_user_id.to_string();

        let task = tokio::spawn(async move {
            let held = locks.acquire(&[&from, &to], timeout).await?;

            let commit_store = store.clone();
            let record = tokio::task::spawn_blocking(move || {
                let result = commit_store.commit_transfer(&from, &to, amount);
                drop(held);
                result
            })
            .await
            .map_err(|e| LedgerError::TaskAborted(e.to_string()))??;

            tracing::info!(
                transfer_id = %record.id,
                from = %record.from_user_id,
                to = %record.to_user_id,
                amount = record.amount,
                "Transfer committed"
            );

            publish_completion(store.as_ref(), queue.as_ref(), record.id).await;
            Ok(record)
        });

        match task.await {
            Ok(result) => result,
            Err(e) => {
                tracing::error!(error = %e, "Transfer task failed");
                Err(LedgerError::TaskAborted(e.to_string()))
            }
        }
    }

    /// A single transfer, visible only to its sender and recipient.
    pub async fn get_transfer(
        &self,
        caller_id: &str,
        transfer_id: Uuid,
    ) -> LedgerResult<Option<TransferRecord>> {
        let store = self.store.clone();
        let record = tokio::task::spawn_blocking(move || store.transfer(transfer_id))
            .await
            .map_err(|e| LedgerError::TaskAborted(e.to_string()))??;

        Ok(record.filter(|r| r.direction_for(caller_id).is_some()))
    }

    pub fn store(&self) -> &Arc<dyn LedgerStore> {
        &self.store
    }
}

/// Publish the completion event for a committed transfer and clear its
/// outbox marker. Failures leave the marker for the reconciler.
pub(crate) async fn publish_completion(
    store: &dyn LedgerStore,
    queue: &dyn EventQueue,
    transfer_id: Uuid,
) -> bool {
    if let Err(e) = queue.publish(DomainEvent::transfer_completed(transfer_id)).await {
        tracing::warn!(
            %transfer_id,
            error = %e,
            "Failed to publish transfer.completed; left for reconciliation"
        );
        return false;
    }

    if let Err(e) = store.mark_published(transfer_id) {
        tracing::warn!(%transfer_id, error = %e, "Failed to clear outbox marker");
    }
    true
}
