// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Store capability consumed by the ledger.
//!
//! Implementations must apply [`LedgerStore::commit_transfer`] as a single
//! isolated transaction: either every write lands or none does.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::error::LedgerResult;
use super::types::{Direction, Page, PageRequest, TransferRecord, Wallet};
use crate::storage::StoreResult;

pub trait LedgerStore: Send + Sync {
    /// Create a wallet for a newly registered account. Opening an existing
    /// wallet is a no-op that returns the stored row.
    fn open_wallet(&self, user_id: &str, initial_balance: u64) -> StoreResult<Wallet>;

    fn wallet(&self, user_id: &str) -> StoreResult<Option<Wallet>>;

    /// Debit `from`, credit `to`, insert the success record, index it for
    /// both parties and leave an outbox marker, all in one transaction.
    fn commit_transfer(&self, from: &str, to: &str, amount: u64) -> LedgerResult<TransferRecord>;

    fn transfer(&self, id: Uuid) -> StoreResult<Option<TransferRecord>>;

    /// Transfers where `user_id` is a party, counted and paged from the same
    /// read snapshot.
    fn list_transfers(
        &self,
        user_id: &str,
        request: PageRequest,
    ) -> StoreResult<Page<(TransferRecord, Direction)>>;

    /// Clear the outbox marker once the completion event is published.
    fn mark_published(&self, transfer_id: Uuid) -> StoreResult<()>;

    /// Transfers committed before `cutoff` whose event was never published.
    fn unpublished_before(&self, cutoff: DateTime<Utc>, limit: usize) -> StoreResult<Vec<Uuid>>;

    /// Cheap liveness probe for readiness checks.
    fn ping(&self) -> StoreResult<()>;
}
