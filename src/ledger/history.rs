// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! User-centric view over the transfer log.

use std::sync::Arc;

use super::error::{LedgerError, LedgerResult};
use super::store::LedgerStore;
use super::types::{Direction, Page, PageRequest, TransferRecord};

pub struct TransferHistory {
    store: Arc<dyn LedgerStore>,
}

impl TransferHistory {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    /// Transfers where `caller_id` is sender or recipient, annotated with
    /// the direction relative to the caller.
    pub async fn list(
        &self,
        caller_id: &str,
        request: PageRequest,
    ) -> LedgerResult<Page<(TransferRecord, Direction)>> {
        let store = self.store.clone();
        let user_id = caller_id.to_string();
        let page = tokio::task::spawn_blocking(move || store.list_transfers(&user_id, request))
            .await
            .map_err(|e| LedgerError::TaskAborted(e.to_string()))??;

        tracing::debug!(
            user_id = caller_id,
            total = page.total,
            returned = page.items.len(),
            "Listed transfer history"
        );
        Ok(page)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::SortOrder;
    use crate::storage::RedbStore;

    fn seeded() -> (RedbStore, TransferHistory) {
        let store = RedbStore::in_memory().unwrap();
        store.open_wallet("alice", 100).unwrap();
        store.open_wallet("bob", 100).unwrap();
        store.open_wallet("carol", 100).unwrap();
        let history = TransferHistory::new(Arc::new(store.clone()));
        (store, history)
    }

    #[tokio::test]
    async fn directions_are_relative_to_the_caller() {
        let (store, history) = seeded();
        let out = store.commit_transfer("alice", "bob", 30).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let incoming = store.commit_transfer("carol", "alice", 5).unwrap();
        store.commit_transfer("bob", "carol", 1).unwrap();

        let page = history.list("alice", PageRequest::default()).await.unwrap();
        assert_eq!(page.total, 2);
        assert_eq!(page.items[0].0.id, incoming.id);
        assert_eq!(page.items[0].1, Direction::In);
        assert_eq!(page.items[1].0.id, out.id);
        assert_eq!(page.items[1].1, Direction::Out);
    }

    #[tokio::test]
    async fn page_past_the_end_is_empty_but_counts() {
        let (store, history) = seeded();
        for _ in 0..3 {
            store.commit_transfer("alice", "bob", 1).unwrap();
        }

        let request = PageRequest::new(Some(5), Some(10), SortOrder::NewestFirst);
        let page = history.list("bob", request).await.unwrap();
        assert!(page.items.is_empty());
        assert_eq!(page.total, 3);
    }

    #[tokio::test]
    async fn user_without_transfers_gets_empty_page() {
        let (_store, history) = seeded();
        let page = history.list("nobody", PageRequest::default()).await.unwrap();
        assert_eq!(page.total, 0);
        assert!(page.items.is_empty());
    }
}
