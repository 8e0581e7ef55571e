// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Per-wallet write locks.
//!
//! Transfers sharing a wallet are serialized here before they reach the
//! store. Locks are always taken in ascending user-id order, so two
//! opposite-direction transfers between the same pair cannot deadlock.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use super::error::LedgerError;

/// Entries are pruned once the table grows past this many idle wallets.
const PRUNE_THRESHOLD: usize = 1024;

#[derive(Default)]
pub struct WalletLocks {
    table: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

/// Guards for every wallet in one transfer. Dropping it releases them all.
pub struct HeldLocks {
    _guards: Vec<OwnedMutexGuard<()>>,
}

impl WalletLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn handle(&self, user_id: &str) -> Arc<AsyncMutex<()>> {
        let mut table = match self.table.lock() {
            Ok(table) => table,
            Err(poisoned) => poisoned.into_inner(),
        };

        if table.len() > PRUNE_THRESHOLD {
            table.retain(|_, lock| Arc::strong_count(lock) > 1);
        }

        table
            .entry(user_id.to_string())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }

    /// Lock every wallet in `user_ids` in ascending order.
    ///
    /// Each acquisition waits at most `timeout`; on expiry every lock taken
    /// so far is released and `LedgerError::LockTimeout` is returned.
    pub async fn acquire(
        &self,
        user_ids: &[&str],
        timeout: Duration,
    ) -> Result<HeldLocks, LedgerError> {
        let mut ordered: Vec<&str> = user_ids.to_vec();
        ordered.sort_unstable();
        ordered.dedup();

        let mut guards = Vec::with_capacity(ordered.len());
        for user_id in ordered {
            let lock = self.handle(user_id);
            match tokio::time::timeout(timeout, lock.lock_owned()).await {
                Ok(guard) => guards.push(guard),
                Err(_) => {
                    tracing::warn!(user_id, ?timeout, "Wallet lock wait timed out");
                    return Err(LedgerError::LockTimeout(timeout));
                }
            }
        }

        Ok(HeldLocks { _guards: guards })
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.table.lock().map(|t| t.len()).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn second_acquire_waits_for_release() {
        let locks = WalletLocks::new();
        let held = locks
            .acquire(&["alice", "bob"], Duration::from_secs(1))
            .await
            .unwrap();

        let err = locks
            .acquire(&["bob"], Duration::from_millis(20))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, LedgerError::LockTimeout(_)));

        drop(held);
        assert!(locks.acquire(&["bob"], Duration::from_millis(20)).await.is_ok());
    }

    #[tokio::test]
    async fn disjoint_wallets_do_not_contend() {
        let locks = WalletLocks::new();
        let _first = locks
            .acquire(&["alice", "bob"], Duration::from_secs(1))
            .await
            .unwrap();
        assert!(locks
            .acquire(&["carol", "dave"], Duration::from_millis(20))
            .await
            .is_ok());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn opposite_directions_do_not_deadlock() {
        let locks = Arc::new(WalletLocks::new());
        let mut handles = Vec::new();
        for i in 0..50 {
            let locks = locks.clone();
            handles.push(tokio::spawn(async move {
                let pair = if i % 2 == 0 { ["alice", "bob"] } else { ["bob", "alice"] };
                let _held = locks.acquire(&pair, Duration::from_secs(5)).await?;
                tokio::task::yield_now().await;
                Ok::<_, LedgerError>(())
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }
    }

    #[tokio::test]
    async fn duplicate_ids_lock_once() {
        let locks = WalletLocks::new();
        let held = locks.acquire(&["alice", "alice"], Duration::from_millis(20)).await;
        assert!(held.is_ok());
        assert_eq!(locks.len(), 1);
    }
}
