// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::sync::Arc;
use std::time::Duration;

use crate::ledger::{LedgerStore, TransferHistory, TransferLedger};
use crate::notify::NotificationStore;
use crate::queue::EventQueue;
use crate::storage::RedbStore;

/// Bearer token verification settings.
#[derive(Clone, Debug, Default)]
pub struct AuthConfig {
    /// HS256 secret. `None` disables signature verification where allowed.
    pub jwt_secret: Option<String>,
    /// Accept unsigned tokens when no secret is set.
    pub allow_unsigned: bool,
}

impl AuthConfig {
    /// Unsigned tokens are only ever allowed in `dev` builds.
    pub fn from_secret(jwt_secret: Option<String>) -> Self {
        Self {
            jwt_secret,
            allow_unsigned: cfg!(feature = "dev"),
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub ledger: Arc<TransferLedger>,
    pub history: Arc<TransferHistory>,
    pub notifications: Arc<dyn NotificationStore>,
    pub store: Arc<dyn LedgerStore>,
    pub queue: Arc<dyn EventQueue>,
    pub auth_config: AuthConfig,
}

impl AppState {
    pub fn new(
        store: RedbStore,
        queue: Arc<dyn EventQueue>,
        lock_wait_timeout: Duration,
        auth_config: AuthConfig,
    ) -> Self {
        let ledger_store: Arc<dyn LedgerStore> = Arc::new(store.clone());
        Self {
            ledger: Arc::new(TransferLedger::new(
                ledger_store.clone(),
                queue.clone(),
                lock_wait_timeout,
            )),
            history: Arc::new(TransferHistory::new(ledger_store.clone())),
            notifications: Arc::new(store),
            store: ledger_store,
            queue,
            auth_config,
        }
    }

    /// State over an in-memory database, for tests.
    #[cfg(test)]
    pub(crate) fn in_memory(auth_config: AuthConfig) -> Self {
        use crate::queue::RedbEventQueue;

        let store = RedbStore::in_memory().expect("in-memory database");
        let queue = Arc::new(RedbEventQueue::new(store.database()));
        Self::new(store, queue, Duration::from_secs(5), auth_config)
    }
}
