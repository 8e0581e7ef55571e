// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Outbox Reconciler
//!
//! Every committed transfer leaves an outbox marker that the ledger clears
//! once `transfer.completed` is published. If the process dies between commit
//! and publication, or the queue rejects the publish, the marker stays.
//!
//! Every `interval` the reconciler republishes the event for each marker
//! older than `grace`. Event ids are derived from the transfer id, so a
//! republish that races the ledger's own publish is absorbed by the queue.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::ledger::transfer::publish_completion;
use crate::ledger::LedgerStore;
use crate::queue::EventQueue;

/// Markers younger than this are assumed to be mid-publication.
pub const DEFAULT_GRACE: Duration = Duration::from_secs(30);

const BATCH_SIZE: usize = 256;

pub struct Reconciler {
    store: Arc<dyn LedgerStore>,
    queue: Arc<dyn EventQueue>,
    interval: Duration,
    grace: Duration,
}

impl Reconciler {
    pub fn new(store: Arc<dyn LedgerStore>, queue: Arc<dyn EventQueue>, interval: Duration) -> Self {
        Self {
            store,
            queue,
            interval,
            grace: DEFAULT_GRACE,
        }
    }

    pub fn with_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    pub async fn run(self, shutdown: CancellationToken) {
        info!(interval_secs = self.interval.as_secs(), "Outbox reconciler starting");

        loop {
            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {},
                _ = shutdown.cancelled() => {
                    info!("Outbox reconciler shutting down");
                    return;
                }
            }

            self.sweep().await;
        }
    }

    /// Republish every stale marker. Returns how many were published.
    pub async fn sweep(&self) -> usize {
        let grace = chrono::Duration::from_std(self.grace).unwrap_or(chrono::Duration::zero());
        let cutoff = Utc::now() - grace;

        let store = self.store.clone();
        let pending = match tokio::task::spawn_blocking(move || {
            store.unpublished_before(cutoff, BATCH_SIZE)
        })
        .await
        {
            Ok(Ok(ids)) => ids,
            Ok(Err(e)) => {
                warn!(error = %e, "Outbox scan failed");
                return 0;
            }
            Err(e) => {
                warn!(error = %e, "Outbox scan task failed");
                return 0;
            }
        };

        if pending.is_empty() {
            return 0;
        }

        let mut published = 0;
        for transfer_id in &pending {
            if publish_completion(self.store.as_ref(), self.queue.as_ref(), *transfer_id).await {
                published += 1;
            }
        }

        info!(
            pending = pending.len(),
            published,
            "Republished events for unpublished transfers"
        );
        published
    }
}
