// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Event Queue
//!
//! Durable, at-least-once delivery of domain events from the transfer ledger
//! to background consumers.
//!
//! ## Delivery Contract
//!
//! 1. `publish` stores the event durably. Publishing the same event id twice
//!    is a no-op.
//! 2. `receive` leases the next visible event and bumps its attempt count.
//!    The lease expires after the visibility timeout; an event whose lease
//!    expires without `ack` becomes visible again, to this consumer or any
//!    other.
//! 3. `ack`, `retry_later` and `dead_letter` settle a lease. A receipt whose
//!    lease has been re-granted is rejected as stale.
//!
//! Ordering across events is not guaranteed.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::futures::Notified;
use uuid::Uuid;

use crate::storage::StoreError;

pub mod redb_queue;

pub use redb_queue::RedbEventQueue;

/// Event type published after a transfer commits.
pub const TRANSFER_COMPLETED: &str = "transfer.completed";

/// A message describing a state change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainEvent {
    pub id: Uuid,
    pub event_type: String,
    /// Transfer id for `transfer.completed`.
    pub payload: String,
    pub enqueued_at: DateTime<Utc>,
    /// Number of times this event has been leased to a consumer.
    pub attempts: u32,
}

impl DomainEvent {
    /// The completion event for `transfer_id`.
    ///
    /// The event id is derived from the transfer id, so republishing for the
    /// same transfer yields the same event.
    pub fn transfer_completed(transfer_id: Uuid) -> Self {
        let name = format!("{TRANSFER_COMPLETED}:{transfer_id}");
        Self {
            id: Uuid::new_v5(&Uuid::NAMESPACE_OID, name.as_bytes()),
            event_type: TRANSFER_COMPLETED.to_string(),
            payload: transfer_id.to_string(),
            enqueued_at: Utc::now(),
            attempts: 0,
        }
    }

    pub fn transfer_id(&self) -> Option<Uuid> {
        Uuid::parse_str(&self.payload).ok()
    }
}

/// Handle for settling one lease on one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Receipt {
    pub event_id: Uuid,
    pub lease_id: Uuid,
}

/// An event handed to a consumer together with its ack handle.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub event: DomainEvent,
    pub receipt: Receipt,
}

/// An event parked after it could not be processed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeadLetter {
    pub event: DomainEvent,
    pub reason: String,
    pub dead_lettered_at: DateTime<Utc>,
}

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("queue store error: {0}")]
    Store(#[from] StoreError),

    #[error("event not found: {0}")]
    NotFound(Uuid),

    #[error("lease on event {0} is no longer held")]
    StaleReceipt(Uuid),
}

pub type QueueResult<T> = Result<T, QueueError>;

#[async_trait]
pub trait EventQueue: Send + Sync {
    async fn publish(&self, event: DomainEvent) -> QueueResult<()>;

    /// Lease the next visible event, if any, for `visibility_timeout`.
    async fn receive(&self, visibility_timeout: Duration) -> QueueResult<Option<Delivery>>;

    /// Remove the event. Acking an event that is already gone succeeds.
    async fn ack(&self, receipt: &Receipt) -> QueueResult<()>;

    /// Release the lease and make the event visible again after `backoff`.
    async fn retry_later(&self, receipt: &Receipt, backoff: Duration, error: &str)
        -> QueueResult<()>;

    /// Move the event to the dead-letter table.
    async fn dead_letter(&self, receipt: &Receipt, reason: &str) -> QueueResult<()>;

    /// Resolves on the next publish, requeue or redrive. Enable it before
    /// polling so a change between the poll and the park still wakes it.
    fn changed(&self) -> Notified<'_>;

    /// Time until the earliest stored event becomes visible. `None` when the
    /// queue holds nothing.
    async fn next_visible_in(&self) -> QueueResult<Option<Duration>>;

    /// Park until the queue changes, the earliest event becomes visible, or
    /// `max_wait` elapses.
    async fn wait(&self, max_wait: Duration) {
        let changed = self.changed();
        tokio::pin!(changed);
        changed.as_mut().enable();
        let park = park_for(self.next_visible_in().await, max_wait);
        let _ = tokio::time::timeout(park, changed).await;
    }

    async fn dead_letters(&self, limit: usize) -> QueueResult<Vec<DeadLetter>>;

    /// Put a dead-lettered event back on the queue with a fresh attempt count.
    async fn redrive(&self, event_id: Uuid) -> QueueResult<()>;
}

/// A consumer's view of the queue: an endless stream of deliveries.
pub struct Subscription {
    queue: Arc<dyn EventQueue>,
    visibility_timeout: Duration,
    idle_wait: Duration,
}

impl Subscription {
    pub fn new(queue: Arc<dyn EventQueue>, visibility_timeout: Duration, idle_wait: Duration) -> Self {
        Self {
            queue,
            visibility_timeout,
            idle_wait,
        }
    }

    /// Wait for the next delivery.
    ///
    /// Between polls the subscription parks until the queue changes or the
    /// earliest requeued event is due, never longer than `idle_wait`.
    pub async fn next(&self) -> QueueResult<Delivery> {
        loop {
            let changed = self.queue.changed();
            tokio::pin!(changed);
            changed.as_mut().enable();

            if let Some(delivery) = self.queue.receive(self.visibility_timeout).await? {
                return Ok(delivery);
            }
            let park = park_for(self.queue.next_visible_in().await, self.idle_wait);
            let _ = tokio::time::timeout(park, changed).await;
        }
    }

    pub fn queue(&self) -> &Arc<dyn EventQueue> {
        &self.queue
    }
}

/// How long to park given the earliest due event, capped at `max_wait`.
/// A failed lookup falls back to `max_wait`.
fn park_for(next_visible: QueueResult<Option<Duration>>, max_wait: Duration) -> Duration {
    match next_visible {
        Ok(Some(due)) => due.min(max_wait),
        Ok(None) => max_wait,
        Err(e) => {
            tracing::warn!(error = %e, "Failed to read queue visibility");
            max_wait
        }
    }
}
