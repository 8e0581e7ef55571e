// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Notification Consumer
//!
//! Reacts to `transfer.completed` events outside the request cycle.
//!
//! ## Per-event lifecycle
//!
//! ```text
//! received -> processing -> acknowledged
//!                        -> requeued       (transient failure, attempts left)
//!                        -> dead-lettered  (permanent failure or attempts exhausted)
//! ```
//!
//! The attempt count is bumped by the queue on every lease, so an event whose
//! earlier leases expired unsettled (a panic, a crash, a slow webhook) is
//! dead-lettered on receipt once it exceeds `max_attempts`.
//!
//! Every side effect is idempotent: notifications are keyed by
//! `(transfer_id, recipient)` and webhooks carry the stable event id, so a
//! redelivered event never produces a second notification.
//!
//! ## Shutdown
//!
//! Stops receiving when the `CancellationToken` fires. An event already being
//! processed is finished and settled first.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::notification::{Notification, NotificationStore};
use super::webhook::{TransferWebhook, WebhookSink};
use crate::ledger::{LedgerStore, TransferRecord, TransferStatus};
use crate::queue::{Delivery, QueueError, Subscription, TRANSFER_COMPLETED};
use crate::storage::{StoreError, StoreResult};

#[derive(Debug, Clone)]
pub struct ConsumerConfig {
    /// Deliveries allowed before an event is dead-lettered.
    pub max_attempts: u32,
    pub base_backoff: Duration,
    pub max_backoff: Duration,
    pub visibility_timeout: Duration,
    /// Longest park between polls when the queue is idle.
    pub idle_wait: Duration,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(60),
            visibility_timeout: Duration::from_secs(30),
            idle_wait: Duration::from_secs(5),
        }
    }
}

impl ConsumerConfig {
    /// `base * 2^(attempt - 1)`, capped at `max_backoff`.
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.base_backoff
            .checked_mul(1u32 << exponent)
            .unwrap_or(self.max_backoff)
            .min(self.max_backoff)
    }
}

/// What to do with a delivery after processing.
#[derive(Debug, PartialEq, Eq)]
enum Outcome {
    Ack,
    Retry(String),
    DeadLetter(String),
}

pub struct NotificationConsumer {
    name: String,
    ledger: Arc<dyn LedgerStore>,
    notifications: Arc<dyn NotificationStore>,
    webhook: Arc<dyn WebhookSink>,
    subscription: Subscription,
    config: ConsumerConfig,
}

impl NotificationConsumer {
    pub fn new(
        name: impl Into<String>,
        ledger: Arc<dyn LedgerStore>,
        notifications: Arc<dyn NotificationStore>,
        webhook: Arc<dyn WebhookSink>,
        subscription: Subscription,
        config: ConsumerConfig,
    ) -> Self {
        Self {
            name: name.into(),
            ledger,
            notifications,
            webhook,
            subscription,
            config,
        }
    }

    /// Consume until `shutdown` fires.
    pub async fn run(&self, shutdown: CancellationToken) {
        info!(consumer = %self.name, "Notification consumer starting");

        loop {
            let next = tokio::select! {
                _ = shutdown.cancelled() => break,
                next = self.subscription.next() => next,
            };

            match next {
                Ok(delivery) => self.handle(delivery).await,
                Err(e) => {
                    error!(consumer = %self.name, error = %e, "Failed to receive from queue");
                    tokio::select! {
                        _ = tokio::time::sleep(self.config.idle_wait) => {},
                        _ = shutdown.cancelled() => break,
                    }
                }
            }
        }

        info!(consumer = %self.name, "Notification consumer shutting down");
    }

    /// Process one delivery and settle it on the queue.
    pub async fn handle(&self, delivery: Delivery) {
        let event = &delivery.event;
        debug!(
            consumer = %self.name,
            event_id = %event.id,
            attempt = event.attempts,
            "Processing event"
        );

        let outcome = if event.attempts > self.config.max_attempts {
            Outcome::DeadLetter(format!(
                "exceeded {} attempts without settling",
                self.config.max_attempts
            ))
        } else {
            self.process(&delivery).await
        };
        let queue = self.subscription.queue();
        let receipt = &delivery.receipt;

        let settled = match outcome {
            Outcome::Ack => queue.ack(receipt).await,
            Outcome::DeadLetter(reason) => {
                error!(event_id = %event.id, %reason, "Dead-lettering event");
                queue.dead_letter(receipt, &reason).await
            }
            Outcome::Retry(reason) if event.attempts >= self.config.max_attempts => {
                let reason = format!("gave up after {} attempts: {reason}", event.attempts);
                error!(event_id = %event.id, %reason, "Dead-lettering event");
                queue.dead_letter(receipt, &reason).await
            }
            Outcome::Retry(reason) => {
                let backoff = self.config.backoff_for(event.attempts);
                warn!(
                    event_id = %event.id,
                    attempt = event.attempts,
                    backoff_ms = backoff.as_millis() as u64,
                    %reason,
                    "Event processing failed, requeueing"
                );
                queue.retry_later(receipt, backoff, &reason).await
            }
        };

        match settled {
            Ok(()) => {}
            Err(QueueError::StaleReceipt(event_id)) => {
                warn!(%event_id, "Lease expired before settlement; event will be redelivered");
            }
            Err(e) => error!(event_id = %event.id, error = %e, "Failed to settle event"),
        }
    }

    async fn process(&self, delivery: &Delivery) -> Outcome {
        let event = &delivery.event;
        if event.event_type != TRANSFER_COMPLETED {
            return Outcome::DeadLetter(format!("unknown event type {:?}", event.event_type));
        }
        let Some(transfer_id) = event.transfer_id() else {
            return Outcome::DeadLetter(format!("malformed payload {:?}", event.payload));
        };

        let ledger = self.ledger.clone();
        let record = match blocking(move || ledger.transfer(transfer_id)).await {
            Ok(Some(record)) => record,
            Ok(None) => return Outcome::DeadLetter(format!("transfer {transfer_id} not found")),
            Err(e) => return Outcome::Retry(format!("loading transfer: {e}")),
        };

        // The event reached the queue, so the outbox marker is done with even
        // if the publisher failed to clear it.
        let ledger = self.ledger.clone();
        if let Err(e) = blocking(move || ledger.mark_published(transfer_id)).await {
            warn!(%transfer_id, error = %e, "Failed to clear outbox marker");
        }

        if record.status != TransferStatus::Success {
            return Outcome::DeadLetter(format!(
                "transfer {transfer_id} is {}",
                record.status.as_str()
            ));
        }

        if let Err(e) = self.notify_parties(&record).await {
            return Outcome::Retry(format!("storing notification: {e}"));
        }

        let payload = TransferWebhook::new(event.id, &event.event_type, &record);
        match self.webhook.deliver(&payload).await {
            Ok(()) => Outcome::Ack,
            Err(e) if e.is_permanent() => Outcome::DeadLetter(e.to_string()),
            Err(e) => Outcome::Retry(e.to_string()),
        }
    }

    async fn notify_parties(&self, record: &TransferRecord) -> StoreResult<()> {
        for notification in [
            Notification::funds_received(record),
            Notification::funds_sent(record),
        ] {
            let store = self.notifications.clone();
            let recipient = notification.recipient_user_id.clone();
            let inserted = blocking(move || store.insert_if_absent(&notification)).await?;
            if inserted {
                info!(transfer_id = %record.id, recipient = %recipient, "Notification created");
            } else {
                debug!(transfer_id = %record.id, recipient = %recipient, "Notification already exists");
            }
        }
        Ok(())
    }
}

async fn blocking<T, F>(f: F) -> StoreResult<T>
where
    F: FnOnce() -> StoreResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| StoreError::Join(e.to_string()))?
}
