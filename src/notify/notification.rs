// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! In-app notification rows and their store capability.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::ledger::{Page, PageRequest, TransferRecord};
use crate::storage::StoreResult;

/// A notification shown to one user about one transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub id: Uuid,
    pub recipient_user_id: String,
    pub title: String,
    pub content: String,
    pub read: bool,
    pub read_at: Option<DateTime<Utc>>,
    pub related_transfer_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Notification {
    fn new(recipient_user_id: &str, title: String, content: String, transfer_id: Uuid) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            recipient_user_id: recipient_user_id.to_string(),
            title,
            content,
            read: false,
            read_at: None,
            related_transfer_id: transfer_id,
            created_at: now,
            updated_at: now,
        }
    }

    /// Notification for the user who received funds.
    pub fn funds_received(record: &TransferRecord) -> Self {
        Self::new(
            &record.to_user_id,
            "Funds received".to_string(),
            format!("You received {} from {}.", record.amount, record.from_user_id),
            record.id,
        )
    }

    /// Notification for the user who sent funds.
    pub fn funds_sent(record: &TransferRecord) -> Self {
        Self::new(
            &record.from_user_id,
            "Transfer completed".to_string(),
            format!("Your transfer of {} to {} completed.", record.amount, record.to_user_id),
            record.id,
        )
    }

    pub fn mark_read(&mut self) {
        if !self.read {
            let now = Utc::now();
            self.read = true;
            self.read_at = Some(now);
            self.updated_at = now;
        }
    }
}

pub trait NotificationStore: Send + Sync {
    /// Insert `notification` unless one already exists for the same
    /// `(related_transfer_id, recipient_user_id)`. The check and the insert
    /// happen in one write transaction. Returns `true` if inserted.
    fn insert_if_absent(&self, notification: &Notification) -> StoreResult<bool>;

    fn notifications_for(
        &self,
        user_id: &str,
        request: PageRequest,
    ) -> StoreResult<Page<Notification>>;

    /// Mark one of `user_id`'s notifications read. Returns `None` when the
    /// id does not exist or belongs to someone else.
    fn mark_read(&self, user_id: &str, notification_id: Uuid) -> StoreResult<Option<Notification>>;
}
