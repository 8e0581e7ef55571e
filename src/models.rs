// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # API Data Models
//!
//! Request and response types for the REST API. Responses are wrapped in
//! [`Envelope`]; failures use the `{"status":"fail","message":...}` body
//! produced by [`crate::error::ApiError`].
//!
//! Storage types in [`crate::ledger`] and [`crate::notify`] never reach the
//! wire directly; each has an explicit view type here.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::ledger::{Direction, Page, PageRequest, SortOrder, TransferRecord};
use crate::notify::Notification;
use crate::queue::DeadLetter;

// =============================================================================
// Envelope
// =============================================================================

/// Success wrapper for every API response.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct Envelope<T> {
    /// Always `"success"`.
    pub status: &'static str,
    pub data: T,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<ListMeta>,
}

impl<T> Envelope<T> {
    pub fn success(data: T) -> Self {
        Self {
            status: "success",
            data,
            meta: None,
        }
    }
}

impl<T> Envelope<Vec<T>> {
    /// Wrap one page of a listing, converting each item.
    pub fn page<S>(page: Page<S>) -> Self
    where
        T: From<S>,
    {
        let meta = ListMeta {
            total: page.total,
            num: page.items.len(),
            page: page.request.page,
            limit: page.request.limit,
        };
        Self {
            status: "success",
            data: page.items.into_iter().map(T::from).collect(),
            meta: Some(meta),
        }
    }
}

/// Pagination metadata for list responses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct ListMeta {
    /// Number of matching rows across all pages.
    pub total: u64,
    /// Number of rows in this page.
    pub num: usize,
    /// Zero-based page index.
    pub page: u32,
    pub limit: u32,
}

/// Query parameters shared by list endpoints.
#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct ListQuery {
    /// Zero-based page index.
    #[param(default = 0)]
    pub page: Option<u32>,
    /// Page size, 1 to 100.
    #[param(default = 10)]
    pub limit: Option<u32>,
    /// `-created_at` (newest first) or `created_at` (oldest first).
    #[param(default = "-created_at")]
    pub sort: Option<String>,
}

impl ListQuery {
    pub fn page_request(&self) -> PageRequest {
        PageRequest::new(
            self.page,
            self.limit,
            SortOrder::parse(self.sort.as_deref()),
        )
    }
}

// =============================================================================
// Transfers
// =============================================================================

/// Request to move funds from the caller's wallet.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TransferRequest {
    pub to_user_id: String,
    /// Amount in minor units. Must be greater than zero.
    pub amount: i64,
}

/// A committed transfer.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TransferView {
    pub id: Uuid,
    pub from_user_id: String,
    pub to_user_id: String,
    pub amount: u64,
    /// `pending`, `success` or `failed`.
    pub status: String,
    pub created_at: DateTime<Utc>,
}

impl From<TransferRecord> for TransferView {
    fn from(record: TransferRecord) -> Self {
        Self {
            id: record.id,
            status: record.status.as_str().to_string(),
            from_user_id: record.from_user_id,
            to_user_id: record.to_user_id,
            amount: record.amount,
            created_at: record.created_at,
        }
    }
}

/// A transfer as seen by one of its parties.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TransferHistoryItem {
    pub id: Uuid,
    /// `in` when the caller received the funds, `out` when they sent them.
    pub direction: String,
    /// The other party.
    pub counterparty_user_id: String,
    pub from_user_id: String,
    pub to_user_id: String,
    pub amount: u64,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

impl From<(TransferRecord, Direction)> for TransferHistoryItem {
    fn from((record, direction): (TransferRecord, Direction)) -> Self {
        let counterparty_user_id = match direction {
            Direction::In => record.from_user_id.clone(),
            Direction::Out => record.to_user_id.clone(),
        };
        Self {
            id: record.id,
            direction: direction.as_str().to_string(),
            counterparty_user_id,
            status: record.status.as_str().to_string(),
            from_user_id: record.from_user_id,
            to_user_id: record.to_user_id,
            amount: record.amount,
            created_at: record.created_at,
        }
    }
}

// =============================================================================
// Notifications
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct NotificationView {
    pub id: Uuid,
    pub title: String,
    pub content: String,
    pub read: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub read_at: Option<DateTime<Utc>>,
    pub related_transfer_id: Uuid,
    pub created_at: DateTime<Utc>,
}

impl From<Notification> for NotificationView {
    fn from(notification: Notification) -> Self {
        Self {
            id: notification.id,
            title: notification.title,
            content: notification.content,
            read: notification.read,
            read_at: notification.read_at,
            related_transfer_id: notification.related_transfer_id,
            created_at: notification.created_at,
        }
    }
}

// =============================================================================
// Admin
// =============================================================================

/// Query for the dead-letter listing.
#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct DeadLetterQuery {
    /// Maximum rows returned, 1 to 500.
    #[param(default = 50)]
    pub limit: Option<usize>,
}

impl DeadLetterQuery {
    pub const DEFAULT_LIMIT: usize = 50;
    pub const MAX_LIMIT: usize = 500;

    pub fn limit(&self) -> usize {
        self.limit
            .unwrap_or(Self::DEFAULT_LIMIT)
            .clamp(1, Self::MAX_LIMIT)
    }
}

/// An event parked after processing gave up on it.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct DeadLetterView {
    pub event_id: Uuid,
    pub event_type: String,
    pub payload: String,
    /// Deliveries made before the event was parked.
    pub attempts: u32,
    pub reason: String,
    pub enqueued_at: DateTime<Utc>,
    pub dead_lettered_at: DateTime<Utc>,
}

impl From<DeadLetter> for DeadLetterView {
    fn from(letter: DeadLetter) -> Self {
        Self {
            event_id: letter.event.id,
            event_type: letter.event.event_type,
            payload: letter.event.payload,
            attempts: letter.event.attempts,
            reason: letter.reason,
            enqueued_at: letter.event.enqueued_at,
            dead_lettered_at: letter.dead_lettered_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RedriveView {
    pub event_id: Uuid,
}
