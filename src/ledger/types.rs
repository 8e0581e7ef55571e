// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Persisted ledger records.
//!
//! These are the rows the store reads and writes. API-facing shapes live in
//! `crate::models` and are built from these with explicit conversions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Per-user balance row.
///
/// Balances are integer minor units, so a negative balance is not
/// representable. `version` increments on every mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Wallet {
    pub user_id: String,
    pub balance: u64,
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Wallet {
    pub fn open(user_id: impl Into<String>, balance: u64) -> Self {
        let now = Utc::now();
        Self {
            user_id: user_id.into(),
            balance,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Transfer status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TransferStatus {
    #[default]
    Pending,
    Success,
    Failed,
}

impl TransferStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransferStatus::Pending => "pending",
            TransferStatus::Success => "success",
            TransferStatus::Failed => "failed",
        }
    }
}

/// Immutable audit row for one transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferRecord {
    pub id: Uuid,
    pub from_user_id: String,
    pub to_user_id: String,
    pub amount: u64,
    pub status: TransferStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TransferRecord {
    /// A record for a transfer that is being committed in the current
    /// write transaction.
    pub fn committed(from_user_id: &str, to_user_id: &str, amount: u64) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            from_user_id: from_user_id.to_string(),
            to_user_id: to_user_id.to_string(),
            amount,
            status: TransferStatus::Success,
            created_at: now,
            updated_at: now,
        }
    }

    /// Direction of this transfer as seen by `user_id`.
    pub fn direction_for(&self, user_id: &str) -> Option<Direction> {
        if self.from_user_id == user_id {
            Some(Direction::Out)
        } else if self.to_user_id == user_id {
            Some(Direction::In)
        } else {
            None
        }
    }
}

/// Money flow relative to the viewing user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    In,
    Out,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::In => "in",
            Direction::Out => "out",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "in" => Some(Direction::In),
            "out" => Some(Direction::Out),
            _ => None,
        }
    }
}

/// Ordering for history listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    #[default]
    NewestFirst,
    OldestFirst,
}

impl SortOrder {
    /// Parse the `sort` query value. `-created_at` is newest first,
    /// `created_at` oldest first. Anything else falls back to the default.
    pub fn parse(value: Option<&str>) -> Self {
        match value.map(str::trim) {
            Some("created_at") | Some("+created_at") => SortOrder::OldestFirst,
            _ => SortOrder::NewestFirst,
        }
    }
}

/// Normalized page request shared by every list operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    /// Zero-based page index.
    pub page: u32,
    pub limit: u32,
    pub sort: SortOrder,
}

impl PageRequest {
    pub const DEFAULT_LIMIT: u32 = 10;
    pub const MAX_LIMIT: u32 = 100;

    pub fn new(page: Option<u32>, limit: Option<u32>, sort: SortOrder) -> Self {
        let limit = match limit {
            None | Some(0) => Self::DEFAULT_LIMIT,
            Some(l) => l.min(Self::MAX_LIMIT),
        };
        Self {
            page: page.unwrap_or(0),
            limit,
            sort,
        }
    }

    pub fn offset(&self) -> usize {
        self.page as usize * self.limit as usize
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self::new(None, None, SortOrder::default())
    }
}

/// One page of results plus the total number of matching rows.
#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub request: PageRequest,
}
