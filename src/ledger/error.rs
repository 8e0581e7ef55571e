// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Transfer ledger error taxonomy.

use std::time::Duration;

use crate::storage::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    // === Validation (rejected before any store access) ===
    #[error("amount must be greater than zero")]
    InvalidAmount,

    #[error("cannot transfer to the same account")]
    SameAccountTransfer,

    // === Business rules (detected inside the transaction, rolled back) ===
    #[error("sender wallet not found: {0}")]
    SenderNotFound(String),

    #[error("recipient not found: {0}")]
    RecipientNotFound(String),

    #[error("insufficient balance: available {available}, requested {requested}")]
    InsufficientBalance { available: u64, requested: u64 },

    #[error("credit would overflow the recipient balance")]
    BalanceOverflow,

    // === Infrastructure (rolled back, safe to retry) ===
    #[error("timed out after {0:?} waiting for wallet lock")]
    LockTimeout(Duration),

    #[error("persistence failure: {0}")]
    Persistence(#[from] StoreError),

    #[error("transfer task aborted: {0}")]
    TaskAborted(String),
}

impl LedgerError {
    /// Validation and business-rule failures are the caller's to fix;
    /// everything else is an infrastructure failure that left no trace.
    pub fn is_persistence_failure(&self) -> bool {
        matches!(
            self,
            LedgerError::LockTimeout(_) | LedgerError::Persistence(_) | LedgerError::TaskAborted(_)
        )
    }
}

pub type LedgerResult<T> = Result<T, LedgerError>;
