// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Funds Transfer Ledger
//!
//! Wallet balances, the transfer log and the rules for moving funds between
//! them. Persistence is reached through [`LedgerStore`]; completion events go
//! out through [`crate::queue::EventQueue`].

pub mod error;
pub mod history;
pub mod locks;
pub mod store;
pub mod transfer;
pub mod types;

pub use error::{LedgerError, LedgerResult};
pub use history::TransferHistory;
pub use locks::WalletLocks;
pub use store::LedgerStore;
pub use transfer::TransferLedger;
pub use types::{
    Direction, Page, PageRequest, SortOrder, TransferRecord, TransferStatus, Wallet,
};
