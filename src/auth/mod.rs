// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Authentication Module
//!
//! Bearer-token authentication for the ledger API.
//!
//! ## Auth Flow
//!
//! 1. The identity provider issues an HS256 JWT whose `sub` is the user id.
//! 2. Clients send `Authorization: Bearer <JWT>`.
//! 3. The `Auth` extractor verifies signature and expiry with
//!    `AUTH_JWT_SECRET` and hands the handler an [`AuthenticatedUser`].
//!
//! ## Security
//!
//! - Every `/v1` endpoint requires authentication; health and docs do not.
//! - `/v1/admin` endpoints additionally require `"role": "admin"`.
//! - Clock skew tolerance is 60 seconds.
//! - Unsigned tokens are accepted only in builds with the `dev` feature and
//!   only when no secret is configured.

pub mod claims;
pub mod error;
pub mod extractor;
pub mod roles;

pub use claims::AuthenticatedUser;
pub use error::AuthError;
pub use extractor::{AdminOnly, Auth};
pub use roles::Role;
