// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Storage Module
//!
//! The request core reaches persistence only through the traits defined
//! here. [`Database`] implements all of them on a single embedded redb file.
//!
//! ## Contracts
//!
//! - [`TokenStore`]: insert a token record, resolve a hash to its owning user,
//!   delete every token of one scope for one user
//! - [`UserStore`]: register, look up and version-checked update of accounts
//! - [`PermissionStore`]: list and grant permission codes
//!
//! Every call is bounded by the configured store timeout and reports
//! [`StoreError::Timeout`] when the bound is exceeded.

pub mod database;
#[cfg(test)]
pub mod memory;

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::models::{NewUser, Permissions, Scope, TokenHash, TokenRecord, User, UserId};

pub use database::Database;

/// Error type for storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("record not found")]
    NotFound,

    #[error("a user with this email address already exists")]
    DuplicateEmail,

    #[error("record was modified concurrently")]
    EditConflict,

    #[error("storage call timed out after {0:?}")]
    Timeout(Duration),

    #[error("storage backend error: {0}")]
    Backend(String),
}

/// Result type for storage operations.
pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait TokenStore: Send + Sync {
    async fn insert_token(&self, record: TokenRecord) -> StoreResult<()>;

    /// Owner of the token with this hash, provided the token was minted for
    /// `scope` and `now` is before its expiry. Every other case is
    /// [`StoreError::NotFound`].
    async fn find_user_by_hash(
        &self,
        hash: TokenHash,
        scope: Scope,
        now: DateTime<Utc>,
    ) -> StoreResult<User>;

    async fn delete_tokens(&self, scope: Scope, user_id: UserId) -> StoreResult<()>;
}

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn insert_user(&self, user: NewUser) -> StoreResult<User>;

    async fn get_user(&self, id: UserId) -> StoreResult<User>;

    async fn get_user_by_email(&self, email: &str) -> StoreResult<User>;

    /// Persist `user` if its version still matches the stored one.
    /// Returns the stored user with the bumped version.
    async fn update_user(&self, user: &User) -> StoreResult<User>;
}

#[async_trait]
pub trait PermissionStore: Send + Sync {
    async fn list_codes(&self, user_id: UserId) -> StoreResult<Permissions>;

    async fn grant(&self, user_id: UserId, codes: &[&str]) -> StoreResult<()>;
}

/// Lowercased lookup key for an email address.
pub(crate) fn email_key(email: &str) -> String {
    email.trim().to_lowercase()
}
