// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Core Data Models
//!
//! Identity, token and permission types shared by the request pipeline,
//! the storage layer and the HTTP handlers.
//!
//! ## Model Categories
//!
//! - **Users**: persisted accounts and the [`Identity`] bound to each request
//! - **Tokens**: scoped bearer credentials; only their hash is ever stored
//! - **Permissions**: per-user capability codes checked by the permission gate
//! - **API envelopes**: request/response bodies for the user and token endpoints

use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use utoipa::ToSchema;

use crate::auth::password::Password;

/// Numeric user identifier assigned by the user store.
pub type UserId = u64;

// =============================================================================
// Users
// =============================================================================

/// A persisted user account.
///
/// The password is held only as a salted hash. `version` is bumped by the
/// store on every successful update and must match on write.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct User {
    pub id: UserId,
    pub created_at: DateTime<Utc>,
    pub name: String,
    pub email: String,
    pub password: Password,
    pub activated: bool,
    pub version: u32,
}

/// Fields needed to register a new user. The store assigns id and version.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub password: Password,
    pub activated: bool,
}

/// The caller bound to a request by the identity resolver.
///
/// `Anonymous` is the single sentinel for "no credential presented". It
/// carries no data and can never compare equal to a persisted user.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Identity {
    #[default]
    Anonymous,
    User(User),
}

impl Identity {
    pub fn user(&self) -> Option<&User> {
        match self {
            Identity::Anonymous => None,
            Identity::User(user) => Some(user),
        }
    }
}

// =============================================================================
// Tokens
// =============================================================================

/// Purpose a token was minted for. A token only resolves under its own scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    Activation,
    Authentication,
}

impl Scope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scope::Activation => "activation",
            Scope::Authentication => "authentication",
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// SHA-256 digest of a token plaintext. This is the only form that is stored.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct TokenHash([u8; 32]);

impl TokenHash {
    pub fn of(plaintext: &str) -> Self {
        Self(Sha256::digest(plaintext.as_bytes()).into())
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Debug for TokenHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TokenHash(")?;
        for byte in &self.0[..4] {
            write!(f, "{byte:02x}")?;
        }
        write!(f, "…)")
    }
}

/// A freshly minted token.
///
/// `plaintext` exists only in this value, handed back to the caller once.
/// The `Debug` output redacts it so it cannot leak through logs.
#[derive(Clone)]
pub struct Token {
    pub plaintext: String,
    pub hash: TokenHash,
    pub user_id: UserId,
    pub expiry: DateTime<Utc>,
    pub scope: Scope,
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Token")
            .field("plaintext", &"<redacted>")
            .field("hash", &self.hash)
            .field("user_id", &self.user_id)
            .field("expiry", &self.expiry)
            .field("scope", &self.scope)
            .finish()
    }
}

/// The persisted form of a token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenRecord {
    pub hash: TokenHash,
    pub user_id: UserId,
    pub expiry: DateTime<Utc>,
    pub scope: Scope,
}

impl From<&Token> for TokenRecord {
    fn from(token: &Token) -> Self {
        Self {
            hash: token.hash,
            user_id: token.user_id,
            expiry: token.expiry,
            scope: token.scope,
        }
    }
}

// =============================================================================
// Permissions
// =============================================================================

/// Permission code allowing a caller to read other users' profiles.
pub const USERS_READ: &str = "users:read";

/// Unordered set of permission codes granted to a user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permissions(BTreeSet<String>);

impl Permissions {
    pub fn contains(&self, code: &str) -> bool {
        self.0.contains(code)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn extend<I, S>(&mut self, codes: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.0.extend(codes.into_iter().map(Into::into));
    }
}

impl<S: Into<String>> FromIterator<S> for Permissions {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

// =============================================================================
// API Envelopes
// =============================================================================

/// Public view of a user. Never includes the password hash.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct UserResponse {
    pub id: UserId,
    pub created_at: DateTime<Utc>,
    pub name: String,
    pub email: String,
    pub activated: bool,
}

impl From<&User> for UserResponse {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            created_at: user.created_at,
            name: user.name.clone(),
            email: user.email.clone(),
            activated: user.activated,
        }
    }
}

/// `{"user": {...}}`
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct UserEnvelope {
    pub user: UserResponse,
}

/// Body for `POST /v1/users`.
#[derive(Debug, Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct RegisterUserRequest {
    pub name: String,
    pub email: String,
    pub password: String,
}

/// Body for `PUT /v1/users/activated`.
#[derive(Debug, Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct ActivateUserRequest {
    pub token: String,
}

/// Body for `POST /v1/tokens/authentication`.
#[derive(Debug, Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct CreateTokenRequest {
    pub email: String,
    pub password: String,
}

/// A token as returned to its owner: plaintext plus expiry.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct TokenResponse {
    pub token: String,
    pub expiry: DateTime<Utc>,
}

impl From<Token> for TokenResponse {
    fn from(token: Token) -> Self {
        Self {
            token: token.plaintext,
            expiry: token.expiry,
        }
    }
}

/// `{"authentication_token": {...}}`
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct TokenEnvelope {
    pub authentication_token: TokenResponse,
}
