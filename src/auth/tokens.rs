// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Scoped bearer token lifecycle: mint, resolve, revoke.
//!
//! ## Token Format
//!
//! A token is 16 bytes from the system CSPRNG, encoded as unpadded URL-safe
//! base64 (22 characters). Only the SHA-256 of that string is persisted.
//!
//! ## Lookup Failures
//!
//! An unknown token, an expired token and a token of the wrong scope all
//! resolve to [`TokenError::NotFound`]. Callers cannot tell them apart.

use std::sync::Arc;
use std::time::Duration;

use base64ct::{Base64UrlUnpadded, Encoding};
use chrono::{DateTime, TimeDelta, Utc};
use ring::rand::{SecureRandom, SystemRandom};

use crate::models::{Scope, Token, TokenHash, TokenRecord, User, UserId};
use crate::storage::{StoreError, TokenStore};

/// Number of random bytes behind every token.
const TOKEN_ENTROPY_BYTES: usize = 16;

/// Length of the encoded plaintext handed to clients.
pub const TOKEN_PLAINTEXT_LEN: usize = 22;

/// Lifetime of the activation token sent after registration.
pub const ACTIVATION_TTL: Duration = Duration::from_secs(72 * 60 * 60);

/// Lifetime of an authentication (session) token.
pub const AUTHENTICATION_TTL: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("secure random source unavailable")]
    Generation,

    #[error("token storage failed: {0}")]
    Persistence(#[source] StoreError),

    #[error("no matching unexpired token")]
    NotFound,
}

/// Mints, resolves and revokes tokens against a [`TokenStore`].
#[derive(Clone)]
pub struct TokenManager {
    store: Arc<dyn TokenStore>,
    rng: SystemRandom,
}

impl TokenManager {
    pub fn new(store: Arc<dyn TokenStore>) -> Self {
        Self {
            store,
            rng: SystemRandom::new(),
        }
    }

    /// Create and persist a token for `user_id`, valid for `ttl` from now.
    ///
    /// The returned [`Token`] is the only place the plaintext ever exists.
    pub async fn mint(&self, user_id: UserId, ttl: Duration, scope: Scope) -> Result<Token, TokenError> {
        self.mint_at(user_id, ttl, scope, Utc::now()).await
    }

    /// [`mint`](Self::mint) with an explicit issue time.
    pub async fn mint_at(
        &self,
        user_id: UserId,
        ttl: Duration,
        scope: Scope,
        now: DateTime<Utc>,
    ) -> Result<Token, TokenError> {
        let token = self.generate(user_id, expiry_after(now, ttl), scope)?;

        self.store
            .insert_token(TokenRecord::from(&token))
            .await
            .map_err(TokenError::Persistence)?;

        tracing::debug!(user_id, scope = %scope, expiry = %token.expiry, "Minted token");
        Ok(token)
    }

    /// Owner of `plaintext`, if it is an unexpired token of `scope`.
    pub async fn resolve_user(&self, scope: Scope, plaintext: &str) -> Result<User, TokenError> {
        self.resolve_user_at(scope, plaintext, Utc::now()).await
    }

    /// [`resolve_user`](Self::resolve_user) evaluated at `now`.
    pub async fn resolve_user_at(
        &self,
        scope: Scope,
        plaintext: &str,
        now: DateTime<Utc>,
    ) -> Result<User, TokenError> {
        let hash = TokenHash::of(plaintext);
        match self.store.find_user_by_hash(hash, scope, now).await {
            Ok(user) => Ok(user),
            Err(StoreError::NotFound) => Err(TokenError::NotFound),
            Err(e) => Err(TokenError::Persistence(e)),
        }
    }

    /// Delete every `scope` token belonging to `user_id`.
    pub async fn revoke_all(&self, scope: Scope, user_id: UserId) -> Result<(), TokenError> {
        self.store
            .delete_tokens(scope, user_id)
            .await
            .map_err(TokenError::Persistence)?;

        tracing::debug!(user_id, scope = %scope, "Revoked tokens");
        Ok(())
    }

    fn generate(&self, user_id: UserId, expiry: DateTime<Utc>, scope: Scope) -> Result<Token, TokenError> {
        let mut random = [0u8; TOKEN_ENTROPY_BYTES];
        self.rng.fill(&mut random).map_err(|_| TokenError::Generation)?;

        let plaintext = Base64UrlUnpadded::encode_string(&random);
        let hash = TokenHash::of(&plaintext);

        Ok(Token {
            plaintext,
            hash,
            user_id,
            expiry,
            scope,
        })
    }
}

/// `now + ttl`, saturating at the latest representable instant.
fn expiry_after(now: DateTime<Utc>, ttl: Duration) -> DateTime<Utc> {
    TimeDelta::from_std(ttl)
        .ok()
        .and_then(|ttl| now.checked_add_signed(ttl))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}
