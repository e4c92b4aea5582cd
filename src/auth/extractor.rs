// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Authorization gate as Axum extractors.
//!
//! Each guard implies the ones before it, so a handler names only the
//! strongest requirement it needs:
//!
//! ```rust,ignore
//! async fn show_current_user(Activated(user): Activated) -> Json<UserEnvelope> { ... }
//!
//! async fn show_user(_: Permitted<UsersRead>, Path(id): Path<UserId>) -> ... { ... }
//! ```
//!
//! | Extractor | Rejects with |
//! |-----------|--------------|
//! | [`Authenticated`] | `AuthenticationRequired` for anonymous callers |
//! | [`Activated`] | the above, or `AccountInactive` |
//! | [`Permitted<P>`] | the above, `Forbidden` without `P::CODE`, `Internal` if the lookup fails |
//!
//! Guards only read the bound identity and the permission store.

use std::marker::PhantomData;

use axum::{extract::FromRequestParts, http::request::Parts};
use tracing::error;

use super::AuthError;
use crate::models::{Identity, User, USERS_READ};
use crate::state::AppState;
use crate::storage::PermissionStore;

/// The caller if one is authenticated.
pub fn require_authenticated(identity: &Identity) -> Result<&User, AuthError> {
    identity.user().ok_or(AuthError::AuthenticationRequired)
}

/// The caller if authenticated and activated.
pub fn require_activated(identity: &Identity) -> Result<&User, AuthError> {
    let user = require_authenticated(identity)?;
    if !user.activated {
        return Err(AuthError::AccountInactive);
    }
    Ok(user)
}

/// The caller if activated and granted `code`.
///
/// The permission store is only consulted once the cheaper checks pass.
pub async fn require_permission<'a>(
    permissions: &dyn PermissionStore,
    identity: &'a Identity,
    code: &str,
) -> Result<&'a User, AuthError> {
    let user = require_activated(identity)?;

    let granted = permissions.list_codes(user.id).await.map_err(|e| {
        error!(user_id = user.id, error = %e, "Failed to load permissions");
        AuthError::Internal
    })?;

    if !granted.contains(code) {
        return Err(AuthError::Forbidden);
    }
    Ok(user)
}

fn bound_identity(parts: &Parts) -> Identity {
    parts.extensions.get::<Identity>().cloned().unwrap_or_default()
}

/// Any authenticated caller.
#[derive(Debug, Clone)]
pub struct Authenticated(pub User);

impl<S: Send + Sync> FromRequestParts<S> for Authenticated {
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        require_authenticated(&bound_identity(parts)).cloned().map(Authenticated)
    }
}

/// An authenticated caller with an activated account.
#[derive(Debug, Clone)]
pub struct Activated(pub User);

impl<S: Send + Sync> FromRequestParts<S> for Activated {
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        require_activated(&bound_identity(parts)).cloned().map(Activated)
    }
}

/// A permission code a route can demand through [`Permitted`].
pub trait Permission {
    const CODE: &'static str;
}

/// `users:read`
pub struct UsersRead;

impl Permission for UsersRead {
    const CODE: &'static str = USERS_READ;
}

/// An activated caller holding permission `P`.
pub struct Permitted<P: Permission> {
    pub user: User,
    _permission: PhantomData<P>,
}

impl<P: Permission> Permitted<P> {
    pub fn into_user(self) -> User {
        self.user
    }
}

impl<P: Permission> FromRequestParts<AppState> for Permitted<P> {
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let identity = bound_identity(parts);
        let user = require_permission(state.permissions.as_ref(), &identity, P::CODE).await?;
        Ok(Permitted {
            user: user.clone(),
            _permission: PhantomData,
        })
    }
}
