// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! In-memory store double for unit tests.
//!
//! Mirrors the semantics of [`super::Database`] and counts permission
//! lookups so tests can assert when the permission store was consulted.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::{email_key, PermissionStore, StoreError, StoreResult, TokenStore, UserStore};
use crate::models::{NewUser, Permissions, Scope, TokenHash, TokenRecord, User, UserId};

#[derive(Default)]
pub struct MemoryStore {
    users: Mutex<HashMap<UserId, User>>,
    tokens: Mutex<HashMap<TokenHash, TokenRecord>>,
    permissions: Mutex<HashMap<UserId, Permissions>>,
    next_id: AtomicU64,
    permission_lookups: AtomicUsize,
    fail_permissions: AtomicBool,
    fail_tokens: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `list_codes` calls served so far.
    pub fn permission_lookups(&self) -> usize {
        self.permission_lookups.load(Ordering::SeqCst)
    }

    /// Make every permission lookup fail with a backend error.
    pub fn fail_permissions(&self) {
        self.fail_permissions.store(true, Ordering::SeqCst);
    }

    /// Make every token operation fail with a backend error.
    pub fn fail_tokens(&self) {
        self.fail_tokens.store(true, Ordering::SeqCst);
    }

    /// Every stored token record, for assertions about what was persisted.
    pub fn token_records(&self) -> Vec<TokenRecord> {
        self.tokens.lock().unwrap().values().cloned().collect()
    }

    fn check_tokens(&self) -> StoreResult<()> {
        if self.fail_tokens.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("token table unavailable".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl TokenStore for MemoryStore {
    async fn insert_token(&self, record: TokenRecord) -> StoreResult<()> {
        self.check_tokens()?;
        self.tokens.lock().unwrap().insert(record.hash, record);
        Ok(())
    }

    async fn find_user_by_hash(
        &self,
        hash: TokenHash,
        scope: Scope,
        now: DateTime<Utc>,
    ) -> StoreResult<User> {
        self.check_tokens()?;
        let user_id = {
            let tokens = self.tokens.lock().unwrap();
            match tokens.get(&hash) {
                Some(record) if record.scope == scope && now < record.expiry => record.user_id,
                _ => return Err(StoreError::NotFound),
            }
        };
        self.get_user(user_id).await
    }

    async fn delete_tokens(&self, scope: Scope, user_id: UserId) -> StoreResult<()> {
        self.check_tokens()?;
        self.tokens
            .lock()
            .unwrap()
            .retain(|_, record| !(record.scope == scope && record.user_id == user_id));
        Ok(())
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn insert_user(&self, new_user: NewUser) -> StoreResult<User> {
        let mut users = self.users.lock().unwrap();
        let key = email_key(&new_user.email);
        if users.values().any(|user| email_key(&user.email) == key) {
            return Err(StoreError::DuplicateEmail);
        }
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let user = User {
            id,
            created_at: Utc::now(),
            name: new_user.name,
            email: new_user.email,
            password: new_user.password,
            activated: new_user.activated,
            version: 1,
        };
        users.insert(id, user.clone());
        Ok(user)
    }

    async fn get_user(&self, id: UserId) -> StoreResult<User> {
        self.users
            .lock()
            .unwrap()
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn get_user_by_email(&self, email: &str) -> StoreResult<User> {
        let key = email_key(email);
        self.users
            .lock()
            .unwrap()
            .values()
            .find(|user| email_key(&user.email) == key)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn update_user(&self, user: &User) -> StoreResult<User> {
        let mut users = self.users.lock().unwrap();
        let existing = users.get(&user.id).ok_or(StoreError::NotFound)?;
        if existing.version != user.version {
            return Err(StoreError::EditConflict);
        }
        let updated = User {
            version: existing.version + 1,
            ..user.clone()
        };
        users.insert(updated.id, updated.clone());
        Ok(updated)
    }
}

#[async_trait]
impl PermissionStore for MemoryStore {
    async fn list_codes(&self, user_id: UserId) -> StoreResult<Permissions> {
        self.permission_lookups.fetch_add(1, Ordering::SeqCst);
        if self.fail_permissions.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("permission table unavailable".to_string()));
        }
        Ok(self
            .permissions
            .lock()
            .unwrap()
            .get(&user_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn grant(&self, user_id: UserId, codes: &[&str]) -> StoreResult<()> {
        self.permissions
            .lock()
            .unwrap()
            .entry(user_id)
            .or_default()
            .extend(codes.iter().copied());
        Ok(())
    }
}
