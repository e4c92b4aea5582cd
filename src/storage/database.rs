// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Embedded user/token/permission database backed by redb (pure Rust, ACID).
//!
//! ## Table Layout
//!
//! - `users`: user id → serialized [`User`]
//! - `users_by_email`: lowercased email → user id
//! - `tokens`: SHA-256 token hash → serialized token record
//! - `permissions`: user id → serialized permission code list
//! - `sequences`: name → last issued id
//!
//! Token plaintexts never reach this module; the `tokens` table is keyed by
//! the hash alone.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redb::{Database as Redb, ReadableDatabase, ReadableTable, TableDefinition};
use serde::{Deserialize, Serialize};

use super::{
    email_key, PermissionStore, StoreError, StoreResult, TokenStore, UserStore,
};
use crate::models::{NewUser, Permissions, Scope, TokenHash, TokenRecord, User, UserId};

// =============================================================================
// Table Definitions
// =============================================================================

const USERS: TableDefinition<u64, &[u8]> = TableDefinition::new("users");

const USERS_BY_EMAIL: TableDefinition<&str, u64> = TableDefinition::new("users_by_email");

const TOKENS: TableDefinition<&[u8], &[u8]> = TableDefinition::new("tokens");

const PERMISSIONS: TableDefinition<u64, &[u8]> = TableDefinition::new("permissions");

const SEQUENCES: TableDefinition<&str, u64> = TableDefinition::new("sequences");

const USER_SEQUENCE: &str = "users";

// =============================================================================
// Error Mapping
// =============================================================================

macro_rules! backend_error {
    ($($source:ty),* $(,)?) => {
        $(
            impl From<$source> for StoreError {
                fn from(e: $source) -> Self {
                    StoreError::Backend(e.to_string())
                }
            }
        )*
    };
}

backend_error!(
    redb::Error,
    redb::DatabaseError,
    redb::TransactionError,
    redb::TableError,
    redb::StorageError,
    redb::CommitError,
    serde_json::Error,
);

/// Token row as stored under its hash.
#[derive(Debug, Serialize, Deserialize)]
struct StoredToken {
    user_id: UserId,
    expiry: DateTime<Utc>,
    scope: Scope,
}

// =============================================================================
// Database
// =============================================================================

/// redb-backed implementation of every storage trait.
///
/// redb is synchronous, so each call runs on the blocking pool. A caller that
/// stops waiting (timeout, dropped request) does not abort a write that has
/// already started.
#[derive(Clone)]
pub struct Database {
    db: Arc<Redb>,
    timeout: Duration,
}

impl Database {
    /// Open (or create) the database at the given path.
    pub fn open(path: &Path, timeout: Duration) -> StoreResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| StoreError::Backend(e.to_string()))?;
        }
        let db = Redb::create(path)?;

        // Pre-create all tables so later read transactions don't fail
        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(USERS)?;
            let _ = write_txn.open_table(USERS_BY_EMAIL)?;
            let _ = write_txn.open_table(TOKENS)?;
            let _ = write_txn.open_table(PERMISSIONS)?;
            let _ = write_txn.open_table(SEQUENCES)?;
        }
        write_txn.commit()?;

        Ok(Self {
            db: Arc::new(db),
            timeout,
        })
    }

    /// Run `op` on the blocking pool, bounded by the store timeout.
    async fn run<T, F>(&self, op: F) -> StoreResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&Redb) -> StoreResult<T> + Send + 'static,
    {
        let db = Arc::clone(&self.db);
        let task = tokio::task::spawn_blocking(move || op(&db));

        match tokio::time::timeout(self.timeout, task).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_error)) => Err(StoreError::Backend(format!(
                "storage task failed: {join_error}"
            ))),
            Err(_) => Err(StoreError::Timeout(self.timeout)),
        }
    }
}

fn read_user(db: &Redb, id: UserId) -> StoreResult<User> {
    let read_txn = db.begin_read()?;
    let table = read_txn.open_table(USERS)?;
    let value = table.get(id)?.ok_or(StoreError::NotFound)?;
    let user = serde_json::from_slice(value.value())?;
    Ok(user)
}

// =============================================================================
// Tokens
// =============================================================================

#[async_trait]
impl TokenStore for Database {
    async fn insert_token(&self, record: TokenRecord) -> StoreResult<()> {
        self.run(move |db| {
            let stored = StoredToken {
                user_id: record.user_id,
                expiry: record.expiry,
                scope: record.scope,
            };
            let json = serde_json::to_vec(&stored)?;

            let write_txn = db.begin_write()?;
            {
                let mut table = write_txn.open_table(TOKENS)?;
                table.insert(record.hash.as_bytes().as_slice(), json.as_slice())?;
            }
            write_txn.commit()?;
            Ok(())
        })
        .await
    }

    async fn find_user_by_hash(
        &self,
        hash: TokenHash,
        scope: Scope,
        now: DateTime<Utc>,
    ) -> StoreResult<User> {
        self.run(move |db| {
            let stored: StoredToken = {
                let read_txn = db.begin_read()?;
                let table = read_txn.open_table(TOKENS)?;
                let value = table
                    .get(hash.as_bytes().as_slice())?
                    .ok_or(StoreError::NotFound)?;
                serde_json::from_slice(value.value())?
            };

            if stored.scope != scope || now >= stored.expiry {
                return Err(StoreError::NotFound);
            }
            read_user(db, stored.user_id)
        })
        .await
    }

    async fn delete_tokens(&self, scope: Scope, user_id: UserId) -> StoreResult<()> {
        self.run(move |db| {
            let write_txn = db.begin_write()?;
            {
                let mut table = write_txn.open_table(TOKENS)?;

                let mut doomed = Vec::new();
                for entry in table.iter()? {
                    let (key, value) = entry?;
                    let stored: StoredToken = serde_json::from_slice(value.value())?;
                    if stored.scope == scope && stored.user_id == user_id {
                        doomed.push(key.value().to_vec());
                    }
                }

                for key in &doomed {
                    table.remove(key.as_slice())?;
                }
            }
            write_txn.commit()?;
            Ok(())
        })
        .await
    }
}

// =============================================================================
// Users
// =============================================================================

#[async_trait]
impl UserStore for Database {
    async fn insert_user(&self, new_user: NewUser) -> StoreResult<User> {
        self.run(move |db| {
            let key = email_key(&new_user.email);

            let write_txn = db.begin_write()?;
            let user = {
                let mut by_email = write_txn.open_table(USERS_BY_EMAIL)?;
                if by_email.get(key.as_str())?.is_some() {
                    return Err(StoreError::DuplicateEmail);
                }

                let mut sequences = write_txn.open_table(SEQUENCES)?;
                let id = sequences
                    .get(USER_SEQUENCE)?
                    .map(|last| last.value())
                    .unwrap_or(0)
                    + 1;
                sequences.insert(USER_SEQUENCE, id)?;

                let user = User {
                    id,
                    created_at: Utc::now(),
                    name: new_user.name,
                    email: new_user.email,
                    password: new_user.password,
                    activated: new_user.activated,
                    version: 1,
                };
                let json = serde_json::to_vec(&user)?;

                let mut users = write_txn.open_table(USERS)?;
                users.insert(id, json.as_slice())?;
                by_email.insert(key.as_str(), id)?;
                user
            };
            write_txn.commit()?;
            Ok(user)
        })
        .await
    }

    async fn get_user(&self, id: UserId) -> StoreResult<User> {
        self.run(move |db| read_user(db, id)).await
    }

    async fn get_user_by_email(&self, email: &str) -> StoreResult<User> {
        let key = email_key(email);
        self.run(move |db| {
            let id = {
                let read_txn = db.begin_read()?;
                let table = read_txn.open_table(USERS_BY_EMAIL)?;
                let id = table.get(key.as_str())?.ok_or(StoreError::NotFound)?;
                id.value()
            };
            read_user(db, id)
        })
        .await
    }

    async fn update_user(&self, user: &User) -> StoreResult<User> {
        let user = user.clone();
        self.run(move |db| {
            let write_txn = db.begin_write()?;
            let updated = {
                let mut users = write_txn.open_table(USERS)?;
                let existing: User = {
                    let value = users.get(user.id)?.ok_or(StoreError::NotFound)?;
                    serde_json::from_slice(value.value())?
                };
                if existing.version != user.version {
                    return Err(StoreError::EditConflict);
                }

                let old_key = email_key(&existing.email);
                let new_key = email_key(&user.email);
                if old_key != new_key {
                    let mut by_email = write_txn.open_table(USERS_BY_EMAIL)?;
                    if by_email.get(new_key.as_str())?.is_some() {
                        return Err(StoreError::DuplicateEmail);
                    }
                    by_email.remove(old_key.as_str())?;
                    by_email.insert(new_key.as_str(), user.id)?;
                }

                let updated = User {
                    version: existing.version + 1,
                    ..user
                };
                let json = serde_json::to_vec(&updated)?;
                users.insert(updated.id, json.as_slice())?;
                updated
            };
            write_txn.commit()?;
            Ok(updated)
        })
        .await
    }
}

// =============================================================================
// Permissions
// =============================================================================

#[async_trait]
impl PermissionStore for Database {
    async fn list_codes(&self, user_id: UserId) -> StoreResult<Permissions> {
        self.run(move |db| {
            let read_txn = db.begin_read()?;
            let table = read_txn.open_table(PERMISSIONS)?;
            let permissions = match table.get(user_id)? {
                Some(value) => serde_json::from_slice(value.value())?,
                None => Permissions::default(),
            };
            Ok(permissions)
        })
        .await
    }

    async fn grant(&self, user_id: UserId, codes: &[&str]) -> StoreResult<()> {
        let codes: Vec<String> = codes.iter().map(|code| code.to_string()).collect();
        self.run(move |db| {
            let write_txn = db.begin_write()?;
            {
                let mut table = write_txn.open_table(PERMISSIONS)?;
                let mut permissions: Permissions = match table.get(user_id)? {
                    Some(value) => serde_json::from_slice(value.value())?,
                    None => Permissions::default(),
                };
                permissions.extend(codes);
                let json = serde_json::to_vec(&permissions)?;
                table.insert(user_id, json.as_slice())?;
            }
            write_txn.commit()?;
            Ok(())
        })
        .await
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::password::Password;
    use crate::models::USERS_READ;

    fn temp_db() -> (Database, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open(&dir.path().join("test.redb"), Duration::from_secs(3)).unwrap();
        (db, dir)
    }

    fn new_user(email: &str) -> NewUser {
        NewUser {
            name: "Alice".to_string(),
            email: email.to_string(),
            password: Password::set("pa55word-long").unwrap(),
            activated: false,
        }
    }

    fn record(plaintext: &str, user_id: UserId, scope: Scope, expiry: DateTime<Utc>) -> TokenRecord {
        TokenRecord {
            hash: TokenHash::of(plaintext),
            user_id,
            expiry,
            scope,
        }
    }

    #[tokio::test]
    async fn insert_assigns_sequential_ids() {
        let (db, _dir) = temp_db();
        let first = db.insert_user(new_user("a@example.com")).await.unwrap();
        let second = db.insert_user(new_user("b@example.com")).await.unwrap();
        assert_eq!(first.id, 1);
        assert_eq!(second.id, 2);
        assert_eq!(first.version, 1);
        assert!(!first.activated);
    }

    #[tokio::test]
    async fn duplicate_email_is_rejected_case_insensitively() {
        let (db, _dir) = temp_db();
        db.insert_user(new_user("alice@example.com")).await.unwrap();
        let result = db.insert_user(new_user("ALICE@example.com")).await;
        assert!(matches!(result, Err(StoreError::DuplicateEmail)));
    }

    #[tokio::test]
    async fn lookup_by_email() {
        let (db, _dir) = temp_db();
        let inserted = db.insert_user(new_user("alice@example.com")).await.unwrap();
        let found = db.get_user_by_email("Alice@Example.com").await.unwrap();
        assert_eq!(found.id, inserted.id);
        assert!(matches!(
            db.get_user_by_email("nobody@example.com").await,
            Err(StoreError::NotFound)
        ));
    }

    #[tokio::test]
    async fn update_requires_matching_version() {
        let (db, _dir) = temp_db();
        let mut user = db.insert_user(new_user("alice@example.com")).await.unwrap();
        user.activated = true;

        let updated = db.update_user(&user).await.unwrap();
        assert_eq!(updated.version, 2);
        assert!(updated.activated);

        // `user` still carries version 1
        let stale = db.update_user(&user).await;
        assert!(matches!(stale, Err(StoreError::EditConflict)));

        assert!(db.get_user(user.id).await.unwrap().activated);
    }

    #[tokio::test]
    async fn token_lookup_honors_scope_and_expiry() {
        let (db, _dir) = temp_db();
        let user = db.insert_user(new_user("alice@example.com")).await.unwrap();
        let now = Utc::now();
        let expiry = now + chrono::Duration::hours(1);
        db.insert_token(record("plain-1", user.id, Scope::Activation, expiry))
            .await
            .unwrap();

        let hash = TokenHash::of("plain-1");
        let found = db.find_user_by_hash(hash, Scope::Activation, now).await.unwrap();
        assert_eq!(found.id, user.id);

        assert!(matches!(
            db.find_user_by_hash(hash, Scope::Authentication, now).await,
            Err(StoreError::NotFound)
        ));
        assert!(matches!(
            db.find_user_by_hash(hash, Scope::Activation, expiry).await,
            Err(StoreError::NotFound)
        ));
    }

    #[tokio::test]
    async fn delete_tokens_only_touches_matching_scope_and_user() {
        let (db, _dir) = temp_db();
        let alice = db.insert_user(new_user("alice@example.com")).await.unwrap();
        let bob = db.insert_user(new_user("bob@example.com")).await.unwrap();
        let now = Utc::now();
        let expiry = now + chrono::Duration::hours(1);

        db.insert_token(record("a-act-1", alice.id, Scope::Activation, expiry)).await.unwrap();
        db.insert_token(record("a-act-2", alice.id, Scope::Activation, expiry)).await.unwrap();
        db.insert_token(record("a-auth", alice.id, Scope::Authentication, expiry)).await.unwrap();
        db.insert_token(record("b-act", bob.id, Scope::Activation, expiry)).await.unwrap();

        db.delete_tokens(Scope::Activation, alice.id).await.unwrap();

        for gone in ["a-act-1", "a-act-2"] {
            assert!(matches!(
                db.find_user_by_hash(TokenHash::of(gone), Scope::Activation, now).await,
                Err(StoreError::NotFound)
            ));
        }
        assert!(db
            .find_user_by_hash(TokenHash::of("a-auth"), Scope::Authentication, now)
            .await
            .is_ok());
        assert!(db
            .find_user_by_hash(TokenHash::of("b-act"), Scope::Activation, now)
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn permissions_default_empty_and_grant_is_idempotent() {
        let (db, _dir) = temp_db();
        assert!(db.list_codes(9).await.unwrap().is_empty());

        db.grant(9, &[USERS_READ]).await.unwrap();
        db.grant(9, &[USERS_READ]).await.unwrap();

        let codes = db.list_codes(9).await.unwrap();
        assert!(codes.contains(USERS_READ));
        assert_eq!(codes, [USERS_READ].into_iter().collect());
    }

    #[tokio::test]
    async fn data_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.redb");
        {
            let db = Database::open(&path, Duration::from_secs(3)).unwrap();
            db.insert_user(new_user("alice@example.com")).await.unwrap();
        }
        let db = Database::open(&path, Duration::from_secs(3)).unwrap();
        assert_eq!(db.get_user(1).await.unwrap().email, "alice@example.com");
    }
}
