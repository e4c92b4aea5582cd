// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::sync::Arc;

use crate::auth::tokens::TokenManager;
use crate::background::BackgroundTasks;
use crate::config::Config;
use crate::mailer::{LogMailer, Mailer};
use crate::rate_limit::RateLimiter;
use crate::storage::{PermissionStore, TokenStore, UserStore};

/// Shared handles available to every middleware and handler.
#[derive(Clone)]
pub struct AppState {
    pub tokens: TokenManager,
    pub users: Arc<dyn UserStore>,
    pub permissions: Arc<dyn PermissionStore>,
    pub limiter: Arc<RateLimiter>,
    pub background: BackgroundTasks,
    pub mailer: Arc<dyn Mailer>,
    pub environment: String,
    pub trusted_origins: Vec<String>,
}

impl AppState {
    /// State backed by one store implementing every storage contract.
    pub fn new<S>(store: Arc<S>, config: &Config) -> Self
    where
        S: TokenStore + UserStore + PermissionStore + 'static,
    {
        Self {
            tokens: TokenManager::new(store.clone()),
            users: store.clone(),
            permissions: store,
            limiter: Arc::new(RateLimiter::new(config.limiter.clone())),
            background: BackgroundTasks::new(),
            mailer: Arc::new(LogMailer),
            environment: config.environment.clone(),
            trusted_origins: config.trusted_origins.clone(),
        }
    }

    /// Replace the mailer.
    pub fn with_mailer(mut self, mailer: Arc<dyn Mailer>) -> Self {
        self.mailer = mailer;
        self
    }

    /// Replace the permission store.
    pub fn with_permissions(mut self, permissions: Arc<dyn PermissionStore>) -> Self {
        self.permissions = permissions;
        self
    }
}
