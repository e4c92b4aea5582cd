// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Warden API - request-handling core of a token-authenticated web API.
//!
//! ## Modules
//!
//! - `api` - HTTP handlers, router and middleware stack (Axum)
//! - `auth` - Bearer tokens, identity resolution and authorization guards
//! - `rate_limit` - Per-client token-bucket admission control
//! - `background` - Supervised fire-and-forget tasks
//! - `server` - Graceful shutdown coordination
//! - `storage` - redb-backed user, token and permission stores

pub mod api;
pub mod auth;
pub mod background;
pub mod config;
pub mod error;
pub mod logging;
pub mod mailer;
pub mod models;
pub mod rate_limit;
pub mod server;
pub mod state;
pub mod storage;
pub mod validation;
