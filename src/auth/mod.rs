// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Authentication Module
//!
//! Opaque bearer tokens, caller identity and the authorization gate.
//!
//! ## Auth Flow
//!
//! 1. A client exchanges email + password for an authentication token
//!    (`POST /v1/tokens/authentication`)
//! 2. The client sends `Authorization: Bearer <token>`
//! 3. The server:
//!    - Hashes the presented token and looks up an unexpired record of
//!      scope `authentication`
//!    - Binds the owning user (or the anonymous identity) to the request
//!    - Lets each route's extractors enforce authenticated / activated /
//!      permission requirements
//!
//! ## Security
//!
//! - Token plaintexts are returned once and never stored or logged
//! - Unknown, expired and wrong-scope tokens fail identically
//! - Activation tokens are revoked once the account is activated

pub mod error;
pub mod extractor;
pub mod middleware;
pub mod password;
pub mod tokens;

pub use error::AuthError;
pub use extractor::{Activated, Authenticated, Permission, Permitted, UsersRead};
pub use middleware::authenticate;
pub use tokens::{TokenError, TokenManager};
