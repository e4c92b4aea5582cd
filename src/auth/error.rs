// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Authentication and authorization errors.

use axum::{
    http::{header::WWW_AUTHENTICATE, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// Authentication/authorization error type.
///
/// Every variant is terminal for the request. `Internal` carries no detail:
/// the cause is logged where it happens and the client only sees a generic
/// message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthError {
    /// Authorization header present but not `Bearer <token>`
    MalformedCredential,
    /// Token unknown, expired or minted for another scope
    InvalidCredential,
    /// Route needs a caller but the request is anonymous
    AuthenticationRequired,
    /// Caller's account has not been activated
    AccountInactive,
    /// Caller lacks the permission code the route demands
    Forbidden,
    /// A dependency failed while resolving identity or permissions
    Internal,
}

#[derive(Serialize)]
struct AuthErrorBody {
    error: String,
    error_code: String,
}

impl AuthError {
    /// Get the error code for this error.
    pub fn error_code(&self) -> &'static str {
        match self {
            AuthError::MalformedCredential => "malformed_credential",
            AuthError::InvalidCredential => "invalid_credential",
            AuthError::AuthenticationRequired => "authentication_required",
            AuthError::AccountInactive => "account_inactive",
            AuthError::Forbidden => "forbidden",
            AuthError::Internal => "internal_error",
        }
    }

    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            AuthError::MalformedCredential
            | AuthError::InvalidCredential
            | AuthError::AuthenticationRequired => StatusCode::UNAUTHORIZED,
            AuthError::AccountInactive | AuthError::Forbidden => StatusCode::FORBIDDEN,
            AuthError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl std::fmt::Display for AuthError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthError::MalformedCredential | AuthError::InvalidCredential => {
                write!(f, "invalid or missing authentication token")
            }
            AuthError::AuthenticationRequired => {
                write!(f, "you must be authenticated to access this resource")
            }
            AuthError::AccountInactive => {
                write!(f, "your user account must be activated to access this resource")
            }
            AuthError::Forbidden => write!(
                f,
                "your user account doesn't have the necessary permissions to access this resource"
            ),
            AuthError::Internal => write!(
                f,
                "the server encountered a problem and could not process your request"
            ),
        }
    }
}

impl std::error::Error for AuthError {}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(AuthErrorBody {
            error: self.to_string(),
            error_code: self.error_code().to_string(),
        });
        let mut response = (status, body).into_response();

        if matches!(self, AuthError::MalformedCredential | AuthError::InvalidCredential) {
            response
                .headers_mut()
                .insert(WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
        }
        response
    }
}
