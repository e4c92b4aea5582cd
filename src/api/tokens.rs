// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    Json,
};

use super::read_json;
use crate::{
    auth::{tokens::AUTHENTICATION_TTL, Authenticated},
    error::ApiError,
    models::{CreateTokenRequest, Scope, TokenEnvelope, TokenResponse},
    state::AppState,
    storage::StoreError,
    validation::{validate_email, validate_password, Validator},
};

/// Exchange email and password for a 24 hour authentication token.
///
/// An unknown email and a wrong password are answered identically.
#[utoipa::path(
    post,
    path = "/v1/tokens/authentication",
    tag = "Tokens",
    request_body = CreateTokenRequest,
    responses(
        (status = 201, description = "Token issued", body = TokenEnvelope),
        (status = 401, description = "Invalid credentials"),
        (status = 422, description = "Validation failed"),
    )
)]
pub async fn create_authentication_token(
    State(state): State<AppState>,
    payload: Result<Json<CreateTokenRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<TokenEnvelope>), ApiError> {
    let request = read_json(payload)?;

    let mut v = Validator::new();
    validate_email(&mut v, &request.email);
    validate_password(&mut v, &request.password);
    v.finish()?;

    let user = match state.users.get_user_by_email(&request.email).await {
        Ok(user) => user,
        Err(StoreError::NotFound) => return Err(ApiError::invalid_credentials()),
        Err(e) => return Err(ApiError::internal(e)),
    };

    let stored = user.password.clone();
    let plaintext = request.password;
    let matches = tokio::task::spawn_blocking(move || stored.matches(&plaintext))
        .await
        .map_err(ApiError::internal)?;
    if !matches {
        return Err(ApiError::invalid_credentials());
    }

    let token = state
        .tokens
        .mint(user.id, AUTHENTICATION_TTL, Scope::Authentication)
        .await
        .map_err(ApiError::internal)?;

    Ok((
        StatusCode::CREATED,
        Json(TokenEnvelope {
            authentication_token: TokenResponse::from(token),
        }),
    ))
}

/// Sign out everywhere by revoking every authentication token of the caller.
///
/// Only authentication is required, so an account that was never activated
/// can still end its sessions.
#[utoipa::path(
    delete,
    path = "/v1/tokens/authentication",
    tag = "Tokens",
    security(("bearer" = [])),
    responses(
        (status = 204, description = "All authentication tokens revoked"),
        (status = 401, description = "Missing or invalid token"),
    )
)]
pub async fn revoke_authentication_tokens(
    Authenticated(user): Authenticated,
    State(state): State<AppState>,
) -> Result<StatusCode, ApiError> {
    state
        .tokens
        .revoke_all(Scope::Authentication, user.id)
        .await
        .map_err(ApiError::internal)?;

    Ok(StatusCode::NO_CONTENT)
}
