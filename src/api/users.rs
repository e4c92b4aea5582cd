// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! User endpoints: registration, activation and profile reads.

use std::collections::BTreeMap;

use axum::{
    extract::{rejection::JsonRejection, rejection::PathRejection, Path, State},
    http::StatusCode,
    Json,
};

use super::read_json;
use crate::{
    auth::{
        password::Password,
        tokens::{TokenError, ACTIVATION_TTL},
        Activated, Permitted, UsersRead,
    },
    error::ApiError,
    models::{
        ActivateUserRequest, NewUser, RegisterUserRequest, Scope, UserEnvelope, UserId,
        UserResponse, USERS_READ,
    },
    state::AppState,
    storage::StoreError,
    validation::{
        validate_email, validate_name, validate_password, validate_token_plaintext, Validator,
    },
};

/// Permission codes every new account starts with.
pub const DEFAULT_PERMISSIONS: &[&str] = &[USERS_READ];

/// Register a new, unactivated account.
///
/// An activation token valid for 72 hours is mailed to the address in the
/// background; the response does not wait for delivery.
#[utoipa::path(
    post,
    path = "/v1/users",
    tag = "Users",
    request_body = RegisterUserRequest,
    responses(
        (status = 202, description = "Account created, activation mail queued", body = UserEnvelope),
        (status = 400, description = "Malformed JSON body"),
        (status = 422, description = "Validation failed or email already registered"),
    )
)]
pub async fn register_user(
    State(state): State<AppState>,
    payload: Result<Json<RegisterUserRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<UserEnvelope>), ApiError> {
    let request = read_json(payload)?;

    let mut v = Validator::new();
    validate_name(&mut v, &request.name);
    validate_email(&mut v, &request.email);
    validate_password(&mut v, &request.password);
    v.finish()?;

    let plaintext = request.password;
    let password = tokio::task::spawn_blocking(move || Password::set(&plaintext))
        .await
        .map_err(ApiError::internal)?
        .map_err(ApiError::internal)?;

    let user = state
        .users
        .insert_user(NewUser {
            name: request.name,
            email: request.email,
            password,
            activated: false,
        })
        .await
        .map_err(|e| match e {
            StoreError::DuplicateEmail => ApiError::failed_validation(BTreeMap::from([(
                "email".to_string(),
                "a user with this email address already exists".to_string(),
            )])),
            other => ApiError::internal(other),
        })?;

    state
        .permissions
        .grant(user.id, DEFAULT_PERMISSIONS)
        .await
        .map_err(ApiError::internal)?;

    let token = state
        .tokens
        .mint(user.id, ACTIVATION_TTL, Scope::Activation)
        .await
        .map_err(ApiError::internal)?;

    let mailer = state.mailer.clone();
    let recipient = user.email.clone();
    let user_id = user.id;
    state.background.run("welcome_mail", async move {
        mailer
            .send_welcome(&recipient, user_id, &token.plaintext)
            .await
    });

    tracing::info!(user_id = user.id, "Registered user");
    Ok((
        StatusCode::ACCEPTED,
        Json(UserEnvelope {
            user: UserResponse::from(&user),
        }),
    ))
}

/// Activate the account owning an activation token.
///
/// All of the account's activation tokens are revoked afterwards.
#[utoipa::path(
    put,
    path = "/v1/users/activated",
    tag = "Users",
    request_body = ActivateUserRequest,
    responses(
        (status = 200, description = "Account activated", body = UserEnvelope),
        (status = 409, description = "Account changed concurrently"),
        (status = 422, description = "Invalid or expired activation token"),
    )
)]
pub async fn activate_user(
    State(state): State<AppState>,
    payload: Result<Json<ActivateUserRequest>, JsonRejection>,
) -> Result<Json<UserEnvelope>, ApiError> {
    let request = read_json(payload)?;

    let mut v = Validator::new();
    validate_token_plaintext(&mut v, &request.token);
    v.finish()?;

    let mut user = match state.tokens.resolve_user(Scope::Activation, &request.token).await {
        Ok(user) => user,
        Err(TokenError::NotFound) => {
            return Err(ApiError::failed_validation(BTreeMap::from([(
                "token".to_string(),
                "invalid or expired activation token".to_string(),
            )])))
        }
        Err(e) => return Err(ApiError::internal(e)),
    };

    user.activated = true;
    let user = state.users.update_user(&user).await.map_err(|e| match e {
        StoreError::EditConflict => ApiError::edit_conflict(),
        other => ApiError::internal(other),
    })?;

    state
        .tokens
        .revoke_all(Scope::Activation, user.id)
        .await
        .map_err(ApiError::internal)?;

    tracing::info!(user_id = user.id, "Activated user");
    Ok(Json(UserEnvelope {
        user: UserResponse::from(&user),
    }))
}

/// The calling user's own profile.
#[utoipa::path(
    get,
    path = "/v1/users/me",
    tag = "Users",
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Current user", body = UserEnvelope),
        (status = 401, description = "Missing or invalid token"),
        (status = 403, description = "Account not activated"),
    )
)]
pub async fn show_current_user(Activated(user): Activated) -> Json<UserEnvelope> {
    Json(UserEnvelope {
        user: UserResponse::from(&user),
    })
}

/// Any user's profile. Requires `users:read`.
#[utoipa::path(
    get,
    path = "/v1/users/{id}",
    tag = "Users",
    security(("bearer" = [])),
    params(("id" = u64, Path, description = "User id")),
    responses(
        (status = 200, description = "User found", body = UserEnvelope),
        (status = 401, description = "Missing or invalid token"),
        (status = 403, description = "Account not activated or permission missing"),
        (status = 404, description = "No such user"),
    )
)]
pub async fn show_user(
    _caller: Permitted<UsersRead>,
    State(state): State<AppState>,
    id: Result<Path<UserId>, PathRejection>,
) -> Result<Json<UserEnvelope>, ApiError> {
    let Ok(Path(id)) = id else {
        return Err(ApiError::not_found("the requested resource could not be found"));
    };

    let user = state.users.get_user(id).await.map_err(|e| match e {
        StoreError::NotFound => ApiError::not_found("the requested resource could not be found"),
        other => ApiError::internal(other),
    })?;

    Ok(Json(UserEnvelope {
        user: UserResponse::from(&user),
    }))
}
