// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Identity resolver middleware.
//!
//! Runs before routing on every request and binds an [`Identity`] to the
//! request extensions:
//!
//! - no `Authorization` header: [`Identity::Anonymous`], request proceeds
//! - header not shaped `Bearer <token>`: [`AuthError::MalformedCredential`]
//! - token unknown, expired or of another scope: [`AuthError::InvalidCredential`]
//! - any other failure: [`AuthError::Internal`], logged
//!
//! Every response, including rejections, carries `Vary: Authorization`.
//!
//! ## Usage
//!
//! ```rust,ignore
//! let app = Router::new()
//!     .route("/v1/users/me", get(show_current_user))
//!     .layer(axum::middleware::from_fn_with_state(state.clone(), authenticate));
//! ```

use axum::{
    extract::{Request, State},
    http::{
        header::{AUTHORIZATION, VARY},
        HeaderMap, HeaderValue,
    },
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::error;

use super::tokens::{TokenError, TokenManager};
use super::AuthError;
use crate::models::{Identity, Scope};
use crate::state::AppState;

/// Resolve the caller and continue, or reject.
pub async fn authenticate(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let mut response = match resolve_identity(&state.tokens, request.headers()).await {
        Ok(identity) => {
            request.extensions_mut().insert(identity);
            next.run(request).await
        }
        Err(e) => e.into_response(),
    };

    response
        .headers_mut()
        .append(VARY, HeaderValue::from_static("Authorization"));
    response
}

/// Identity for the credential in `headers`.
pub async fn resolve_identity(
    tokens: &TokenManager,
    headers: &HeaderMap,
) -> Result<Identity, AuthError> {
    // An empty header carries no credential, same as an absent one.
    let Some(header) = headers.get(AUTHORIZATION).filter(|h| !h.is_empty()) else {
        return Ok(Identity::Anonymous);
    };

    let value = header.to_str().map_err(|_| AuthError::MalformedCredential)?;
    let token = parse_bearer(value).ok_or(AuthError::MalformedCredential)?;

    match tokens.resolve_user(Scope::Authentication, token).await {
        Ok(user) => Ok(Identity::User(user)),
        Err(TokenError::NotFound) => Err(AuthError::InvalidCredential),
        Err(e) => {
            error!(error = %e, "Failed to resolve authentication token");
            Err(AuthError::Internal)
        }
    }
}

/// Token part of a `Bearer <token>` header value.
///
/// Exactly two space-separated parts, the first being `Bearer`.
fn parse_bearer(value: &str) -> Option<&str> {
    let mut parts = value.split(' ');
    match (parts.next(), parts.next(), parts.next()) {
        (Some("Bearer"), Some(token), None) if !token.is_empty() => Some(token),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use axum::{body::Body, http::StatusCode, routing::get, Extension, Router};
    use tower::ServiceExt;

    use crate::auth::password::Password;
    use crate::auth::tokens::AUTHENTICATION_TTL;
    use crate::config::Config;
    use crate::models::NewUser;
    use crate::storage::memory::MemoryStore;
    use crate::storage::UserStore;

    async fn setup() -> (AppState, Arc<MemoryStore>, String) {
        let store = Arc::new(MemoryStore::new());
        let user = store
            .insert_user(NewUser {
                name: "Bea".to_string(),
                email: "bea@example.com".to_string(),
                password: Password::set("pa55word-long").unwrap(),
                activated: true,
            })
            .await
            .unwrap();
        let state = AppState::new(store.clone(), &Config::default());
        let token = state
            .tokens
            .mint(user.id, AUTHENTICATION_TTL, Scope::Authentication)
            .await
            .unwrap();
        (state, store, token.plaintext)
    }

    fn app(state: AppState) -> Router {
        Router::new()
            .route(
                "/whoami",
                get(|Extension(identity): Extension<Identity>| async move {
                    match identity {
                        Identity::Anonymous => "anonymous".to_string(),
                        Identity::User(user) => user.email,
                    }
                }),
            )
            .layer(axum::middleware::from_fn_with_state(state.clone(), authenticate))
            .with_state(state)
    }

    fn request(auth: Option<&str>) -> axum::http::Request<Body> {
        let mut builder = axum::http::Request::builder().uri("/whoami");
        if let Some(value) = auth {
            builder = builder.header(AUTHORIZATION, value);
        }
        builder.body(Body::empty()).unwrap()
    }

    async fn body_text(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[test]
    fn bearer_shape() {
        assert_eq!(parse_bearer("Bearer abc"), Some("abc"));
        assert_eq!(parse_bearer("Bearer"), None);
        assert_eq!(parse_bearer("Bearer "), None);
        assert_eq!(parse_bearer("bearer abc"), None);
        assert_eq!(parse_bearer("Basic abc"), None);
        assert_eq!(parse_bearer("Bearer abc def"), None);
        assert_eq!(parse_bearer("Bearer  abc"), None);
    }

    #[tokio::test]
    async fn missing_header_is_anonymous() {
        let (state, _store, _token) = setup().await;
        let response = app(state).oneshot(request(None)).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[VARY], "Authorization");
        assert_eq!(body_text(response).await, "anonymous");
    }

    #[tokio::test]
    async fn empty_header_is_anonymous() {
        let (state, _store, _token) = setup().await;
        let response = app(state).oneshot(request(Some(""))).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[VARY], "Authorization");
        assert_eq!(body_text(response).await, "anonymous");
    }

    #[tokio::test]
    async fn blank_header_is_malformed() {
        let (state, _store, _token) = setup().await;
        let result = resolve_identity(
            &state.tokens,
            &HeaderMap::from_iter([(AUTHORIZATION, HeaderValue::from_static(" "))]),
        )
        .await;
        assert_eq!(result, Err(AuthError::MalformedCredential));
    }

    #[tokio::test]
    async fn valid_token_binds_the_user() {
        let (state, _store, token) = setup().await;
        let response = app(state)
            .oneshot(request(Some(&format!("Bearer {token}"))))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_text(response).await, "bea@example.com");
    }

    #[tokio::test]
    async fn malformed_header_is_rejected_with_vary() {
        let (state, _store, token) = setup().await;
        let response = app(state)
            .oneshot(request(Some(&format!("Token {token}"))))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(response.headers()[VARY], "Authorization");
        assert!(body_text(response).await.contains("malformed_credential"));
    }

    #[tokio::test]
    async fn unknown_token_is_invalid() {
        let (state, _store, _token) = setup().await;
        let response = app(state)
            .oneshot(request(Some("Bearer AAAAAAAAAAAAAAAAAAAAAA")))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(body_text(response).await.contains("invalid_credential"));
    }

    #[tokio::test]
    async fn activation_token_is_not_a_session() {
        let (state, store, _token) = setup().await;
        let user = store.get_user_by_email("bea@example.com").await.unwrap();
        let activation = state
            .tokens
            .mint(user.id, Duration::from_secs(60), Scope::Activation)
            .await
            .unwrap();

        let result = resolve_identity(
            &state.tokens,
            &HeaderMap::from_iter([(
                AUTHORIZATION,
                HeaderValue::from_str(&format!("Bearer {}", activation.plaintext)).unwrap(),
            )]),
        )
        .await;
        assert_eq!(result, Err(AuthError::InvalidCredential));
    }

    #[tokio::test]
    async fn store_failure_is_internal() {
        let (state, store, token) = setup().await;
        store.fail_tokens();

        let response = app(state)
            .oneshot(request(Some(&format!("Bearer {token}"))))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(response.headers()[VARY], "Authorization");
    }
}
