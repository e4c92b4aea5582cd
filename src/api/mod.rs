// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::any::Any;

use axum::{
    extract::rejection::JsonRejection,
    http::{
        header::{AUTHORIZATION, CONNECTION, CONTENT_TYPE},
        HeaderValue, Method, StatusCode,
    },
    middleware::from_fn_with_state,
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use tower_http::{
    catch_panic::CatchPanicLayer,
    cors::{AllowOrigin, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use tracing::{error, warn};
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

use crate::{
    api::health::{HealthResponse, SystemInfo},
    auth::authenticate,
    background::panic_message,
    error::{ApiError, INTERNAL_MESSAGE},
    models::{
        ActivateUserRequest, CreateTokenRequest, RegisterUserRequest, TokenEnvelope,
        TokenResponse, UserEnvelope, UserResponse,
    },
    rate_limit::rate_limit,
    state::AppState,
};

pub mod health;
pub mod tokens;
pub mod users;

/// Full application router.
///
/// Layers, outermost first: panic recovery, request id, tracing, CORS,
/// rate limiting, identity resolution. `/docs` sits outside all of them.
pub fn router(state: AppState) -> Router {
    let v1_routes = Router::new()
        .route("/healthcheck", get(health::healthcheck))
        .route("/users", post(users::register_user))
        .route("/users/activated", put(users::activate_user))
        .route("/users/me", get(users::show_current_user))
        .route("/users/{id}", get(users::show_user))
        .route(
            "/tokens/authentication",
            post(tokens::create_authentication_token)
                .delete(tokens::revoke_authentication_tokens),
        );

    Router::new()
        .nest("/v1", v1_routes)
        .fallback(not_found)
        .method_not_allowed_fallback(method_not_allowed)
        .layer(from_fn_with_state(state.clone(), authenticate))
        .layer(from_fn_with_state(state.clone(), rate_limit))
        .layer(cors_layer(&state.trusted_origins))
        .layer(TraceLayer::new_for_http())
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(CatchPanicLayer::custom(recover_panic))
        .with_state(state)
        .merge(SwaggerUi::new("/docs").url("/api-doc/openapi.json", ApiDoc::openapi()))
}

/// Unwrap a JSON body or answer 400 with the parser's complaint.
pub(crate) fn read_json<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    payload
        .map(|Json(body)| body)
        .map_err(|rejection| ApiError::bad_request(rejection.body_text()))
}

async fn not_found() -> ApiError {
    ApiError::not_found("the requested resource could not be found")
}

async fn method_not_allowed() -> ApiError {
    ApiError::method_not_allowed()
}

/// CORS restricted to `origins`. Unparsable entries are skipped.
fn cors_layer(origins: &[String]) -> CorsLayer {
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "Ignoring unparsable trusted origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed))
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE])
}

/// 500 for a panicking handler. The connection is closed afterwards.
fn recover_panic(payload: Box<dyn Any + Send + 'static>) -> Response {
    error!(panic = %panic_message(&*payload), "Request handler panicked");

    let mut response =
        ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_MESSAGE).into_response();
    response
        .headers_mut()
        .insert(CONNECTION, HeaderValue::from_static("close"));
    response
}

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer",
            SecurityScheme::Http(HttpBuilder::new().scheme(HttpAuthScheme::Bearer).build()),
        );
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health::healthcheck,
        users::register_user,
        users::activate_user,
        users::show_current_user,
        users::show_user,
        tokens::create_authentication_token,
        tokens::revoke_authentication_tokens
    ),
    components(
        schemas(
            HealthResponse,
            SystemInfo,
            UserResponse,
            UserEnvelope,
            RegisterUserRequest,
            ActivateUserRequest,
            CreateTokenRequest,
            TokenResponse,
            TokenEnvelope
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Health", description = "Service liveness"),
        (name = "Users", description = "Registration, activation and profiles"),
        (name = "Tokens", description = "Authentication token issuance and revocation")
    )
)]
struct ApiDoc;
