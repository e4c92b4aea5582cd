// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::state::AppState;

/// Health check response.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    /// Always `"available"` while the process serves requests.
    pub status: String,
    pub system_info: SystemInfo,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SystemInfo {
    /// Value of `APP_ENV`.
    pub environment: String,
    /// Crate version.
    pub version: String,
}

/// Liveness check. Needs no credentials.
#[utoipa::path(
    get,
    path = "/v1/healthcheck",
    tag = "Health",
    responses(
        (status = 200, description = "Service is available", body = HealthResponse)
    )
)]
pub async fn healthcheck(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "available".to_string(),
        system_info: SystemInfo {
            environment: state.environment.clone(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        },
    })
}
