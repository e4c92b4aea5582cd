// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::process::ExitCode;
use std::sync::Arc;

use tracing::{error, info};

use warden_api::{
    api::router,
    config::Config,
    logging,
    server::{shutdown_signal, ShutdownCoordinator},
    state::AppState,
    storage::Database,
};

#[tokio::main]
async fn main() -> ExitCode {
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Invalid configuration: {e}");
            return ExitCode::FAILURE;
        }
    };

    logging::init(config.log_format);

    if let Err(e) = std::fs::create_dir_all(&config.data_dir) {
        error!(path = %config.data_dir.display(), error = %e, "Failed to create data directory");
        return ExitCode::FAILURE;
    }

    let database_path = config.database_path();
    let database = match Database::open(&database_path, config.store_timeout) {
        Ok(database) => Arc::new(database),
        Err(e) => {
            error!(path = %database_path.display(), error = %e, "Failed to open database");
            return ExitCode::FAILURE;
        }
    };

    let state = AppState::new(database, &config);
    let coordinator = ShutdownCoordinator::new(config.shutdown_grace, state.background.clone());

    if config.limiter.enabled {
        tokio::spawn(state.limiter.clone().run_eviction(coordinator.stopped()));
    }

    info!(
        environment = %config.environment,
        limiter_enabled = config.limiter.enabled,
        "Starting Warden API"
    );

    match coordinator
        .serve(config.bind_addr(), router(state), shutdown_signal())
        .await
    {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "Server exited with error");
            ExitCode::FAILURE
        }
    }
}
