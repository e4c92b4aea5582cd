// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Per-Client Rate Limiter
//!
//! Token-bucket admission control keyed by client IP address (port ignored).
//!
//! ## Strategy
//!
//! - A bucket is created full (`burst` tokens) the first time an address is
//!   seen and refills continuously at `requests_per_second`.
//! - Each admitted request takes one token.
//! - The client map sits behind one mutex, held only for the lookup and
//!   update. It is never held while the downstream handler runs.
//! - An eviction sweep drops clients idle longer than the staleness window,
//!   so memory tracks recently active clients rather than every client ever
//!   seen.
//!
//! ## Shutdown
//!
//! The eviction loop exits when its `CancellationToken` is cancelled, the
//! same way the other periodic tasks in this service stop.

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use axum::{
    extract::{ConnectInfo, Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::RateLimitConfig;
use crate::error::ApiError;
use crate::state::AppState;

/// Classic token bucket: `capacity` tokens, refilled at `rate` per second.
#[derive(Debug, Clone)]
pub struct TokenBucket {
    rate: f64,
    capacity: f64,
    tokens: f64,
    last_refill: Instant,
}

impl TokenBucket {
    /// A full bucket.
    pub fn new(rate: f64, capacity: u32, now: Instant) -> Self {
        Self {
            rate,
            capacity: f64::from(capacity),
            tokens: f64::from(capacity),
            last_refill: now,
        }
    }

    /// Take one token if available at `now`.
    pub fn allow_at(&mut self, now: Instant) -> bool {
        self.refill(now);
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    fn refill(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.rate).min(self.capacity);
        self.last_refill = now;
    }
}

struct Client {
    bucket: TokenBucket,
    last_seen: Instant,
}

/// Per-address limiter state.
pub struct RateLimiter {
    config: RateLimitConfig,
    clients: Mutex<HashMap<IpAddr, Client>>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            clients: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Whether a request from `addr` may proceed now.
    pub fn admit(&self, addr: SocketAddr) -> bool {
        self.admit_at(addr.ip(), Instant::now())
    }

    /// Whether a request from `ip` may proceed at `now`.
    ///
    /// A disabled limiter admits everything without touching the map.
    pub fn admit_at(&self, ip: IpAddr, now: Instant) -> bool {
        if !self.config.enabled {
            return true;
        }

        let mut clients = self.lock();
        let client = clients.entry(ip).or_insert_with(|| Client {
            bucket: TokenBucket::new(self.config.requests_per_second, self.config.burst, now),
            last_seen: now,
        });
        client.last_seen = now;
        client.bucket.allow_at(now)
    }

    /// Drop every client idle for longer than the staleness window.
    /// Returns how many were removed.
    pub fn evict_stale_at(&self, now: Instant) -> usize {
        let stale_after = self.config.stale_after;
        let mut clients = self.lock();
        let before = clients.len();
        clients.retain(|_, client| now.saturating_duration_since(client.last_seen) <= stale_after);
        before - clients.len()
    }

    /// Number of addresses currently tracked.
    pub fn tracked_clients(&self) -> usize {
        self.lock().len()
    }

    /// Run the eviction sweep every `eviction_interval` until cancelled.
    ///
    /// Should be spawned as a background task:
    /// ```rust,ignore
    /// tokio::spawn(limiter.clone().run_eviction(shutdown.clone()));
    /// ```
    pub async fn run_eviction(self: Arc<Self>, shutdown: CancellationToken) {
        info!(
            interval_secs = self.config.eviction_interval.as_secs(),
            stale_after_secs = self.config.stale_after.as_secs(),
            "Rate limiter eviction starting"
        );

        loop {
            tokio::select! {
                _ = tokio::time::sleep(self.config.eviction_interval) => {},
                _ = shutdown.cancelled() => {
                    info!("Rate limiter eviction shutting down");
                    return;
                }
            }

            let evicted = self.evict_stale_at(Instant::now());
            if evicted > 0 {
                debug!(evicted, remaining = self.tracked_clients(), "Evicted idle clients");
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<IpAddr, Client>> {
        // Entries stay consistent even if a holder panicked mid-update
        self.clients.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Middleware rejecting clients that exceed their bucket with 429.
pub async fn rate_limit(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    request: Request,
    next: Next,
) -> Response {
    if !state.limiter.admit(addr) {
        debug!(client = %addr.ip(), "Rate limit exceeded");
        return ApiError::rate_limited().into_response();
    }
    next.run(request).await
}
