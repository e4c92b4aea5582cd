// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Runtime Configuration
//!
//! Configuration is read from the environment once at startup. Values that
//! are present but do not parse abort startup with a [`ConfigError`] instead
//! of silently falling back to the default.
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `HOST` | Server bind address | `0.0.0.0` |
//! | `PORT` | Server bind port | `4000` |
//! | `APP_ENV` | Environment label reported by the health check | `development` |
//! | `DATA_DIR` | Directory holding the database file | `./data` |
//! | `LIMITER_ENABLED` | Per-client rate limiting on/off | `true` |
//! | `LIMITER_RPS` | Sustained requests per second per client | `2` |
//! | `LIMITER_BURST` | Burst capacity per client | `4` |
//! | `LIMITER_EVICT_INTERVAL_SECS` | Period of the idle-client sweep | `60` |
//! | `LIMITER_STALE_AFTER_SECS` | Idle time after which a client is forgotten | `180` |
//! | `SHUTDOWN_GRACE_SECS` | Time in-flight requests get to finish on shutdown | `30` |
//! | `STORE_TIMEOUT_SECS` | Bound on every storage call | `3` |
//! | `CORS_TRUSTED_ORIGINS` | Space-separated list of allowed origins | empty |
//! | `LOG_FORMAT` | Logging format (`json` or `pretty`) | `pretty` |
//! | `RUST_LOG` | Log level filter | `info,tower_http=debug` |

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

pub const HOST_ENV: &str = "HOST";
pub const PORT_ENV: &str = "PORT";
pub const APP_ENV_ENV: &str = "APP_ENV";
pub const DATA_DIR_ENV: &str = "DATA_DIR";
pub const LIMITER_ENABLED_ENV: &str = "LIMITER_ENABLED";
pub const LIMITER_RPS_ENV: &str = "LIMITER_RPS";
pub const LIMITER_BURST_ENV: &str = "LIMITER_BURST";
pub const LIMITER_EVICT_INTERVAL_ENV: &str = "LIMITER_EVICT_INTERVAL_SECS";
pub const LIMITER_STALE_AFTER_ENV: &str = "LIMITER_STALE_AFTER_SECS";
pub const SHUTDOWN_GRACE_ENV: &str = "SHUTDOWN_GRACE_SECS";
pub const STORE_TIMEOUT_ENV: &str = "STORE_TIMEOUT_SECS";
pub const CORS_TRUSTED_ORIGINS_ENV: &str = "CORS_TRUSTED_ORIGINS";
pub const LOG_FORMAT_ENV: &str = "LOG_FORMAT";

/// Name of the database file inside `DATA_DIR`.
pub const DATABASE_FILE: &str = "warden.redb";

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value {value:?} for {name}: expected {expected}")]
    Invalid {
        name: &'static str,
        value: String,
        expected: &'static str,
    },
}

/// Output format of the log subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    Json,
    #[default]
    Pretty,
}

/// Token-bucket limiter settings.
#[derive(Debug, Clone, PartialEq)]
pub struct RateLimitConfig {
    pub enabled: bool,
    pub requests_per_second: f64,
    pub burst: u32,
    pub eviction_interval: Duration,
    pub stale_after: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            requests_per_second: 2.0,
            burst: 4,
            eviction_interval: Duration::from_secs(60),
            stale_after: Duration::from_secs(180),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub host: IpAddr,
    pub port: u16,
    pub environment: String,
    pub data_dir: PathBuf,
    pub limiter: RateLimitConfig,
    pub shutdown_grace: Duration,
    pub store_timeout: Duration,
    pub trusted_origins: Vec<String>,
    pub log_format: LogFormat,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: IpAddr::from([0, 0, 0, 0]),
            port: 4000,
            environment: "development".to_string(),
            data_dir: PathBuf::from("./data"),
            limiter: RateLimitConfig::default(),
            shutdown_grace: Duration::from_secs(30),
            store_timeout: Duration::from_secs(3),
            trusted_origins: Vec::new(),
            log_format: LogFormat::default(),
        }
    }
}

impl Config {
    /// Load from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load using `lookup` to resolve variable names.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let reader = Reader { lookup };

        let limiter = RateLimitConfig {
            enabled: reader.parse_bool(LIMITER_ENABLED_ENV, defaults.limiter.enabled)?,
            requests_per_second: reader.parse_rate(
                LIMITER_RPS_ENV,
                defaults.limiter.requests_per_second,
            )?,
            burst: reader.parse_burst(LIMITER_BURST_ENV, defaults.limiter.burst)?,
            eviction_interval: reader.parse_positive_secs(
                LIMITER_EVICT_INTERVAL_ENV,
                defaults.limiter.eviction_interval,
            )?,
            stale_after: reader
                .parse_positive_secs(LIMITER_STALE_AFTER_ENV, defaults.limiter.stale_after)?,
        };

        let log_format = match reader.get(LOG_FORMAT_ENV) {
            Some(value) if value.eq_ignore_ascii_case("json") => LogFormat::Json,
            _ => LogFormat::Pretty,
        };

        Ok(Self {
            host: reader.parse(HOST_ENV, defaults.host, "an IP address")?,
            port: reader.parse(PORT_ENV, defaults.port, "a port number")?,
            environment: reader.get(APP_ENV_ENV).unwrap_or(defaults.environment),
            data_dir: reader.get(DATA_DIR_ENV).map(PathBuf::from).unwrap_or(defaults.data_dir),
            limiter,
            shutdown_grace: reader.parse_secs(SHUTDOWN_GRACE_ENV, defaults.shutdown_grace)?,
            store_timeout: reader
                .parse_positive_secs(STORE_TIMEOUT_ENV, defaults.store_timeout)?,
            trusted_origins: reader
                .get(CORS_TRUSTED_ORIGINS_ENV)
                .map(|list| list.split_whitespace().map(str::to_string).collect())
                .unwrap_or_default(),
            log_format,
        })
    }

    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join(DATABASE_FILE)
    }
}

struct Reader<F> {
    lookup: F,
}

impl<F> Reader<F>
where
    F: Fn(&str) -> Option<String>,
{
    /// Trimmed, non-empty value of `name`.
    fn get(&self, name: &str) -> Option<String> {
        (self.lookup)(name)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    }

    fn parse<T: FromStr>(
        &self,
        name: &'static str,
        default: T,
        expected: &'static str,
    ) -> Result<T, ConfigError> {
        match self.get(name) {
            None => Ok(default),
            Some(value) => value.parse().map_err(|_| ConfigError::Invalid {
                name,
                value,
                expected,
            }),
        }
    }

    fn parse_bool(&self, name: &'static str, default: bool) -> Result<bool, ConfigError> {
        match self.get(name) {
            None => Ok(default),
            Some(value) => match value.to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => Ok(true),
                "0" | "false" | "no" | "off" => Ok(false),
                _ => Err(ConfigError::Invalid {
                    name,
                    value,
                    expected: "a boolean",
                }),
            },
        }
    }

    fn parse_rate(&self, name: &'static str, default: f64) -> Result<f64, ConfigError> {
        let rate: f64 = self.parse(name, default, "a positive number")?;
        if rate.is_finite() && rate > 0.0 {
            Ok(rate)
        } else {
            Err(ConfigError::Invalid {
                name,
                value: rate.to_string(),
                expected: "a positive number",
            })
        }
    }

    fn parse_burst(&self, name: &'static str, default: u32) -> Result<u32, ConfigError> {
        const EXPECTED: &str = "a positive integer";
        match self.parse(name, default, EXPECTED)? {
            0 => Err(ConfigError::Invalid {
                name,
                value: "0".to_string(),
                expected: EXPECTED,
            }),
            burst => Ok(burst),
        }
    }

    fn parse_secs(&self, name: &'static str, default: Duration) -> Result<Duration, ConfigError> {
        self.parse(name, default.as_secs(), "a whole number of seconds")
            .map(Duration::from_secs)
    }

    /// Like [`Self::parse_secs`], rejecting zero.
    fn parse_positive_secs(
        &self,
        name: &'static str,
        default: Duration,
    ) -> Result<Duration, ConfigError> {
        const EXPECTED: &str = "a positive number of seconds";
        let secs: u64 = self.parse(name, default.as_secs(), EXPECTED)?;
        if secs == 0 {
            return Err(ConfigError::Invalid {
                name,
                value: secs.to_string(),
                expected: EXPECTED,
            });
        }
        Ok(Duration::from_secs(secs))
    }
}
