// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Runtime Configuration
//!
//! Environment variable names, defaults, and the [`AppConfig`] loaded from
//! them once at startup.
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `DATA_DIR` | Directory holding `ledger.redb` | `./data` |
//! | `HOST` | Server bind address | `0.0.0.0` |
//! | `PORT` | Server bind port | `8080` |
//! | `LOG_FORMAT` | Logging format (`json` or `pretty`) | `pretty` |
//! | `RUST_LOG` | Log level filter | `info,tower_http=debug` |
//! | `AUTH_JWT_SECRET` | HS256 secret for bearer tokens | Required unless built with `dev` |
//! | `LOCK_WAIT_TIMEOUT_MS` | Max wait for a wallet lock | `5000` |
//! | `CONSUMER_INSTANCES` | Notification consumer tasks | `2` |
//! | `CONSUMER_MAX_ATTEMPTS` | Deliveries before dead-lettering | `5` |
//! | `CONSUMER_BASE_BACKOFF_MS` | First retry delay | `500` |
//! | `CONSUMER_MAX_BACKOFF_MS` | Retry delay cap | `60000` |
//! | `CONSUMER_VISIBILITY_TIMEOUT_SECS` | Lease length for a received event | `30` |
//! | `CONSUMER_IDLE_WAIT_MS` | Longest park between polls of an idle queue | `5000` |
//! | `WEBHOOK_URL` | Endpoint notified of completed transfers | Unset (disabled) |
//! | `WEBHOOK_SECRET` | HMAC key for `X-Signature` | Unset (unsigned) |
//! | `WEBHOOK_TIMEOUT_SECS` | Webhook request timeout | `10` |
//! | `RECONCILE_INTERVAL_SECS` | Outbox sweep interval | `60` |
//! | `SEED_WALLETS` | `user:balance,...` opened at boot | Unset |

use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use url::Url;

use crate::logging::LogFormat;

pub const DATA_DIR_ENV: &str = "DATA_DIR";
pub const HOST_ENV: &str = "HOST";
pub const PORT_ENV: &str = "PORT";
pub const LOG_FORMAT_ENV: &str = "LOG_FORMAT";

/// Secret used to verify HS256 bearer tokens. The `sub` claim is the caller's
/// user id.
pub const AUTH_JWT_SECRET_ENV: &str = "AUTH_JWT_SECRET";

pub const LOCK_WAIT_TIMEOUT_MS_ENV: &str = "LOCK_WAIT_TIMEOUT_MS";
pub const CONSUMER_INSTANCES_ENV: &str = "CONSUMER_INSTANCES";
pub const CONSUMER_MAX_ATTEMPTS_ENV: &str = "CONSUMER_MAX_ATTEMPTS";
pub const CONSUMER_BASE_BACKOFF_MS_ENV: &str = "CONSUMER_BASE_BACKOFF_MS";
pub const CONSUMER_MAX_BACKOFF_MS_ENV: &str = "CONSUMER_MAX_BACKOFF_MS";
pub const CONSUMER_VISIBILITY_TIMEOUT_SECS_ENV: &str = "CONSUMER_VISIBILITY_TIMEOUT_SECS";
pub const CONSUMER_IDLE_WAIT_MS_ENV: &str = "CONSUMER_IDLE_WAIT_MS";
pub const WEBHOOK_URL_ENV: &str = "WEBHOOK_URL";
pub const WEBHOOK_SECRET_ENV: &str = "WEBHOOK_SECRET";
pub const WEBHOOK_TIMEOUT_SECS_ENV: &str = "WEBHOOK_TIMEOUT_SECS";
pub const RECONCILE_INTERVAL_SECS_ENV: &str = "RECONCILE_INTERVAL_SECS";

/// Comma-separated `user:balance` pairs opened at startup for local runs.
pub const SEED_WALLETS_ENV: &str = "SEED_WALLETS";

/// Database file name inside `DATA_DIR`.
pub const DATABASE_FILE: &str = "ledger.redb";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for {var}: {value:?}")]
    Invalid { var: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct WebhookConfig {
    pub url: Url,
    pub secret: Option<String>,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    pub data_dir: PathBuf,
    pub log_format: LogFormat,
    pub jwt_secret: Option<String>,
    pub lock_wait_timeout: Duration,
    pub consumer_instances: usize,
    pub consumer_max_attempts: u32,
    pub consumer_base_backoff: Duration,
    pub consumer_max_backoff: Duration,
    pub consumer_visibility_timeout: Duration,
    pub consumer_idle_wait: Duration,
    pub webhook: Option<WebhookConfig>,
    pub reconcile_interval: Duration,
    pub seed_wallets: Vec<(String, u64)>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Build the config from any variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |var: &str| lookup(var).filter(|v| !v.trim().is_empty());

        let host = get(HOST_ENV).unwrap_or_else(|| "0.0.0.0".to_string());
        let port: u16 = parse_or(&get, PORT_ENV, 8080)?;
        let bind_addr: SocketAddr = format!("{host}:{port}")
            .parse()
            .map_err(|_| ConfigError::Invalid {
                var: HOST_ENV,
                value: host,
            })?;

        let log_format = match get(LOG_FORMAT_ENV) {
            None => LogFormat::Pretty,
            Some(value) => LogFormat::parse(&value).ok_or(ConfigError::Invalid {
                var: LOG_FORMAT_ENV,
                value,
            })?,
        };

        let webhook = match get(WEBHOOK_URL_ENV) {
            None => None,
            Some(value) => {
                let url = Url::parse(&value).map_err(|_| ConfigError::Invalid {
                    var: WEBHOOK_URL_ENV,
                    value,
                })?;
                Some(WebhookConfig {
                    url,
                    secret: get(WEBHOOK_SECRET_ENV),
                    timeout: Duration::from_secs(parse_or(&get, WEBHOOK_TIMEOUT_SECS_ENV, 10)?),
                })
            }
        };

        let seed_wallets = match get(SEED_WALLETS_ENV) {
            None => Vec::new(),
            Some(value) => parse_seed_wallets(&value).ok_or(ConfigError::Invalid {
                var: SEED_WALLETS_ENV,
                value,
            })?,
        };

        let consumer_instances: usize = parse_or(&get, CONSUMER_INSTANCES_ENV, 2)?;
        let consumer_max_attempts: u32 = parse_or(&get, CONSUMER_MAX_ATTEMPTS_ENV, 5)?;
        if consumer_max_attempts == 0 {
            return Err(ConfigError::Invalid {
                var: CONSUMER_MAX_ATTEMPTS_ENV,
                value: "0".to_string(),
            });
        }

        Ok(Self {
            bind_addr,
            data_dir: PathBuf::from(get(DATA_DIR_ENV).unwrap_or_else(|| "./data".to_string())),
            log_format,
            jwt_secret: get(AUTH_JWT_SECRET_ENV),
            lock_wait_timeout: Duration::from_millis(parse_or(&get, LOCK_WAIT_TIMEOUT_MS_ENV, 5000)?),
            consumer_instances,
            consumer_max_attempts,
            consumer_base_backoff: Duration::from_millis(parse_or(
                &get,
                CONSUMER_BASE_BACKOFF_MS_ENV,
                500,
            )?),
            consumer_max_backoff: Duration::from_millis(parse_or(
                &get,
                CONSUMER_MAX_BACKOFF_MS_ENV,
                60_000,
            )?),
            consumer_visibility_timeout: Duration::from_secs(parse_or(
                &get,
                CONSUMER_VISIBILITY_TIMEOUT_SECS_ENV,
                30,
            )?),
            consumer_idle_wait: Duration::from_millis(parse_or(
                &get,
                CONSUMER_IDLE_WAIT_MS_ENV,
                5000,
            )?),
            webhook,
            reconcile_interval: Duration::from_secs(parse_or(&get, RECONCILE_INTERVAL_SECS_ENV, 60)?),
            seed_wallets,
        })
    }

    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join(DATABASE_FILE)
    }
}

fn parse_or<T, G>(get: &G, var: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    G: Fn(&str) -> Option<String>,
{
    match get(var) {
        None => Ok(default),
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { var, value }),
    }
}

/// Parse `alice:100,bob:0`.
fn parse_seed_wallets(value: &str) -> Option<Vec<(String, u64)>> {
    value
        .split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            let (user, balance) = entry.split_once(':')?;
            let user = user.trim();
            if user.is_empty() {
                return None;
            }
            Some((user.to_string(), balance.trim().parse().ok()?))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<AppConfig, ConfigError> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|var| map.get(var).cloned())
    }

    #[test]
    fn defaults_apply_when_unset() {
        let config = config(&[]).unwrap();
        assert_eq!(config.bind_addr, "0.0.0.0:8080".parse().unwrap());
        assert_eq!(config.database_path(), PathBuf::from("./data/ledger.redb"));
        assert_eq!(config.log_format, LogFormat::Pretty);
        assert_eq!(config.lock_wait_timeout, Duration::from_secs(5));
        assert_eq!(config.consumer_instances, 2);
        assert_eq!(config.consumer_max_attempts, 5);
        assert_eq!(config.consumer_base_backoff, Duration::from_millis(500));
        assert_eq!(config.consumer_max_backoff, Duration::from_secs(60));
        assert_eq!(config.consumer_idle_wait, Duration::from_secs(5));
        assert_eq!(config.reconcile_interval, Duration::from_secs(60));
        assert!(config.webhook.is_none());
        assert!(config.jwt_secret.is_none());
        assert!(config.seed_wallets.is_empty());
    }

    #[test]
    fn overrides_are_read() {
        let config = config(&[
            (PORT_ENV, "9090"),
            (LOG_FORMAT_ENV, "json"),
            (LOCK_WAIT_TIMEOUT_MS_ENV, "250"),
            (CONSUMER_IDLE_WAIT_MS_ENV, "750"),
            (WEBHOOK_URL_ENV, "https://hooks.example.com/transfers"),
            (WEBHOOK_SECRET_ENV, "s3cret"),
            (SEED_WALLETS_ENV, "alice:100, bob:0"),
        ])
        .unwrap();

        assert_eq!(config.bind_addr.port(), 9090);
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(config.lock_wait_timeout, Duration::from_millis(250));
        assert_eq!(config.consumer_idle_wait, Duration::from_millis(750));
        let webhook = config.webhook.unwrap();
        assert_eq!(webhook.url.host_str(), Some("hooks.example.com"));
        assert_eq!(webhook.secret.as_deref(), Some("s3cret"));
        assert_eq!(webhook.timeout, Duration::from_secs(10));
        assert_eq!(
            config.seed_wallets,
            vec![("alice".to_string(), 100), ("bob".to_string(), 0)]
        );
    }

    #[test]
    fn malformed_values_name_the_variable() {
        let err = config(&[(PORT_ENV, "eighty")]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { var: PORT_ENV, .. }));

        let err = config(&[(SEED_WALLETS_ENV, "alice=100")]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { var: SEED_WALLETS_ENV, .. }));

        let err = config(&[(LOG_FORMAT_ENV, "xml")]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { var: LOG_FORMAT_ENV, .. }));

        let err = config(&[(CONSUMER_MAX_ATTEMPTS_ENV, "0")]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }));
    }

    #[test]
    fn blank_values_fall_back_to_defaults() {
        let config = config(&[(PORT_ENV, "  "), (WEBHOOK_URL_ENV, "")]).unwrap();
        assert_eq!(config.bind_addr.port(), 8080);
        assert!(config.webhook.is_none());
    }
}
