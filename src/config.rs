//! Environment-driven configuration.

use std::path::PathBuf;
use std::time::Duration;

use crate::credential::{Credentials, StaticHeaders};
use crate::error::ConfigError;

const DEFAULT_PORT: u16 = 8080;
const DEFAULT_WINDOW_SECS: u64 = 3600;
const DEFAULT_DB_PATH: &str = "./data/tuya.db";

/// Configuration for the relay server.
///
/// Resolved from environment variables:
/// - `PORT`: HTTP listening port (default: 8080)
/// - `RATE_WINDOW_SECONDS`: collection period and passthrough rate-limit window (default: 3600)
/// - `ALLOWED_ORIGIN`: the single origin allowed by CORS (default: CORS disabled)
/// - `DB_PATH`: SQLite file holding the snapshot (default: `./data/tuya.db`)
/// - `TUYA_BASE_URL`, `TUYA_DEVICE_ID`, `TUYA_CLIENT_ID`: required
/// - `TUYA_CLIENT_SECRET`: required unless static headers are configured
/// - `TUYA_ACCESS_TOKEN`: optional
/// - `TUYA_STATIC_SIGN`, `TUYA_STATIC_T`, `TUYA_STATIC_NONCE`: forward fixed
///   auth values instead of signing
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub window: Duration,
    pub allowed_origin: Option<String>,
    pub db_path: PathBuf,
    pub credentials: Credentials,
    pub static_headers: Option<StaticHeaders>,
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from an arbitrary variable lookup. Empty values count
    /// as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let required = |key: &'static str| var(key).ok_or(ConfigError::Missing(key));

        let port = match var("PORT") {
            Some(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid {
                key: "PORT",
                value: raw,
            })?,
            None => DEFAULT_PORT,
        };

        let window_secs = var("RATE_WINDOW_SECONDS")
            .and_then(|v| v.trim().parse::<u64>().ok())
            .filter(|v| *v > 0)
            .unwrap_or(DEFAULT_WINDOW_SECS);

        let static_headers = match (var("TUYA_STATIC_SIGN"), var("TUYA_STATIC_T")) {
            (Some(sign), Some(t)) => Some(StaticHeaders {
                sign,
                t,
                nonce: var("TUYA_STATIC_NONCE"),
            }),
            _ => None,
        };

        let client_secret = if static_headers.is_some() {
            var("TUYA_CLIENT_SECRET").unwrap_or_default()
        } else {
            required("TUYA_CLIENT_SECRET")?
        };

        let credentials = Credentials::new(
            required("TUYA_BASE_URL")?,
            required("TUYA_DEVICE_ID")?,
            required("TUYA_CLIENT_ID")?,
            client_secret,
            var("TUYA_ACCESS_TOKEN").unwrap_or_default(),
        );

        Ok(Self {
            port,
            window: Duration::from_secs(window_secs),
            allowed_origin: var("ALLOWED_ORIGIN"),
            db_path: var("DB_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_DB_PATH)),
            credentials,
            static_headers,
        })
    }
}
