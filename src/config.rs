use std::env;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;
use url::Url;

use crate::backend::simulated::DEFAULT_PLACEHOLDER_URL;

const DEFAULT_PORT: u16 = 5000;
const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PROCESSING_DELAY_MS: u64 = 2_000;
const DEFAULT_GENERATION_TIMEOUT_MS: u64 = 5 * 60 * 1_000;
const DEFAULT_MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("{key} has an invalid value {value:?}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub bind_address: String,
    pub public_base_url: String,
    pub backend_url: Option<Url>,
    pub processing_delay: Duration,
    pub placeholder_output_url: String,
    pub generation_timeout: Duration,
    pub max_upload_bytes: usize,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let port: u16 = parse_or(&get, "PORT", DEFAULT_PORT)?;
        let host = get("BIND_HOST").unwrap_or_else(|| DEFAULT_HOST.to_string());
        let bind_address = format!("{}:{}", host.trim(), port);

        let public_base_url = match get("PUBLIC_BASE_URL") {
            Some(value) => normalize_base_url(&value),
            None => normalize_base_url(&bind_address),
        };

        let backend_url = get("BACKEND_URL")
            .map(|value| validate_http_url("BACKEND_URL", &value))
            .transpose()?;

        Ok(Self {
            bind_address,
            public_base_url,
            backend_url,
            processing_delay: Duration::from_millis(parse_or(
                &get,
                "PROCESSING_DELAY_MS",
                DEFAULT_PROCESSING_DELAY_MS,
            )?),
            placeholder_output_url: get("PLACEHOLDER_OUTPUT_URL")
                .map(|value| value.trim().to_string())
                .unwrap_or_else(|| DEFAULT_PLACEHOLDER_URL.to_string()),
            generation_timeout: Duration::from_millis(parse_or(
                &get,
                "GENERATION_TIMEOUT_MS",
                DEFAULT_GENERATION_TIMEOUT_MS,
            )?),
            max_upload_bytes: parse_or(&get, "MAX_UPLOAD_BYTES", DEFAULT_MAX_UPLOAD_BYTES)?,
        })
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        let bind_address = format!("{DEFAULT_HOST}:{DEFAULT_PORT}");
        Self {
            public_base_url: normalize_base_url(&bind_address),
            bind_address,
            backend_url: None,
            processing_delay: Duration::from_millis(DEFAULT_PROCESSING_DELAY_MS),
            placeholder_output_url: DEFAULT_PLACEHOLDER_URL.to_string(),
            generation_timeout: Duration::from_millis(DEFAULT_GENERATION_TIMEOUT_MS),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
        }
    }
}

fn parse_or<T, G>(get: &G, key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        None => Ok(default),
        Some(value) => match value.trim().parse::<T>() {
            Ok(parsed) => Ok(parsed),
            Err(err) => Err(ConfigError::Invalid {
                key,
                reason: err.to_string(),
                value,
            }),
        },
    }
}

fn validate_http_url(key: &'static str, raw: &str) -> Result<Url, ConfigError> {
    let invalid = |reason: String| ConfigError::Invalid {
        key,
        value: raw.to_string(),
        reason,
    };
    let parsed = Url::parse(raw.trim()).map_err(|err| invalid(err.to_string()))?;
    match parsed.scheme() {
        "http" | "https" => Ok(parsed),
        scheme => Err(invalid(format!("only http or https is allowed, got {scheme}"))),
    }
}

/// Adds a scheme when missing and collapses doubled schemes such as
/// `http://https://host`.
pub fn normalize_base_url(raw: &str) -> String {
    let trimmed = raw.trim().trim_end_matches('/');
    let mut base = if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        trimmed.to_string()
    } else {
        format!("http://{trimmed}")
    };
    for (doubled, single) in [
        ("http://http://", "http://"),
        ("https://https://", "https://"),
        ("http://https://", "https://"),
        ("https://http://", "http://"),
    ] {
        while base.starts_with(doubled) {
            base = base.replacen(doubled, single, 1);
        }
    }
    base
}
