//! Configuration module for pingtrail.
//!
//! Process settings come from environment variables with sensible defaults.
//! The endpoint list lives in a JSON file that is re-read every cycle.

use std::env;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use reqwest::Url;
use serde::Deserialize;
use thiserror::Error;

use crate::db::{Endpoint, DEFAULT_CAPACITY};
use crate::probe::SuccessPolicy;

/// Configuration error types.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read endpoint config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse endpoint config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
}

/// Server configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// HTTP port for the query API (default: 8080)
    pub http_port: u16,
    /// Endpoint list file (default: "docs/config.json")
    pub config_path: PathBuf,
    /// Persisted log file (default: "docs/logs.json")
    pub logs_path: PathBuf,
    /// Time between probe cycles (default: 60s)
    pub interval: Duration,
    /// Per-request timeout (default: 10s)
    pub timeout: Duration,
    /// Number of results retained (default: 1000)
    pub max_entries: usize,
    /// How HTTP status codes map to success (default: any-response)
    pub success_policy: SuccessPolicy,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_port: 8080,
            config_path: PathBuf::from("docs/config.json"),
            logs_path: PathBuf::from("docs/logs.json"),
            interval: Duration::from_secs(60),
            timeout: Duration::from_millis(10_000),
            max_entries: DEFAULT_CAPACITY,
            success_policy: SuccessPolicy::AnyResponse,
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables.
    ///
    /// Environment variables:
    /// - `PINGTRAIL_HTTP_PORT`: HTTP port (default: 8080)
    /// - `PINGTRAIL_CONFIG_PATH`: endpoint list (default: "docs/config.json")
    /// - `PINGTRAIL_LOGS_PATH`: log file (default: "docs/logs.json")
    /// - `PINGTRAIL_INTERVAL_SECS`: cycle period in seconds (default: 60)
    /// - `PINGTRAIL_TIMEOUT_MS`: probe timeout in milliseconds (default: 10000)
    /// - `PINGTRAIL_MAX_ENTRIES`: retained results (default: 1000)
    /// - `PINGTRAIL_SUCCESS_POLICY`: "any-response" or "status-class"
    pub fn load() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Self::default();

        if let Some(port) = parse_var(&lookup, "PINGTRAIL_HTTP_PORT") {
            cfg.http_port = port;
        }

        if let Some(path) = lookup("PINGTRAIL_CONFIG_PATH") {
            cfg.config_path = PathBuf::from(path);
        }

        if let Some(path) = lookup("PINGTRAIL_LOGS_PATH") {
            cfg.logs_path = PathBuf::from(path);
        }

        if let Some(secs) = parse_var::<u64, _>(&lookup, "PINGTRAIL_INTERVAL_SECS") {
            if secs > 0 {
                cfg.interval = Duration::from_secs(secs);
            }
        }

        if let Some(ms) = parse_var::<u64, _>(&lookup, "PINGTRAIL_TIMEOUT_MS") {
            if ms > 0 {
                cfg.timeout = Duration::from_millis(ms);
            }
        }

        if let Some(max) = parse_var::<usize, _>(&lookup, "PINGTRAIL_MAX_ENTRIES") {
            if max > 0 {
                cfg.max_entries = max;
            }
        }

        if let Some(policy) = parse_var(&lookup, "PINGTRAIL_SUCCESS_POLICY") {
            cfg.success_policy = policy;
        }

        cfg
    }
}

fn parse_var<T, F>(lookup: &F, key: &str) -> Option<T>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!("Ignoring invalid value {:?} for {}", raw, key);
            None
        }
    }
}

#[derive(Debug, Deserialize)]
struct EndpointsFile {
    #[serde(default)]
    endpoints: Vec<Endpoint>,
}

/// Load the ordered endpoint list from a JSON file.
///
/// Entries with an empty or non-HTTP URL are skipped.
pub fn load_endpoints<P: AsRef<Path>>(path: P) -> Result<Vec<Endpoint>, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    let file: EndpointsFile = serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;

    let endpoints = file
        .endpoints
        .into_iter()
        .filter(|endpoint| {
            let valid = Url::parse(&endpoint.url)
                .map(|url| matches!(url.scheme(), "http" | "https"))
                .unwrap_or(false);
            if !valid {
                tracing::warn!("Skipping endpoint with invalid url {:?}", endpoint.url);
            }
            valid
        })
        .collect();

    Ok(endpoints)
}
