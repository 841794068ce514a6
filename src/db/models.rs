//! Log record types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A monitored HTTP endpoint as listed in the configuration file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl Endpoint {
    pub fn new(url: &str, name: Option<&str>) -> Self {
        Self {
            url: url.to_string(),
            name: name.map(str::to_string),
        }
    }

    /// Name shown in logs, falling back to the URL.
    pub fn display_name(&self) -> &str {
        match self.name.as_deref() {
            Some(name) if !name.is_empty() => name,
            _ => &self.url,
        }
    }
}

/// The outcome of probing one endpoint during one cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckResult {
    pub url: String,
    pub name: String,
    /// HTTP status code, or 0 if no response was received.
    pub status: u16,
    /// Milliseconds from request start until it settled.
    pub response_time: u64,
    /// Cycle start time, shared by the whole batch.
    pub timestamp: DateTime<Utc>,
    pub success: bool,
    pub message: String,
}

impl CheckResult {
    pub fn ok(
        endpoint: &Endpoint,
        timestamp: DateTime<Utc>,
        status: u16,
        response_time: u64,
    ) -> Self {
        Self {
            url: endpoint.url.clone(),
            name: endpoint.display_name().to_string(),
            status,
            response_time,
            timestamp,
            success: true,
            message: "OK".to_string(),
        }
    }

    pub fn failed(
        endpoint: &Endpoint,
        timestamp: DateTime<Utc>,
        status: u16,
        response_time: u64,
        message: String,
    ) -> Self {
        Self {
            url: endpoint.url.clone(),
            name: endpoint.display_name().to_string(),
            status,
            response_time,
            timestamp,
            success: false,
            message,
        }
    }
}
