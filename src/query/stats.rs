//! Per-endpoint aggregate statistics.

use std::fmt;

use serde::Serialize;

use crate::db::{CheckResult, Endpoint};

/// Outcome of the most recent check for an endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LastStatus {
    Healthy,
    Error,
    #[serde(rename = "No Data")]
    NoData,
}

impl fmt::Display for LastStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LastStatus::Healthy => f.write_str("Healthy"),
            LastStatus::Error => f.write_str("Error"),
            LastStatus::NoData => f.write_str("No Data"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EndpointStats {
    pub total_pings: usize,
    pub success_pings: usize,
    pub error_pings: usize,
    /// Rounded percentage, 0 when there is no data.
    pub success_rate: u8,
    pub last_status: LastStatus,
}

/// An endpoint paired with its stats.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EndpointSummary {
    #[serde(flatten)]
    pub endpoint: Endpoint,
    pub stats: EndpointStats,
}

/// Aggregate every logged result whose url matches the endpoint.
pub fn compute_endpoint_stats(log: &[CheckResult], endpoint: &Endpoint) -> EndpointStats {
    let mut total = 0;
    let mut success = 0;
    let mut last = None;

    for result in log.iter().filter(|r| r.url == endpoint.url) {
        total += 1;
        if result.success {
            success += 1;
        }
        last = Some(result.success);
    }

    EndpointStats {
        total_pings: total,
        success_pings: success,
        error_pings: total - success,
        success_rate: success_rate(success, total),
        last_status: match last {
            Some(true) => LastStatus::Healthy,
            Some(false) => LastStatus::Error,
            None => LastStatus::NoData,
        },
    }
}

/// Stats for each endpoint, in the order given.
pub fn compute_all_stats(log: &[CheckResult], endpoints: &[Endpoint]) -> Vec<EndpointSummary> {
    endpoints
        .iter()
        .map(|endpoint| EndpointSummary {
            endpoint: endpoint.clone(),
            stats: compute_endpoint_stats(log, endpoint),
        })
        .collect()
}

/// Percentage rounded half up.
fn success_rate(success: usize, total: usize) -> u8 {
    if total == 0 {
        return 0;
    }
    ((200 * success + total) / (2 * total)) as u8
}
