//! Probe module for endpoint health checks.
//!
//! A [`Prober`] turns one HTTP GET into one [`CheckResult`]. Failures are
//! recorded in the result, never returned as errors.

mod http;

pub use http::*;

use std::fmt;
use std::str::FromStr;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::db::{CheckResult, Endpoint};

/// Probe error types.
#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("timeout of {}ms exceeded", .0.as_millis())]
    Timeout(Duration),
    #[error("{0}")]
    Network(String),
    #[error("error reading response body: {message}")]
    Body { status: u16, message: String },
    #[error("Request failed with status code {status}")]
    Status { status: u16 },
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl ProbeError {
    /// Status code carried by a partial response, or 0.
    pub fn status(&self) -> u16 {
        match self {
            ProbeError::Body { status, .. } | ProbeError::Status { status } => *status,
            _ => 0,
        }
    }
}

/// Decides which completed responses count as successful.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SuccessPolicy {
    /// Any response the transport delivered is a success.
    #[default]
    AnyResponse,
    /// Only 2xx and 3xx responses are successes.
    StatusClass,
}

impl SuccessPolicy {
    fn check(self, status: u16) -> Result<u16, ProbeError> {
        match self {
            SuccessPolicy::AnyResponse => Ok(status),
            SuccessPolicy::StatusClass if (200..400).contains(&status) => Ok(status),
            SuccessPolicy::StatusClass => Err(ProbeError::Status { status }),
        }
    }
}

impl FromStr for SuccessPolicy {
    type Err = ProbeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "any-response" => Ok(SuccessPolicy::AnyResponse),
            "status-class" => Ok(SuccessPolicy::StatusClass),
            other => Err(ProbeError::Config(format!("unknown success policy: {}", other))),
        }
    }
}

impl fmt::Display for SuccessPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SuccessPolicy::AnyResponse => f.write_str("any-response"),
            SuccessPolicy::StatusClass => f.write_str("status-class"),
        }
    }
}

/// Issues health-check requests with a shared HTTP client.
#[derive(Debug, Clone)]
pub struct Prober {
    client: reqwest::Client,
    timeout: Duration,
    policy: SuccessPolicy,
}

impl Prober {
    pub fn new(timeout: Duration, policy: SuccessPolicy) -> Result<Self, ProbeError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("pingtrail/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ProbeError::Config(e.to_string()))?;

        Ok(Self {
            client,
            timeout,
            policy,
        })
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Probe one endpoint, stamping the result with the cycle time.
    pub async fn probe(&self, endpoint: &Endpoint, timestamp: DateTime<Utc>) -> CheckResult {
        let start = Instant::now();
        let outcome = run_http_probe(&self.client, &endpoint.url, self.timeout)
            .await
            .and_then(|status| self.policy.check(status));
        let response_time = start.elapsed().as_millis() as u64;

        match outcome {
            Ok(status) => CheckResult::ok(endpoint, timestamp, status, response_time),
            Err(e) => {
                CheckResult::failed(endpoint, timestamp, e.status(), response_time, e.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn server_returning(status: u16) -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(status).set_body_string("pong"))
            .mount(&server)
            .await;
        server
    }

    #[tokio::test]
    async fn test_probe_success() {
        let server = server_returning(200).await;
        let endpoint = Endpoint::new(&format!("{}/health", server.uri()), Some("Local"));
        let prober = Prober::new(Duration::from_secs(5), SuccessPolicy::AnyResponse).unwrap();
        let ts = Utc::now();

        let result = prober.probe(&endpoint, ts).await;
        assert!(result.success);
        assert_eq!(result.status, 200);
        assert_eq!(result.message, "OK");
        assert_eq!(result.name, "Local");
        assert_eq!(result.timestamp, ts);
    }

    #[tokio::test]
    async fn test_any_response_counts_server_errors_as_success() {
        let server = server_returning(500).await;
        let endpoint = Endpoint::new(&format!("{}/health", server.uri()), None);
        let prober = Prober::new(Duration::from_secs(5), SuccessPolicy::AnyResponse).unwrap();

        let result = prober.probe(&endpoint, Utc::now()).await;
        assert!(result.success);
        assert_eq!(result.status, 500);
        assert_eq!(result.message, "OK");
    }

    #[tokio::test]
    async fn test_status_class_policy_fails_server_errors() {
        let server = server_returning(503).await;
        let endpoint = Endpoint::new(&format!("{}/health", server.uri()), None);
        let prober = Prober::new(Duration::from_secs(5), SuccessPolicy::StatusClass).unwrap();

        let result = prober.probe(&endpoint, Utc::now()).await;
        assert!(!result.success);
        assert_eq!(result.status, 503);
        assert_eq!(result.message, "Request failed with status code 503");
    }

    #[tokio::test]
    async fn test_probe_timeout_records_duration() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
            .mount(&server)
            .await;
        let endpoint = Endpoint::new(&server.uri(), None);
        let prober = Prober::new(Duration::from_millis(200), SuccessPolicy::AnyResponse).unwrap();

        let result = prober.probe(&endpoint, Utc::now()).await;
        assert!(!result.success);
        assert_eq!(result.status, 0);
        assert_eq!(result.message, "timeout of 200ms exceeded");
        assert!(result.response_time >= 200);
    }

    #[tokio::test]
    async fn test_probe_connection_refused() {
        // Bind then drop a listener to get a port nobody is serving.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let endpoint = Endpoint::new(&format!("http://{}", addr), None);
        let prober = Prober::new(Duration::from_secs(2), SuccessPolicy::AnyResponse).unwrap();

        let result = prober.probe(&endpoint, Utc::now()).await;
        assert!(!result.success);
        assert_eq!(result.status, 0);
        assert!(!result.message.is_empty());
        assert_ne!(result.message, "OK");
    }

    #[test]
    fn test_success_policy_parse() {
        assert_eq!("any-response".parse::<SuccessPolicy>().unwrap(), SuccessPolicy::AnyResponse);
        assert_eq!("status-class".parse::<SuccessPolicy>().unwrap(), SuccessPolicy::StatusClass);
        assert!("strict".parse::<SuccessPolicy>().is_err());
        assert_eq!(SuccessPolicy::StatusClass.to_string(), "status-class");
    }

    #[test]
    fn test_status_class_accepts_redirect_codes() {
        assert_eq!(SuccessPolicy::StatusClass.check(304).unwrap(), 304);
        assert_eq!(SuccessPolicy::StatusClass.check(404).unwrap_err().status(), 404);
    }
}
