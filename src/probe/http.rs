//! HTTP probe implementation.

use std::error::Error as _;
use std::time::Duration;

use super::ProbeError;

/// Run an HTTP GET against `url` and read the full body.
///
/// Returns the response status code.
pub async fn run_http_probe(
    client: &reqwest::Client,
    url: &str,
    timeout: Duration,
) -> Result<u16, ProbeError> {
    let response = client.get(url).send().await.map_err(|e| {
        if e.is_timeout() {
            ProbeError::Timeout(timeout)
        } else {
            ProbeError::Network(describe(&e))
        }
    })?;

    let status = response.status().as_u16();

    // Read the full body to measure complete transfer time
    response.bytes().await.map_err(|e| ProbeError::Body {
        status,
        message: if e.is_timeout() {
            ProbeError::Timeout(timeout).to_string()
        } else {
            describe(&e)
        },
    })?;

    Ok(status)
}

/// Flatten an error and its sources into one line.
fn describe(err: &reqwest::Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}
