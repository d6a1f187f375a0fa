//! Readiness polling.

use crate::error::DigitizeError;
use reqwest::StatusCode;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::debug;

/// Poll `url` with GET until it answers HTTP 200 or `timeout` elapses.
///
/// Probes are spaced `interval` apart. The last transport error or non-200
/// status is carried in [`DigitizeError::ServiceTimeout`].
pub async fn wait_for_ready(
    client: &reqwest::Client,
    model_id: &str,
    url: &str,
    timeout: Duration,
    interval: Duration,
) -> Result<(), DigitizeError> {
    let deadline = Instant::now().checked_add(timeout);
    let mut last_error: Option<String> = None;
    let mut attempts = 0u32;

    // No representable deadline means the poll never gives up.
    while deadline.map_or(true, |d| Instant::now() < d) {
        attempts += 1;
        match client.get(url).send().await {
            Ok(resp) if resp.status() == StatusCode::OK => {
                debug!("{} ready after {} probe(s)", url, attempts);
                return Ok(());
            }
            Ok(resp) => {
                debug!("Probe {} → HTTP {}", url, resp.status().as_u16());
                last_error = Some(format!("HTTP {}", resp.status().as_u16()));
            }
            Err(e) => {
                debug!("Probe {} failed: {}", url, e);
                last_error = Some(e.to_string());
            }
        }
        sleep(interval).await;
    }

    Err(DigitizeError::ServiceTimeout {
        model: model_id.to_string(),
        url: url.to_string(),
        secs: timeout.as_secs_f64(),
        last_error,
    })
}
