//! Download throughput probe.

use std::time::{Duration, Instant};

use super::ProbeError;

/// Smallest window used for the rate, so tiny cached bodies do not report
/// absurd speeds.
const MIN_WINDOW: Duration = Duration::from_millis(1);

/// Download `url` in full and return the transfer rate in Mbps.
pub async fn download_mbps(client: &reqwest::Client, url: &str, timeout: Duration) -> Result<f64, ProbeError> {
    let start = Instant::now();

    let response = client
        .get(url)
        .timeout(timeout)
        .send()
        .await
        .and_then(|r| r.error_for_status())
        .map_err(|e| map_reqwest(e, timeout))?;

    let body = response.bytes().await.map_err(|e| map_reqwest(e, timeout))?;
    if body.is_empty() {
        return Err(ProbeError::Network(format!("empty body from {}", url)));
    }

    Ok(mbps(body.len(), start.elapsed()))
}

fn mbps(bytes: usize, elapsed: Duration) -> f64 {
    let secs = elapsed.max(MIN_WINDOW).as_secs_f64();
    (bytes as f64 * 8.0) / secs / 1_000_000.0
}

fn map_reqwest(e: reqwest::Error, timeout: Duration) -> ProbeError {
    if e.is_timeout() {
        ProbeError::Timeout(timeout)
    } else {
        ProbeError::Network(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mbps() {
        assert_eq!(mbps(1_000_000, Duration::from_secs(1)), 8.0);
        assert_eq!(mbps(250_000, Duration::from_millis(500)), 4.0);
        assert_eq!(mbps(125, Duration::ZERO), 1.0);
    }

    #[tokio::test]
    async fn test_invalid_url() {
        let client = reqwest::Client::new();
        let result = download_mbps(&client, "http://256.256.256.256/", Duration::from_millis(100)).await;
        assert!(result.is_err());
    }
}
