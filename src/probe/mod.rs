//! Health probing of individual candidate servers
//!
//! A probe is one bounded status request against one server. It never fails
//! with an error: network trouble, a non-success status code or an
//! unparseable body all come back as `reachable = false`, because callers
//! aggregate many probes and one dead server must not abort the batch.

use reqwest::Client;
use std::time::{Duration, Instant};

use crate::error::{Error, Result};
use crate::models::{Candidate, StatusPayload};

/// Path of the status endpoint relative to a candidate's domain
pub const STATUS_PATH: &str = "/comms/status";

/// Outcome of probing a single server
///
/// Failure is a value here, not an exception; `reachable` tells the caller
/// whether `version` and `status` carry live data.
#[derive(Debug, Clone)]
pub struct ProbeReport {
    /// Domain that was probed
    pub domain: String,
    /// Whether the server answered with a parseable status in time
    pub reachable: bool,
    /// Declared protocol version, when reachable
    pub version: Option<semver::Version>,
    /// Raw status payload, when reachable
    pub status: Option<StatusPayload>,
    /// Wall-clock time the probe took
    pub latency: Duration,
}

impl ProbeReport {
    fn unreachable(domain: String, latency: Duration) -> Self {
        ProbeReport {
            domain,
            reachable: false,
            version: None,
            status: None,
            latency,
        }
    }
}

/// Issues status queries against candidate servers
#[derive(Clone)]
pub struct HealthProbe {
    client: Client,
}

impl HealthProbe {
    /// Create a probe with the given per-request timeout
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::config(format!("failed to build probe client: {e}")))?;

        Ok(Self { client })
    }

    /// Status endpoint URL for a domain
    pub fn status_url(domain: &str) -> String {
        format!("{}{STATUS_PATH}", domain.trim_end_matches('/'))
    }

    /// Probe a single server
    ///
    /// One GET of the status endpoint with the configured timeout. No retry:
    /// a server that misses its window in this scan is simply unreachable.
    pub async fn probe(&self, domain: &str) -> ProbeReport {
        let url = Self::status_url(domain);
        let start = Instant::now();

        let response = match self.client.get(&url).send().await {
            Ok(response) => response,
            Err(e) => {
                tracing::debug!(domain = %domain, error = %e, "probe failed to connect");
                return ProbeReport::unreachable(domain.to_string(), start.elapsed());
            }
        };

        if !response.status().is_success() {
            tracing::debug!(
                domain = %domain,
                status = response.status().as_u16(),
                "probe got non-success status"
            );
            return ProbeReport::unreachable(domain.to_string(), start.elapsed());
        }

        let payload = match response.json::<StatusPayload>().await {
            Ok(payload) => payload,
            Err(e) => {
                tracing::debug!(domain = %domain, error = %e, "probe got unparseable body");
                return ProbeReport::unreachable(domain.to_string(), start.elapsed());
            }
        };

        let latency = start.elapsed();
        tracing::debug!(
            domain = %domain,
            version = %payload.version(),
            latency_ms = latency.as_millis() as u64,
            "probe ok"
        );

        ProbeReport {
            domain: domain.to_string(),
            reachable: true,
            version: Some(payload.version()),
            status: Some(payload),
            latency,
        }
    }

    /// Probe a server and build a [`Candidate`] from its status
    ///
    /// Returns `None` when the server is unreachable; missing payload fields
    /// fall back to the domain's host name and a default layer.
    pub async fn probe_candidate(&self, domain: &str) -> Option<Candidate> {
        let report = self.probe(domain).await;
        if !report.reachable {
            return None;
        }
        let payload = report.status?;
        Some(candidate_from_status(&report.domain, &payload))
    }
}

/// Build a candidate from a probed status payload
pub fn candidate_from_status(domain: &str, payload: &StatusPayload) -> Candidate {
    let fallback_name = url::Url::parse(domain)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.to_string()))
        .unwrap_or_else(|| domain.to_string());

    Candidate {
        domain: domain.trim_end_matches('/').to_string(),
        catalyst_name: payload.name.clone().unwrap_or(fallback_name),
        layer: payload.layer.clone().unwrap_or_else(|| "main".to_string()),
        lighthouse_version: payload.version(),
        users_count: payload.users_count.unwrap_or(0),
        max_users: payload.max_users.unwrap_or(0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use semver::Version;

    #[test]
    fn test_status_url() {
        assert_eq!(
            HealthProbe::status_url("https://peer.example.com"),
            "https://peer.example.com/comms/status"
        );
        assert_eq!(
            HealthProbe::status_url("https://peer.example.com/"),
            "https://peer.example.com/comms/status"
        );
    }

    #[test]
    fn test_candidate_from_full_status() {
        let payload: StatusPayload = serde_json::from_str(
            r#"{
                "name": "fenrir",
                "layer": "amber",
                "env": {"catalystVersion": "1.2.0"},
                "usersCount": 12,
                "maxUsers": 400
            }"#,
        )
        .unwrap();

        let candidate = candidate_from_status("https://peer.example.com/", &payload);
        assert_eq!(candidate.domain, "https://peer.example.com");
        assert_eq!(candidate.catalyst_name, "fenrir");
        assert_eq!(candidate.layer, "amber");
        assert_eq!(candidate.lighthouse_version, Version::new(1, 2, 0));
        assert_eq!(candidate.users_count, 12);
        assert_eq!(candidate.max_users, 400);
    }

    #[test]
    fn test_candidate_from_sparse_status_uses_fallbacks() {
        let payload: StatusPayload = serde_json::from_str("{}").unwrap();
        let candidate = candidate_from_status("https://peer.example.com", &payload);

        assert_eq!(candidate.catalyst_name, "peer.example.com");
        assert_eq!(candidate.layer, "main");
        assert_eq!(candidate.lighthouse_version, Version::new(0, 0, 0));
        assert_eq!(candidate.users_count, 0);
        assert_eq!(candidate.max_users, 0);
    }

    #[tokio::test]
    async fn test_probe_unreachable_is_a_value() {
        // Port 1 is reserved and closed; must come back as a report, not Err.
        let probe = HealthProbe::new(Duration::from_millis(200)).unwrap();
        let report = probe.probe("http://127.0.0.1:1").await;

        assert!(!report.reachable);
        assert!(report.version.is_none());
        assert!(report.status.is_none());
    }
}
