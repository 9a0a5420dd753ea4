//! Candidate scanning: discovery fetch plus parallel health probes
//!
//! A scan is the only operation allowed to take unbounded wall-clock time
//! relative to one probe timeout, so it runs either in the foreground during
//! a blocking first-time selection, or in the background after a cache hit
//! already unblocked the client.
//!
//! The discovery endpoint is untrusted input: malformed entries are dropped
//! with a warning, and probe fan-out is capped so a hostile response listing
//! thousands of domains cannot exhaust the client.

use chrono::{DateTime, Utc};
use futures::future::join_all;
use reqwest::Client;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Semaphore;

use crate::config::{DiscoveryConfig, SelectionConfig};
use crate::gate;
use crate::models::{Candidate, CandidateSet};
use crate::probe::HealthProbe;

/// Errors while obtaining the base candidate list
///
/// These are fatal once they surface through the synchronous scan tier: with
/// no candidates there is no realm to select.
#[derive(Error, Debug, Clone)]
pub enum DiscoveryError {
    /// The discovery endpoint could not be reached or answered non-success
    #[error("failed to fetch discovery endpoint {endpoint}: {reason}")]
    FetchFailed { endpoint: String, reason: String },

    /// The discovery endpoint answered with something other than a JSON list
    #[error("discovery endpoint {endpoint} returned an invalid body: {reason}")]
    InvalidBody { endpoint: String, reason: String },
}

/// Outcome of one full scan
#[derive(Debug, Clone)]
pub struct ScanReport {
    /// Reachable, version-gated candidates
    pub set: CandidateSet,
    /// When the scan finished
    pub scanned_at: DateTime<Utc>,
}

/// Fans out health probes across every known server endpoint
pub struct CandidateScanner {
    probe: HealthProbe,
    client: Client,
    config: DiscoveryConfig,
}

impl CandidateScanner {
    pub fn new(config: DiscoveryConfig) -> crate::error::Result<Self> {
        let probe = HealthProbe::new(config.probe_timeout())?;
        // Discovery gets a little more slack than a single probe.
        let client = Client::builder()
            .timeout(config.probe_timeout() * 2)
            .build()
            .map_err(|e| {
                crate::error::Error::config(format!("failed to build discovery client: {e}"))
            })?;

        Ok(Self {
            probe,
            client,
            config,
        })
    }

    /// Scan every known endpoint and assemble the scored candidate set
    ///
    /// With a pinned domain the discovery fetch, the added-servers list and
    /// the version gate are all skipped: only the pin is probed. Otherwise
    /// the discovery list and the user-added servers are probed concurrently
    /// (capped fan-out), unreachable domains are dropped silently, and both
    /// partitions pass the version gate before being returned.
    pub async fn scan(&self, selection: &SelectionConfig) -> Result<ScanReport, DiscoveryError> {
        if let Some(pin) = &selection.pinned_domain {
            tracing::info!(domain = %pin, "server pinned, skipping discovery");
            let discovered = match self.probe.probe_candidate(pin).await {
                Some(candidate) => vec![candidate],
                None => {
                    tracing::warn!(domain = %pin, "pinned server is unreachable");
                    Vec::new()
                }
            };
            return Ok(ScanReport {
                set: CandidateSet {
                    discovered,
                    user_added: Vec::new(),
                },
                scanned_at: Utc::now(),
            });
        }

        let domains = self.fetch_discovery().await?;
        tracing::info!(
            endpoint = %self.config.nodes_endpoint,
            discovered = domains.len(),
            added = self.config.added_servers.len(),
            "scanning candidates"
        );

        let min = selection.min_version.as_ref();
        let discovered = gate::filter(self.probe_all(&domains).await, min);
        let user_added = gate::filter(self.probe_all(&self.config.added_servers).await, min);

        tracing::info!(
            discovered = discovered.len(),
            user_added = user_added.len(),
            "scan complete"
        );

        Ok(ScanReport {
            set: CandidateSet {
                discovered,
                user_added,
            },
            scanned_at: Utc::now(),
        })
    }

    /// Fetch the base candidate domain list from the discovery endpoint
    ///
    /// Accepts a JSON array of bare strings or of objects carrying a
    /// `domain` or `address` field; anything else in the list is dropped
    /// with a warning rather than failing the whole fetch.
    async fn fetch_discovery(&self) -> Result<Vec<String>, DiscoveryError> {
        let endpoint = &self.config.nodes_endpoint;

        let response = self
            .client
            .get(endpoint)
            .send()
            .await
            .map_err(|e| DiscoveryError::FetchFailed {
                endpoint: endpoint.clone(),
                reason: e.to_string(),
            })?;

        if !response.status().is_success() {
            return Err(DiscoveryError::FetchFailed {
                endpoint: endpoint.clone(),
                reason: format!("status {}", response.status().as_u16()),
            });
        }

        let entries: Vec<serde_json::Value> =
            response
                .json()
                .await
                .map_err(|e| DiscoveryError::InvalidBody {
                    endpoint: endpoint.clone(),
                    reason: e.to_string(),
                })?;

        let mut domains = Vec::with_capacity(entries.len());
        for entry in entries {
            match parse_discovery_entry(&entry) {
                Some(domain) => domains.push(domain),
                None => {
                    tracing::warn!(entry = %entry, "dropping malformed discovery entry");
                }
            }
        }
        Ok(domains)
    }

    /// Probe a list of domains concurrently, bounded by the configured cap
    ///
    /// Domains that fail probing are dropped; they are not retried within
    /// this pass.
    async fn probe_all(&self, domains: &[String]) -> Vec<Candidate> {
        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent_probes));

        let probes = domains.iter().map(|domain| {
            let probe = self.probe.clone();
            let semaphore = Arc::clone(&semaphore);
            async move {
                // Semaphore is never closed while we hold it.
                let _permit = semaphore.acquire().await.ok()?;
                probe.probe_candidate(domain).await
            }
        });

        join_all(probes).await.into_iter().flatten().collect()
    }
}

/// Extract a candidate domain from one discovery entry
fn parse_discovery_entry(entry: &serde_json::Value) -> Option<String> {
    let raw = match entry {
        serde_json::Value::String(s) => s.as_str(),
        serde_json::Value::Object(map) => map
            .get("domain")
            .or_else(|| map.get("address"))
            .and_then(|v| v.as_str())?,
        _ => return None,
    };

    let trimmed = raw.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return None;
    }
    // Bare hosts from the server registry come without a scheme.
    let with_scheme = if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("https://{trimmed}")
    };

    url::Url::parse(&with_scheme).ok()?;
    Some(with_scheme)
}
