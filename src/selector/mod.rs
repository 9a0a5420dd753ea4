//! The realm selection algorithm
//!
//! Given the selection configuration, the cached state and (when needed) a
//! fresh scan, decide which realm to commit to. The priority order, first
//! match wins:
//!
//! 1. Preview mode: stub realm, no network, no cache.
//! 2. Cache fast path: a cached realm compatible with the pin, resolved
//!    against the explicit realm string when one is configured, then
//!    re-validated live. The caller refreshes candidates in the background.
//! 3. Full scan: synchronous discovery + probing; explicit realm first,
//!    otherwise the best-scored candidate.
//!
//! Every path that commits a realm re-validates liveness first (the scan
//! paths validate by construction, since candidates are built from live
//! probes); a cached domain may have gone offline between sessions, so
//! configuration is never trusted blindly.

use thiserror::Error;

use crate::config::{DiscoveryConfig, SelectionConfig};
use crate::gate;
use crate::models::{CacheEntry, Candidate, CandidateSet, Realm};
use crate::probe::HealthProbe;
use crate::scanner::{CandidateScanner, DiscoveryError};

/// Selection-level failures; both variants are fatal to startup
#[derive(Error, Debug, Clone)]
pub enum SelectionError {
    /// The fallback scan could not obtain any candidate list
    #[error("{0}")]
    Discovery(#[from] DiscoveryError),

    /// Every selection tier exhausted without a valid realm
    #[error("no realm available: every selection path was exhausted")]
    NoRealmAvailable,
}

/// Which priority tier produced the realm
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionPath {
    /// Stub realm, preview mode
    Preview,
    /// Cached realm validated live; candidates refresh in the background
    CacheHit,
    /// Synchronous scan picked the realm
    FullScan,
}

/// A committed decision, tagged with the tier that produced it
#[derive(Debug, Clone)]
pub struct SelectionOutcome {
    pub realm: Realm,
    pub path: SelectionPath,
    /// Candidates produced by a synchronous scan, for the caller to persist;
    /// `None` on the preview and cache-hit paths
    pub fresh: Option<CandidateSet>,
}

/// The decision core: selects a realm out of cache, configuration and scans
pub struct RealmSelector {
    scanner: CandidateScanner,
    probe: HealthProbe,
}

impl RealmSelector {
    pub fn new(discovery: DiscoveryConfig) -> crate::error::Result<Self> {
        let probe = HealthProbe::new(discovery.probe_timeout())?;
        let scanner = CandidateScanner::new(discovery)?;
        Ok(Self { scanner, probe })
    }

    /// Run the priority tiers against the given cached state
    pub async fn select(
        &self,
        config: &SelectionConfig,
        cached: &CacheEntry,
    ) -> Result<SelectionOutcome, SelectionError> {
        // Tier 1: preview short-circuits everything.
        if config.preview_mode {
            tracing::info!("preview mode, using stub realm");
            return Ok(SelectionOutcome {
                realm: Realm::preview(),
                path: SelectionPath::Preview,
                fresh: None,
            });
        }

        // Tier 2: cached realm, when the pin allows it.
        if let Some(outcome) = self.try_cached(config, cached).await {
            return Ok(outcome);
        }

        // Tier 3: synchronous scan. A discovery failure here is fatal: the
        // client cannot proceed without any candidate.
        let report = self.scanner.scan(config).await?;
        let all = report.set.all();

        let realm = self
            .resolve_configured(config, &all)
            .or_else(|| pick_best(&all));

        match realm {
            Some(realm) => {
                tracing::info!(domain = %realm.domain, "selected realm from scan");
                Ok(SelectionOutcome {
                    realm,
                    path: SelectionPath::FullScan,
                    fresh: Some(report.set),
                })
            }
            None => Err(SelectionError::NoRealmAvailable),
        }
    }

    /// Tier 2: derive and validate a realm from the cache without scanning
    ///
    /// Returns `None` on any mismatch - no cached realm, a pin pointing
    /// elsewhere, an explicit realm that does not resolve against the cached
    /// candidates, or a realm that fails live validation. Falling through is
    /// expected behavior, not an error.
    async fn try_cached(
        &self,
        config: &SelectionConfig,
        cached: &CacheEntry,
    ) -> Option<SelectionOutcome> {
        let cached_realm = cached.realm.as_ref()?;
        if !config.pin_allows(&cached_realm.domain) {
            tracing::debug!(
                cached = %cached_realm.domain,
                "cached realm does not match pin, ignoring cache"
            );
            return None;
        }

        // An explicit realm string resolves offline against the cached
        // candidate list; otherwise the cached realm itself is the pick.
        let configured = match &config.explicit_realm {
            Some(wanted) => resolve_realm_string(wanted, &cached.candidates)?,
            None => cached_realm.clone(),
        };

        // The explicit realm may resolve to a different domain than the
        // cached one; the pin binds whatever this tier would commit.
        if !config.pin_allows(&configured.domain) {
            tracing::debug!(
                configured = %configured.domain,
                "configured realm does not match pin, ignoring cache"
            );
            return None;
        }

        if !self.validate(&configured, config).await {
            tracing::info!(
                domain = %configured.domain,
                "cached realm failed validation, falling through to scan"
            );
            return None;
        }

        tracing::info!(domain = %configured.domain, "selected realm from cache");
        Some(SelectionOutcome {
            realm: configured,
            path: SelectionPath::CacheHit,
            fresh: None,
        })
    }

    /// Resolve the explicit realm string against a candidate list, if set
    fn resolve_configured(&self, config: &SelectionConfig, candidates: &[Candidate]) -> Option<Realm> {
        config
            .explicit_realm
            .as_deref()
            .and_then(|wanted| resolve_realm_string(wanted, candidates))
    }

    /// Live validation of a realm about to be committed
    ///
    /// Requires all identity fields, a reachable status endpoint, and a
    /// version meeting the configured minimum. A pinned realm skips only the
    /// version half; reachability is never skipped.
    pub async fn validate(&self, realm: &Realm, config: &SelectionConfig) -> bool {
        if !realm.has_values() {
            return false;
        }

        let report = self.probe.probe(&realm.domain).await;
        if !report.reachable {
            return false;
        }

        let pinned = config.pinned_domain.as_deref() == Some(realm.domain.as_str());
        if pinned {
            return true;
        }

        let probed = report
            .version
            .unwrap_or_else(|| semver::Version::new(0, 0, 0));
        gate::meets(&probed, config.min_version.as_ref())
    }

    /// Re-scan candidates; used by the background refresh after a cache hit
    pub async fn refresh(
        &self,
        config: &SelectionConfig,
    ) -> Result<CandidateSet, DiscoveryError> {
        Ok(self.scanner.scan(config).await?.set)
    }
}

/// Resolve a `"name"` or `"name-layer"` realm string against candidates
///
/// The first candidate whose name (and layer, when given) matches wins.
pub fn resolve_realm_string(wanted: &str, candidates: &[Candidate]) -> Option<Realm> {
    if let Some((name, layer)) = wanted.split_once('-') {
        if let Some(c) = candidates
            .iter()
            .find(|c| c.catalyst_name == name && c.layer == layer)
        {
            return Some(Realm::from(c));
        }
    }

    candidates
        .iter()
        .find(|c| c.catalyst_name == wanted)
        .map(Realm::from)
}

/// Pick the best candidate out of a scanned set
///
/// Policy: lowest relative load wins, ties broken by lexical domain order so
/// the pick is deterministic for a given set.
pub fn pick_best(candidates: &[Candidate]) -> Option<Realm> {
    candidates
        .iter()
        .min_by(|a, b| {
            a.load_ratio()
                .partial_cmp(&b.load_ratio())
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.domain.cmp(&b.domain))
        })
        .map(Realm::from)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use semver::Version;

    fn candidate(domain: &str, name: &str, layer: &str, users: u32, max: u32) -> Candidate {
        Candidate {
            domain: domain.to_string(),
            catalyst_name: name.to_string(),
            layer: layer.to_string(),
            lighthouse_version: Version::new(1, 2, 0),
            users_count: users,
            max_users: max,
        }
    }

    #[test]
    fn test_resolve_by_name_and_layer() {
        let candidates = vec![
            candidate("https://a", "fenrir", "amber", 0, 10),
            candidate("https://b", "fenrir", "blue", 0, 10),
        ];

        let realm = resolve_realm_string("fenrir-blue", &candidates).unwrap();
        assert_eq!(realm.domain, "https://b");
    }

    #[test]
    fn test_resolve_by_name_only() {
        let candidates = vec![
            candidate("https://a", "fenrir", "amber", 0, 10),
            candidate("https://b", "odin", "amber", 0, 10),
        ];

        let realm = resolve_realm_string("odin", &candidates).unwrap();
        assert_eq!(realm.domain, "https://b");
    }

    #[test]
    fn test_resolve_falls_back_when_layer_unknown() {
        // "fenrir-green" has no layer match but "fenrir" does - the name
        // containing a dash is tried as name-layer first, then whole.
        let candidates = vec![candidate("https://a", "fenrir-green", "amber", 0, 10)];
        let realm = resolve_realm_string("fenrir-green", &candidates).unwrap();
        assert_eq!(realm.domain, "https://a");
    }

    #[test]
    fn test_resolve_unknown_is_none() {
        let candidates = vec![candidate("https://a", "fenrir", "amber", 0, 10)];
        assert!(resolve_realm_string("odin", &candidates).is_none());
    }

    #[test]
    fn test_pick_best_prefers_lowest_load() {
        let candidates = vec![
            candidate("https://busy", "a", "l", 90, 100),
            candidate("https://calm", "b", "l", 5, 100),
        ];

        let realm = pick_best(&candidates).unwrap();
        assert_eq!(realm.domain, "https://calm");
    }

    #[test]
    fn test_pick_best_tie_breaks_on_domain() {
        let candidates = vec![
            candidate("https://zeta", "a", "l", 10, 100),
            candidate("https://alpha", "b", "l", 10, 100),
        ];

        let realm = pick_best(&candidates).unwrap();
        assert_eq!(realm.domain, "https://alpha");
    }

    #[test]
    fn test_pick_best_is_deterministic() {
        let candidates = vec![
            candidate("https://b", "x", "l", 10, 100),
            candidate("https://a", "y", "l", 10, 100),
            candidate("https://c", "z", "l", 10, 100),
        ];

        let first = pick_best(&candidates).unwrap();
        for _ in 0..10 {
            assert_eq!(pick_best(&candidates).unwrap(), first);
        }
    }

    #[test]
    fn test_pick_best_empty_is_none() {
        assert!(pick_best(&[]).is_none());
    }
}
