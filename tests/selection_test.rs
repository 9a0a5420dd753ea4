//! End-to-end selection scenarios over mocked catalyst servers
//!
//! These tests exercise the whole selection pipeline - discovery fetch,
//! parallel probing, version gating, cache fast path and fatal escalation -
//! against wiremock servers standing in for catalysts and the discovery
//! endpoint.

use std::sync::Arc;
use std::time::Duration;

use semver::Version;
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use farol::cache::{MemoryStorage, PersistentStorage, RealmCache};
use farol::config::{DiscoveryConfig, SelectionConfig};
use farol::models::{CacheEntry, NetworkIdentity, Realm};
use farol::selector::{RealmSelector, SelectionError, SelectionPath};
use farol::session::{RealmEvent, RealmSession};

// ============================================================================
// Fixtures
// ============================================================================

/// Start a mock catalyst answering its status endpoint
async fn catalyst(name: &str, version: &str, users: u32, max: u32) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/comms/status"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "name": name,
            "layer": "amber",
            "env": { "catalystVersion": version },
            "usersCount": users,
            "maxUsers": max,
        })))
        .mount(&server)
        .await;
    server
}

/// Start a mock catalyst whose status endpoint answers 500
async fn dead_catalyst() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/comms/status"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;
    server
}

/// Start a discovery endpoint listing the given catalyst domains
async fn discovery(domains: &[String]) -> MockServer {
    let server = MockServer::start().await;
    let body: Vec<_> = domains.iter().map(|d| json!({ "domain": d })).collect();
    Mock::given(method("GET"))
        .and(path("/servers"))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(&server)
        .await;
    server
}

/// Start a discovery endpoint that must never be called
async fn untouchable_discovery() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/servers"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(0)
        .mount(&server)
        .await;
    server
}

fn selector_for(endpoint: &MockServer) -> RealmSelector {
    RealmSelector::new(discovery_config(endpoint)).unwrap()
}

fn discovery_config(endpoint: &MockServer) -> DiscoveryConfig {
    DiscoveryConfig {
        nodes_endpoint: format!("{}/servers", endpoint.uri()),
        added_servers: Vec::new(),
        probe_timeout_secs: 2,
        max_concurrent_probes: 4,
    }
}

fn realm_for(server: &MockServer, name: &str) -> Realm {
    Realm {
        domain: server.uri(),
        catalyst_name: name.to_string(),
        layer: "amber".to_string(),
        lighthouse_version: Version::new(1, 2, 0),
    }
}

fn empty_cache() -> CacheEntry {
    CacheEntry::empty(NetworkIdentity::Mainnet)
}

// ============================================================================
// Scenario A: preview mode
// ============================================================================

#[tokio::test]
async fn preview_mode_returns_stub_without_any_network() {
    let endpoint = untouchable_discovery().await;
    let selector = selector_for(&endpoint);

    let config = SelectionConfig::default().with_preview_mode(true);
    let outcome = selector.select(&config, &empty_cache()).await.unwrap();

    assert_eq!(outcome.path, SelectionPath::Preview);
    assert_eq!(outcome.realm.layer, "stub");
    assert_eq!(outcome.realm.catalyst_name, "localhost");
    assert!(outcome.fresh.is_none());
    // Dropping `endpoint` verifies its expect(0).
}

// ============================================================================
// Scenario B: full scan with version gate
// ============================================================================

#[tokio::test]
async fn version_gate_drops_old_server_and_commits_the_new_one() {
    let server_a = catalyst("fenrir", "1.2.0", 10, 100).await;
    let server_b = catalyst("odin", "0.9.0", 0, 100).await;
    let endpoint = discovery(&[server_a.uri(), server_b.uri()]).await;

    let selector = selector_for(&endpoint);
    let config = SelectionConfig::default().with_min_version(Version::new(1, 0, 0));

    let outcome = selector.select(&config, &empty_cache()).await.unwrap();

    assert_eq!(outcome.path, SelectionPath::FullScan);
    assert_eq!(outcome.realm.domain, server_a.uri());
    assert_eq!(outcome.realm.lighthouse_version, Version::new(1, 2, 0));

    // Only the gated survivor is reported for persistence.
    let fresh = outcome.fresh.unwrap();
    assert_eq!(fresh.discovered.len(), 1);
    assert_eq!(fresh.discovered[0].domain, server_a.uri());
}

#[tokio::test]
async fn unreachable_candidates_are_dropped_silently() {
    let live = catalyst("fenrir", "1.2.0", 10, 100).await;
    let dead = dead_catalyst().await;
    let endpoint = discovery(&[dead.uri(), live.uri()]).await;

    let selector = selector_for(&endpoint);
    let outcome = selector
        .select(&SelectionConfig::default(), &empty_cache())
        .await
        .unwrap();

    assert_eq!(outcome.realm.domain, live.uri());
}

#[tokio::test]
async fn explicit_realm_wins_over_scoring() {
    // odin carries far more load; the explicit request must still win.
    let calm = catalyst("fenrir", "1.2.0", 1, 100).await;
    let busy = catalyst("odin", "1.2.0", 99, 100).await;
    let endpoint = discovery(&[calm.uri(), busy.uri()]).await;

    let selector = selector_for(&endpoint);
    let config = SelectionConfig::default().with_explicit_realm("odin");

    let outcome = selector.select(&config, &empty_cache()).await.unwrap();
    assert_eq!(outcome.realm.domain, busy.uri());
    assert_eq!(outcome.realm.catalyst_name, "odin");
}

// ============================================================================
// Scenario C: discovery failure is fatal
// ============================================================================

#[tokio::test]
async fn discovery_network_failure_escalates_fatal() {
    // Port 1 is closed: the discovery fetch itself fails.
    let config = DiscoveryConfig {
        nodes_endpoint: "http://127.0.0.1:1/servers".to_string(),
        added_servers: Vec::new(),
        probe_timeout_secs: 1,
        max_concurrent_probes: 4,
    };
    let selector = RealmSelector::new(config).unwrap();

    let err = selector
        .select(&SelectionConfig::default(), &empty_cache())
        .await
        .unwrap_err();

    assert!(matches!(err, SelectionError::Discovery(_)));
    let err: farol::error::Error = err.into();
    assert!(err.is_fatal());
}

#[tokio::test]
async fn discovery_http_error_escalates_fatal() {
    let endpoint = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/servers"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&endpoint)
        .await;

    let selector = selector_for(&endpoint);
    let err = selector
        .select(&SelectionConfig::default(), &empty_cache())
        .await
        .unwrap_err();

    assert!(matches!(err, SelectionError::Discovery(_)));
}

#[tokio::test]
async fn empty_candidate_set_is_no_realm_available() {
    let endpoint = discovery(&[]).await;
    let selector = selector_for(&endpoint);

    let err = selector
        .select(&SelectionConfig::default(), &empty_cache())
        .await
        .unwrap_err();

    assert!(matches!(err, SelectionError::NoRealmAvailable));
}

// ============================================================================
// Cache fast path
// ============================================================================

#[tokio::test]
async fn valid_cached_realm_skips_the_synchronous_scan() {
    let server = catalyst("fenrir", "1.2.0", 10, 100).await;
    let endpoint = untouchable_discovery().await;

    let cached = CacheEntry {
        network: NetworkIdentity::Mainnet,
        realm: Some(realm_for(&server, "fenrir")),
        candidates: Vec::new(),
    };

    let selector = selector_for(&endpoint);
    let outcome = selector
        .select(&SelectionConfig::default(), &cached)
        .await
        .unwrap();

    assert_eq!(outcome.path, SelectionPath::CacheHit);
    assert_eq!(outcome.realm, realm_for(&server, "fenrir"));
    assert!(outcome.fresh.is_none());
}

#[tokio::test]
async fn stale_cached_realm_falls_through_to_scan() {
    let stale = dead_catalyst().await;
    let live = catalyst("odin", "1.2.0", 5, 100).await;
    let endpoint = discovery(&[live.uri()]).await;

    let cached = CacheEntry {
        network: NetworkIdentity::Mainnet,
        realm: Some(realm_for(&stale, "fenrir")),
        candidates: Vec::new(),
    };

    let selector = selector_for(&endpoint);
    let outcome = selector
        .select(&SelectionConfig::default(), &cached)
        .await
        .unwrap();

    assert_eq!(outcome.path, SelectionPath::FullScan);
    assert_eq!(outcome.realm.domain, live.uri());
}

#[tokio::test]
async fn cached_realm_below_min_version_is_rejected() {
    let old = catalyst("fenrir", "0.5.0", 10, 100).await;
    let new = catalyst("odin", "2.0.0", 10, 100).await;
    let endpoint = discovery(&[new.uri()]).await;

    let cached = CacheEntry {
        network: NetworkIdentity::Mainnet,
        realm: Some(realm_for(&old, "fenrir")),
        candidates: Vec::new(),
    };

    let selector = selector_for(&endpoint);
    let config = SelectionConfig::default().with_min_version(Version::new(1, 0, 0));

    let outcome = selector.select(&config, &cached).await.unwrap();
    assert_eq!(outcome.realm.domain, new.uri());
}

#[tokio::test]
async fn explicit_realm_resolves_offline_against_cached_candidates() {
    let server = catalyst("odin", "1.2.0", 10, 100).await;
    let endpoint = untouchable_discovery().await;

    let candidate = farol::models::Candidate {
        domain: server.uri(),
        catalyst_name: "odin".to_string(),
        layer: "amber".to_string(),
        lighthouse_version: Version::new(1, 2, 0),
        users_count: 10,
        max_users: 100,
    };
    let cached = CacheEntry {
        network: NetworkIdentity::Mainnet,
        realm: Some(realm_for(&server, "fenrir")),
        candidates: vec![candidate],
    };

    let selector = selector_for(&endpoint);
    let config = SelectionConfig::default().with_explicit_realm("odin-amber");

    let outcome = selector.select(&config, &cached).await.unwrap();
    assert_eq!(outcome.path, SelectionPath::CacheHit);
    assert_eq!(outcome.realm.catalyst_name, "odin");
}

// ============================================================================
// Pinning
// ============================================================================

#[tokio::test]
async fn pin_short_circuits_discovery() {
    let pinned = catalyst("fenrir", "1.2.0", 10, 100).await;
    let endpoint = untouchable_discovery().await;

    let selector = selector_for(&endpoint);
    let config = SelectionConfig::default().with_pinned_domain(pinned.uri());

    let outcome = selector.select(&config, &empty_cache()).await.unwrap();
    assert_eq!(outcome.realm.domain, pinned.uri());
}

#[tokio::test]
async fn pin_bypasses_the_version_gate() {
    let ancient = catalyst("fenrir", "0.0.1", 10, 100).await;
    let endpoint = untouchable_discovery().await;

    let selector = selector_for(&endpoint);
    let config = SelectionConfig::default()
        .with_pinned_domain(ancient.uri())
        .with_min_version(Version::new(5, 0, 0));

    let outcome = selector.select(&config, &empty_cache()).await.unwrap();
    assert_eq!(outcome.realm.domain, ancient.uri());
}

#[tokio::test]
async fn pin_overrides_a_cached_realm_for_another_domain() {
    let pinned = catalyst("fenrir", "1.2.0", 10, 100).await;
    let other = catalyst("odin", "1.2.0", 0, 100).await;
    let endpoint = untouchable_discovery().await;

    let cached = CacheEntry {
        network: NetworkIdentity::Mainnet,
        realm: Some(realm_for(&other, "odin")),
        candidates: Vec::new(),
    };

    let selector = selector_for(&endpoint);
    let config = SelectionConfig::default().with_pinned_domain(pinned.uri());

    let outcome = selector.select(&config, &cached).await.unwrap();
    assert_eq!(outcome.realm.domain, pinned.uri());
}

#[tokio::test]
async fn pin_binds_an_explicit_realm_resolved_from_cache() {
    // The explicit realm resolves from cached candidates to a domain other
    // than the pin; the cache tier must refuse it and the scan tier probes
    // only the pin.
    let pinned = catalyst("fenrir", "1.2.0", 10, 100).await;
    let other = catalyst("odin", "1.2.0", 0, 100).await;
    let endpoint = untouchable_discovery().await;

    let candidate = farol::models::Candidate {
        domain: other.uri(),
        catalyst_name: "odin".to_string(),
        layer: "amber".to_string(),
        lighthouse_version: Version::new(1, 2, 0),
        users_count: 0,
        max_users: 100,
    };
    let cached = CacheEntry {
        network: NetworkIdentity::Mainnet,
        realm: Some(realm_for(&pinned, "fenrir")),
        candidates: vec![candidate],
    };

    let selector = selector_for(&endpoint);
    let config = SelectionConfig::default()
        .with_pinned_domain(pinned.uri())
        .with_explicit_realm("odin");

    let outcome = selector.select(&config, &cached).await.unwrap();
    assert_eq!(outcome.realm.domain, pinned.uri());
    assert_eq!(outcome.path, SelectionPath::FullScan);
}

#[tokio::test]
async fn unreachable_pin_is_no_realm_available() {
    let endpoint = untouchable_discovery().await;
    let selector = selector_for(&endpoint);
    let config = SelectionConfig::default().with_pinned_domain("http://127.0.0.1:1");

    let err = selector.select(&config, &empty_cache()).await.unwrap_err();
    assert!(matches!(err, SelectionError::NoRealmAvailable));
}

// ============================================================================
// Session: commit, persistence, background refresh
// ============================================================================

#[tokio::test]
async fn full_scan_commit_persists_realm_and_candidates() {
    let server = catalyst("fenrir", "1.2.0", 10, 100).await;
    let endpoint = discovery(&[server.uri()]).await;

    let storage: Arc<dyn PersistentStorage> = Arc::new(MemoryStorage::new());
    let cache = RealmCache::new(Arc::clone(&storage));
    let session = RealmSession::new(
        NetworkIdentity::Mainnet,
        RealmSelector::new(discovery_config(&endpoint)).unwrap(),
        cache.clone(),
    );

    let realm = session
        .initialize(&SelectionConfig::default())
        .await
        .unwrap();
    assert_eq!(realm.domain, server.uri());

    let entry = cache.load(NetworkIdentity::Mainnet).await.unwrap();
    assert_eq!(entry.realm, Some(realm));
    assert_eq!(entry.candidates.len(), 1);
}

#[tokio::test]
async fn background_refresh_updates_candidates_but_not_the_realm() {
    let cached_server = catalyst("fenrir", "1.2.0", 10, 100).await;
    let new_server = catalyst("odin", "1.3.0", 2, 100).await;
    let endpoint = discovery(&[new_server.uri()]).await;

    let storage: Arc<dyn PersistentStorage> = Arc::new(MemoryStorage::new());
    let cache = RealmCache::new(Arc::clone(&storage));
    let cached_realm = realm_for(&cached_server, "fenrir");
    cache
        .save_realm(NetworkIdentity::Mainnet, &cached_realm)
        .await
        .unwrap();

    let session = RealmSession::new(
        NetworkIdentity::Mainnet,
        RealmSelector::new(discovery_config(&endpoint)).unwrap(),
        cache.clone(),
    );
    let mut events = session.subscribe();

    let realm = session
        .initialize(&SelectionConfig::default())
        .await
        .unwrap();
    assert_eq!(realm, cached_realm);

    // First the commit, then the forked refresh reporting fresh candidates.
    match tokio::time::timeout(Duration::from_secs(5), events.recv())
        .await
        .unwrap()
        .unwrap()
    {
        RealmEvent::RealmSelected(selected) => assert_eq!(selected, cached_realm),
        other => panic!("unexpected event: {other:?}"),
    }
    match tokio::time::timeout(Duration::from_secs(5), events.recv())
        .await
        .unwrap()
        .unwrap()
    {
        RealmEvent::CandidatesUpdated(candidates) => {
            assert_eq!(candidates.len(), 1);
            assert_eq!(candidates[0].domain, new_server.uri());
        }
        other => panic!("unexpected event: {other:?}"),
    }

    // The refresh rewrote only the candidates key; the realm is untouched.
    let entry = cache.load(NetworkIdentity::Mainnet).await.unwrap();
    assert_eq!(entry.realm, Some(cached_realm));
    assert_eq!(entry.candidates[0].domain, new_server.uri());
}
