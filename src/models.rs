//! Core data structures for realm discovery and selection
//!
//! The types here mirror what travels over the wire and what lands in the
//! persistent cache:
//!
//! - [`Candidate`] - a realm server considered during selection, with
//!   live-probed metadata
//! - [`Realm`] - the committed server cluster a session is bound to
//! - [`NetworkIdentity`] - scopes every cache key so networks never share state
//! - [`CandidateSet`] - scan output partitioned into discovered and user-added
//! - [`StatusPayload`] - the raw body of a candidate's status endpoint

use semver::Version;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Origin used for the stub realm in preview mode
pub const PREVIEW_ORIGIN: &str = "http://127.0.0.1:8000";

// ============================================================================
// Network Identity
// ============================================================================

/// The network a client session runs against
///
/// Every cache key is scoped by this value; switching networks reads and
/// writes a different key pair without touching the other scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkIdentity {
    Mainnet,
    Testnet,
}

impl NetworkIdentity {
    pub fn as_str(&self) -> &'static str {
        match self {
            NetworkIdentity::Mainnet => "mainnet",
            NetworkIdentity::Testnet => "testnet",
        }
    }
}

impl fmt::Display for NetworkIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NetworkIdentity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "mainnet" => Ok(NetworkIdentity::Mainnet),
            "testnet" => Ok(NetworkIdentity::Testnet),
            other => Err(format!("unknown network: {other}")),
        }
    }
}

// ============================================================================
// Candidate & Realm
// ============================================================================

/// A realm server considered during selection
///
/// Produced only by probing; immutable once constructed; uniquely identified
/// by `domain`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    /// Base URL of the server, without trailing slash
    pub domain: String,
    /// Human-facing server name reported by the status endpoint
    pub catalyst_name: String,
    /// Communication layer the server exposes
    pub layer: String,
    /// Protocol version declared by the server
    pub lighthouse_version: Version,
    /// Users currently connected
    pub users_count: u32,
    /// Declared capacity; 0 means unlimited
    pub max_users: u32,
}

impl Candidate {
    /// Relative load of this candidate
    ///
    /// A server with unlimited capacity scores 0 while empty; once it holds
    /// users without a declared ceiling it scores as fully loaded so bounded
    /// servers with headroom win the tie.
    pub fn load_ratio(&self) -> f64 {
        if self.max_users == 0 {
            if self.users_count == 0 {
                0.0
            } else {
                1.0
            }
        } else {
            f64::from(self.users_count) / f64::from(self.max_users)
        }
    }
}

/// The committed server cluster for a client session
///
/// A `Realm` is a narrowed view of a [`Candidate`]: same identity, minus the
/// live load counters. Exactly one realm is active per session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Realm {
    pub domain: String,
    pub catalyst_name: String,
    pub layer: String,
    pub lighthouse_version: Version,
}

impl Realm {
    /// Stub realm used in preview mode: fixed local origin, no network calls
    pub fn preview() -> Self {
        Realm {
            domain: PREVIEW_ORIGIN.to_string(),
            catalyst_name: "localhost".to_string(),
            layer: "stub".to_string(),
            lighthouse_version: Version::new(0, 1, 0),
        }
    }

    /// All identity fields are present
    pub fn has_values(&self) -> bool {
        !self.domain.is_empty() && !self.catalyst_name.is_empty() && !self.layer.is_empty()
    }
}

impl From<&Candidate> for Realm {
    fn from(candidate: &Candidate) -> Self {
        Realm {
            domain: candidate.domain.clone(),
            catalyst_name: candidate.catalyst_name.clone(),
            layer: candidate.layer.clone(),
            lighthouse_version: candidate.lighthouse_version.clone(),
        }
    }
}

// ============================================================================
// Candidate Set
// ============================================================================

/// Scan output, partitioned so user-added servers survive the next
/// discovery pass without being overwritten by it
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CandidateSet {
    /// Candidates obtained from the discovery endpoint
    pub discovered: Vec<Candidate>,
    /// Candidates the user configured by hand
    pub user_added: Vec<Candidate>,
}

impl CandidateSet {
    /// Both partitions, discovered first
    pub fn all(&self) -> Vec<Candidate> {
        let mut all = self.discovered.clone();
        all.extend(self.user_added.iter().cloned());
        all
    }

    pub fn is_empty(&self) -> bool {
        self.discovered.is_empty() && self.user_added.is_empty()
    }

    pub fn len(&self) -> usize {
        self.discovered.len() + self.user_added.len()
    }
}

// ============================================================================
// Status Payload
// ============================================================================

/// Body of a candidate's status endpoint
///
/// Treated as untrusted input: every field is optional and unknown fields
/// are ignored. A server that omits its catalyst version probes as `0.0.0`,
/// which only passes the version gate when no minimum is configured.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusPayload {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub env: StatusEnv,
    #[serde(default)]
    pub layer: Option<String>,
    #[serde(default)]
    pub users_count: Option<u32>,
    #[serde(default)]
    pub max_users: Option<u32>,
}

/// Environment block of the status payload
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusEnv {
    #[serde(default)]
    pub catalyst_version: Option<String>,
}

impl StatusPayload {
    /// Declared protocol version, defaulting to `0.0.0` when absent or
    /// unparseable
    pub fn version(&self) -> Version {
        self.env
            .catalyst_version
            .as_deref()
            .and_then(|v| Version::parse(v).ok())
            .unwrap_or_else(|| Version::new(0, 0, 0))
    }
}

// ============================================================================
// Cache Entry
// ============================================================================

/// What the persistent cache knows about one network
///
/// Assembled from two independently written keys, so a missing candidates
/// entry is an empty list, never an error.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub network: NetworkIdentity,
    pub realm: Option<Realm>,
    pub candidates: Vec<Candidate>,
}

impl CacheEntry {
    /// Entry for a network the cache has never seen
    pub fn empty(network: NetworkIdentity) -> Self {
        CacheEntry {
            network,
            realm: None,
            candidates: Vec::new(),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
