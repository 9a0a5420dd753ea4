//! Configuration management for realm selection
//!
//! This module handles loading and validating configuration from environment
//! variables, an optional TOML file, and command-line arguments. Two
//! structures matter at selection time:
//!
//! - [`SelectionConfig`] - read-only inputs of one selection pass (explicit
//!   realm, pin, minimum version, preview flag)
//! - [`DiscoveryConfig`] - where and how to scan (discovery endpoint,
//!   user-added servers, probe timeout, fan-out cap)

use anyhow::{Context, Result};
use semver::Version;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::models::NetworkIdentity;

/// Default discovery endpoint returning the base candidate list
pub const DEFAULT_NODES_ENDPOINT: &str = "https://nodes.catalyst.network/servers";

/// Default per-probe timeout in seconds
pub const DEFAULT_PROBE_TIMEOUT_SECS: u64 = 5;

/// Default cap on concurrent probes, so a hostile discovery response cannot
/// trigger unbounded fan-out
pub const DEFAULT_MAX_CONCURRENT_PROBES: usize = 10;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Network the session runs against
    pub network: NetworkIdentity,

    /// Selection inputs
    #[serde(default)]
    pub selection: SelectionConfig,

    /// Discovery and probing settings
    #[serde(default)]
    pub discovery: DiscoveryConfig,

    /// Durable cache settings
    #[serde(default)]
    pub storage: StorageConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Read-only inputs of one selection pass
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SelectionConfig {
    /// Realm requested explicitly, as `"name"` or `"name-layer"`
    pub explicit_realm: Option<String>,

    /// Domain of a pinned server; pinning short-circuits discovery and
    /// bypasses the version gate
    pub pinned_domain: Option<String>,

    /// Minimum compatible protocol version
    pub min_version: Option<Version>,

    /// Local-only mode: no network, no cache, stub realm
    #[serde(default)]
    pub preview_mode: bool,
}

impl SelectionConfig {
    pub fn with_explicit_realm(mut self, realm: impl Into<String>) -> Self {
        self.explicit_realm = Some(realm.into());
        self
    }

    pub fn with_pinned_domain(mut self, domain: impl Into<String>) -> Self {
        self.pinned_domain = Some(domain.into());
        self
    }

    pub fn with_min_version(mut self, version: Version) -> Self {
        self.min_version = Some(version);
        self
    }

    pub fn with_preview_mode(mut self, preview: bool) -> Self {
        self.preview_mode = preview;
        self
    }

    /// Whether `domain` is allowed by the pin, if any
    pub fn pin_allows(&self, domain: &str) -> bool {
        match &self.pinned_domain {
            Some(pin) => pin == domain,
            None => true,
        }
    }
}

/// Discovery and probing settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    /// Discovery endpoint returning the base candidate domain list
    pub nodes_endpoint: String,

    /// Servers the user added by hand; probed alongside discovered ones and
    /// persisted separately
    #[serde(default)]
    pub added_servers: Vec<String>,

    /// Per-probe timeout in seconds
    pub probe_timeout_secs: u64,

    /// Cap on concurrent probes during a scan
    pub max_concurrent_probes: usize,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            nodes_endpoint: DEFAULT_NODES_ENDPOINT.to_string(),
            added_servers: Vec::new(),
            probe_timeout_secs: DEFAULT_PROBE_TIMEOUT_SECS,
            max_concurrent_probes: DEFAULT_MAX_CONCURRENT_PROBES,
        }
    }
}

impl DiscoveryConfig {
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }
}

/// Durable cache settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// SQLite database path for the realm/candidates cache
    pub sqlite_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            sqlite_path: PathBuf::from("data/realm_cache.db"),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (text, json)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "text".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let network = std::env::var("FAROL_NETWORK")
            .ok()
            .map(|v| v.parse::<NetworkIdentity>())
            .transpose()
            .map_err(|e| anyhow::anyhow!("Invalid FAROL_NETWORK: {e}"))?
            .unwrap_or(NetworkIdentity::Mainnet);

        let nodes_endpoint = std::env::var("FAROL_NODES_ENDPOINT")
            .unwrap_or_else(|_| DEFAULT_NODES_ENDPOINT.to_string());

        let added_servers = std::env::var("FAROL_ADDED_SERVERS")
            .map(|v| {
                v.split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        let probe_timeout_secs = std::env::var("FAROL_PROBE_TIMEOUT")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(DEFAULT_PROBE_TIMEOUT_SECS);

        let max_concurrent_probes = std::env::var("FAROL_MAX_CONCURRENT_PROBES")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(DEFAULT_MAX_CONCURRENT_PROBES);

        let explicit_realm = std::env::var("FAROL_REALM").ok().filter(|v| !v.is_empty());
        let pinned_domain = std::env::var("FAROL_PIN_CATALYST")
            .ok()
            .filter(|v| !v.is_empty());

        let min_version = std::env::var("FAROL_MIN_CATALYST_VERSION")
            .ok()
            .filter(|v| !v.is_empty())
            .map(|v| Version::parse(&v))
            .transpose()
            .context("Invalid FAROL_MIN_CATALYST_VERSION")?;

        let preview_mode = std::env::var("FAROL_PREVIEW")
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);

        let sqlite_path = std::env::var("FAROL_SQLITE_PATH")
            .unwrap_or_else(|_| String::from("data/realm_cache.db"))
            .into();

        let level = std::env::var("FAROL_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
        let format = std::env::var("FAROL_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());

        let config = Self {
            network,
            selection: SelectionConfig {
                explicit_realm,
                pinned_domain,
                min_version,
                preview_mode,
            },
            discovery: DiscoveryConfig {
                nodes_endpoint,
                added_servers,
                probe_timeout_secs,
                max_concurrent_probes,
            },
            storage: StorageConfig { sqlite_path },
            logging: LoggingConfig { level, format },
        };

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.discovery.nodes_endpoint.is_empty() {
            anyhow::bail!("nodes_endpoint must not be empty");
        }
        if url::Url::parse(&self.discovery.nodes_endpoint).is_err() {
            anyhow::bail!(
                "nodes_endpoint is not a valid URL: {}",
                self.discovery.nodes_endpoint
            );
        }
        if self.discovery.probe_timeout_secs == 0 {
            anyhow::bail!("probe_timeout_secs must be greater than 0");
        }
        if self.discovery.max_concurrent_probes == 0 {
            anyhow::bail!("max_concurrent_probes must be greater than 0");
        }
        for server in &self.discovery.added_servers {
            if url::Url::parse(server).is_err() {
                anyhow::bail!("added server is not a valid URL: {server}");
            }
        }
        Ok(())
    }
}
