//! Unified error handling for the farol crate
//!
//! Probe-level failures are never represented here: a candidate that does not
//! answer within its timeout is reported as a value
//! ([`ProbeReport::reachable`](crate::probe::ProbeReport) set to `false`) so
//! that one dead server cannot abort a batch of probes. What does reach this
//! module is fatal by default - a client cannot render without a realm, and
//! the selection layer escalates instead of retrying forever.

use std::io;
use thiserror::Error;

// Re-export domain-specific errors for convenience
pub use crate::cache::StorageError;
pub use crate::scanner::DiscoveryError;
pub use crate::selector::SelectionError;

/// Classification of errors for handling strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Discovery and scan failures
    Discovery,
    /// Selection exhausted every tier
    Selection,
    /// Durable cache and I/O errors
    Storage,
    /// Configuration and validation errors
    Config,
    /// Other/unknown errors
    Other,
}

/// Unified error type for the farol crate
#[derive(Error, Debug)]
pub enum Error {
    /// Discovery endpoint fetch or parse failures
    #[error("discovery error: {0}")]
    Discovery(#[from] DiscoveryError),

    /// Selection failures (every tier exhausted)
    #[error("selection error: {0}")]
    Selection(#[from] SelectionError),

    /// Persistent cache errors
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// JSON serialization/deserialization errors
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O errors
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),

    /// Configuration errors
    #[error("config error: {0}")]
    Config(String),

    /// Generic error with context
    #[error("{context}")]
    Other {
        context: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl Error {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a generic error with context
    pub fn other(context: impl Into<String>) -> Self {
        Self::Other {
            context: context.into(),
            source: None,
        }
    }

    /// Whether this error must terminate the startup sequence
    ///
    /// Discovery and selection failures are fatal: there is no candidate to
    /// fall back to and no retry loop at the selection layer. Cache write
    /// failures are fatal too, since durability of the committed realm is
    /// part of the contract.
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::Discovery(_) | Self::Selection(_) => true,
            Self::Storage(_) | Self::Config(_) => true,
            Self::Json(_) | Self::Io(_) => true,
            Self::Other { .. } => false,
        }
    }

    /// Error category for handling strategies
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Discovery(_) => ErrorCategory::Discovery,
            Self::Selection(e) => match e {
                SelectionError::Discovery(_) => ErrorCategory::Discovery,
                SelectionError::NoRealmAvailable => ErrorCategory::Selection,
            },
            Self::Storage(_) | Self::Io(_) => ErrorCategory::Storage,
            Self::Json(_) => ErrorCategory::Storage,
            Self::Config(_) => ErrorCategory::Config,
            Self::Other { .. } => ErrorCategory::Other,
        }
    }
}

/// Result type alias using the unified Error type
pub type Result<T> = std::result::Result<T, Error>;
