//! Version gating of scanned candidates
//!
//! A pure filter over a candidate list: keep a candidate iff no minimum is
//! configured or its declared version is at least the minimum, compared
//! semantically rather than lexically. The gate is bypassed entirely when a
//! server is pinned by configuration - a pinned server is trusted regardless
//! of what it declares.

use semver::Version;

use crate::models::Candidate;

/// Whether `version` satisfies the optional minimum
pub fn meets(version: &Version, min: Option<&Version>) -> bool {
    match min {
        Some(min) => version >= min,
        None => true,
    }
}

/// Keep the candidates whose version is at least `min`
///
/// Order-preserving; returns all candidates when `min` is unset.
pub fn filter(candidates: Vec<Candidate>, min: Option<&Version>) -> Vec<Candidate> {
    let Some(min) = min else {
        return candidates;
    };

    candidates
        .into_iter()
        .filter(|c| c.lighthouse_version >= *min)
        .collect()
}
