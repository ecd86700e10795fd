//! Version arithmetic (component A, spec.md §4.A).
//!
//! Versions are dense positive integers assigned by the write coordinator,
//! never trusted from a client. `next_version` is the single place that
//! arithmetic lives so the coordinator and the recovery pass agree on it.

use serde::{Deserialize, Serialize};

/// A commit's position within its instance's stream. Always `>= 1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Version(u64);

impl Version {
    pub const FIRST: Version = Version(1);

    /// Wrap a raw integer as a `Version`. Panics on 0: spec.md invariant 1
    /// says the version set is a contiguous prefix of *positive* integers,
    /// so 0 is never a valid persisted version (it is only ever used as
    /// the "no commits yet" sentinel via `next_version`).
    pub fn new(raw: u64) -> Self {
        assert!(raw > 0, "version must be positive, got 0");
        Version(raw)
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl core::fmt::Display for Version {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// The highest persisted version for an instance, or "none yet".
///
/// Distinguishing `None` from `Version(0)` keeps `next_version` total
/// without a reserved sentinel value leaking into `Version` itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LastVersion {
    None,
    Some(Version),
}

impl LastVersion {
    pub fn as_u64(self) -> u64 {
        match self {
            LastVersion::None => 0,
            LastVersion::Some(v) => v.get(),
        }
    }
}

/// `next_version(last) = last + 1`; `1` if no commit exists yet.
pub fn next_version(last: LastVersion) -> Version {
    Version::new(last.as_u64() + 1)
}
