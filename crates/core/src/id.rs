//! Opaque identifiers used across the event store.
//!
//! Unlike `forgeerp-core::id`, these are not UUID newtypes: `aggregate_id`,
//! `instance_id` and `commit_id` are client-supplied opaque strings (the
//! commit_id in particular must be chosen by the caller to make idempotent
//! replay possible), so a UUID wrapper would misrepresent who mints the
//! value. `DispatchId` is the one identifier this crate mints itself.

use core::fmt;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::DomainError;

macro_rules! opaque_string_id {
    ($t:ident, $label:literal) => {
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $t(String);

        impl $t {
            /// Construct from a caller-supplied value, rejecting the empty string.
            pub fn new(value: impl Into<String>) -> Result<Self, DomainError> {
                let value = value.into();
                if value.is_empty() {
                    return Err(DomainError::validation(concat!($label, " must not be empty")));
                }
                Ok(Self(value))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            pub fn into_string(self) -> String {
                self.0
            }
        }

        impl fmt::Display for $t {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::Display::fmt(&self.0, f)
            }
        }

        impl AsRef<str> for $t {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

opaque_string_id!(AggregateId, "aggregate_id");
opaque_string_id!(InstanceId, "instance_id");
opaque_string_id!(CommitId, "commit_id");

/// Identifier of a pending-dispatch row.
///
/// The Go source derives this inconsistently (sometimes the underlying
/// object id, sometimes its hex form); spec.md directs implementers to
/// standardize on an opaque unique string, so this type always mints a
/// fresh UUIDv7 and never accepts a caller-supplied value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DispatchId(Uuid);

impl DispatchId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Reconstructs a previously-minted id from its persisted string form.
    /// Not a way to assign a caller-chosen id: callers only ever see ids
    /// that came from `new()` in the first place, round-tripped through
    /// storage.
    pub fn parse(s: &str) -> Result<Self, DomainError> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| DomainError::validation(format!("invalid dispatch_id: {e}")))
    }
}

impl Default for DispatchId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for DispatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_ids() {
        assert!(AggregateId::new("").is_err());
        assert!(InstanceId::new("").is_err());
        assert!(CommitId::new("").is_err());
    }

    #[test]
    fn accepts_opaque_values() {
        let a = AggregateId::new("orders").unwrap();
        assert_eq!(a.as_str(), "orders");
        assert_eq!(a.to_string(), "orders");
    }

    #[test]
    fn dispatch_ids_are_unique() {
        let a = DispatchId::new();
        let b = DispatchId::new();
        assert_ne!(a, b);
    }
}
