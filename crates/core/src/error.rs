//! Domain error model.
//!
//! Mirrors `forgeerp-core::error`'s split between deterministic domain
//! failures and opaque infrastructure failures, but carries the error kinds
//! spec.md §7 names for the write/read/dispatch protocol instead of the
//! generic CRUD set the teacher ships. `NotFound`/`Conflict`/`Unauthorized`
//! are dropped here: this crate has no authorization concept, and
//! not-found/conflict are coordinator-level outcomes (`CoordinatorError`)
//! rather than raw domain failures.

use thiserror::Error;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// Keep this focused on deterministic, business/domain failures (validation,
/// invariants). Infrastructure concerns belong in
/// `escore-infra::{AdapterError, CoordinatorError}`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A value failed validation (e.g. an empty identifier).
    #[error("validation failed: {0}")]
    Validation(String),

    /// A domain invariant was violated (e.g. an empty commit).
    #[error("invariant violated: {0}")]
    InvariantViolation(String),
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::InvariantViolation(msg.into())
    }
}
