//! Minimal primitives a backing store must provide (spec.md §4.B).
//!
//! The coordinator, read view, dispatch tracker and snapshot store are all
//! written against this trait rather than against a concrete database, the
//! same way `forgeerp-infra::event_store` is written against `EventStore`
//! instead of directly against Postgres. A document here is a flat,
//! ordered field map rather than a typed struct: the adapter boundary is
//! exactly where this store still needs the source's untyped-record
//! flexibility, because one adapter implementation serves five different
//! logical collections (`commit_headers`, `commits`, `dispatch`, `snapshots`,
//! plus whatever a future collection needs) without a trait per collection.

mod memory;
#[cfg(feature = "postgres")]
mod postgres;

pub use memory::InMemoryAdapter;
#[cfg(feature = "postgres")]
pub use postgres::PostgresAdapter;

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use thiserror::Error;

/// A single stored field value.
///
/// Deliberately not `serde_json::Value`: most fields are scalars used only
/// for equality filtering and sorting, and keeping them as a closed enum
/// means `InMemoryAdapter`'s filter/sort logic never has to reach into
/// nested JSON. `Json` exists for genuinely opaque payloads (`Event.data`,
/// commit `header`, snapshot `payload`).
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Str(String),
    Int(i64),
    Bool(bool),
    Time(DateTime<Utc>),
    Json(serde_json::Value),
    Null,
}

impl FieldValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            FieldValue::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_time(&self) -> Option<DateTime<Utc>> {
        match self {
            FieldValue::Time(t) => Some(*t),
            _ => None,
        }
    }
}

/// A document: an ordered field map. `BTreeMap` keeps field order
/// deterministic, which matters for the round-trip property over encoded
/// records.
pub type Record = BTreeMap<String, FieldValue>;

/// An AND of equality clauses. Every query this store issues (idempotency
/// probes, lease lookups, version scans) is expressible as equality plus
/// sort plus limit; range queries (`ReadSinceTime`, `ReadSinceVersion`) are
/// done by sorting and slicing rather than a `>=` clause, which keeps the
/// adapter contract to the primitives spec.md §4.B actually lists.
#[derive(Debug, Clone, Default)]
pub struct Filter(pub Vec<(String, FieldValue)>);

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn eq(mut self, field: impl Into<String>, value: FieldValue) -> Self {
        self.0.push((field.into(), value));
        self
    }

    pub fn matches(&self, record: &Record) -> bool {
        self.0
            .iter()
            .all(|(field, value)| record.get(field) == Some(value))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Ascending,
    Descending,
}

/// Ordered list of `(field, direction)` tiebreakers, applied left to right.
#[derive(Debug, Clone, Default)]
pub struct Sort(pub Vec<(String, SortOrder)>);

impl Sort {
    pub fn by(field: impl Into<String>, order: SortOrder) -> Self {
        Self(vec![(field.into(), order)])
    }
}

#[derive(Debug, Clone, Copy)]
pub enum Limit {
    Unbounded,
    At(usize),
}

impl Limit {
    /// spec.md's boundary behavior: `count <= 0` means unbounded.
    pub fn from_signed(count: i64) -> Self {
        if count <= 0 {
            Limit::Unbounded
        } else {
            Limit::At(count as usize)
        }
    }

    pub fn apply<T>(self, items: Vec<T>) -> Vec<T> {
        match self {
            Limit::Unbounded => items,
            Limit::At(n) => items.into_iter().take(n).collect(),
        }
    }
}

#[derive(Debug, Error)]
pub enum AdapterError {
    /// Distinguishable from other failures per spec.md §4.B: the coordinator
    /// reinterprets this signal, it never inspects the index name itself.
    #[error("unique constraint violated on {0}")]
    UniqueViolation(String),

    #[error("storage error: {0}")]
    Storage(String),
}

/// The primitives a backing store must provide (spec.md §4.B). Operations
/// are scoped to a named collection so one adapter instance serves every
/// collection this store needs.
///
/// Session scoping ("a scoped handle released on all exit paths") is left
/// to each implementation's ownership of its connection: `InMemoryAdapter`
/// needs no session at all, and `PostgresAdapter` checks a pool connection
/// out and drops it at the end of each call via sqlx's own RAII guard.
/// Threading an explicit session type through every trait method here would
/// only restate what the borrow checker and `Drop` already guarantee.
#[async_trait::async_trait]
pub trait Adapter: Send + Sync {
    async fn count(&self, collection: &str, filter: &Filter) -> Result<u64, AdapterError>;

    async fn find_one(
        &self,
        collection: &str,
        filter: &Filter,
        sort: &Sort,
    ) -> Result<Option<Record>, AdapterError>;

    async fn find(
        &self,
        collection: &str,
        filter: &Filter,
        sort: &Sort,
        limit: Limit,
    ) -> Result<Vec<Record>, AdapterError>;

    async fn insert(&self, collection: &str, record: Record) -> Result<(), AdapterError>;

    async fn update_by_id(
        &self,
        collection: &str,
        id_field: &str,
        id: &FieldValue,
        patch: Record,
    ) -> Result<(), AdapterError>;

    async fn remove_all(&self, collection: &str, filter: &Filter) -> Result<u64, AdapterError>;

    /// Idempotent: safe to call on every store startup.
    async fn ensure_unique_index(
        &self,
        collection: &str,
        fields: &[&str],
    ) -> Result<(), AdapterError>;
}
