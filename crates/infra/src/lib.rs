//! Storage, coordination and transport bindings for the event store
//! (spec.md §4): a pluggable `Adapter` over a document store, the write
//! coordinator that turns it into an append-only, version-leased log, the
//! read view, dispatch tracker, snapshot store, recovery pass, and the
//! queue-region publisher binding.

pub mod adapter;
pub mod collections;
pub mod coordinator;
pub mod dispatch;
pub mod publisher;
pub mod read;
pub mod recovery;
pub mod snapshot;
pub mod telemetry;

pub use adapter::{Adapter, AdapterError, FieldValue, Filter, Limit, Record, Sort, SortOrder};
pub use coordinator::{CoordinatorError, RetryPolicy, WriteCoordinator};
pub use dispatch::{DispatchError, DispatchTracker};
pub use read::{ReadError, ReadView};
pub use recovery::{reconcile_once, spawn as spawn_recovery, ReconcileReport, RecoveryHandle};
pub use snapshot::{SnapshotError, SnapshotStore};
