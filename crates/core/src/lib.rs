//! Identity, versioning, error and cancellation primitives shared by every
//! other crate in the workspace. Nothing here talks to storage or the wire;
//! it is the vocabulary the event store and its adapters are written in.

pub mod cancel;
pub mod error;
pub mod id;
pub mod version;

pub use cancel::{CancelToken, Deadline, Expiry};
pub use error::{DomainError, DomainResult};
pub use id::{AggregateId, CommitId, DispatchId, InstanceId};
pub use version::{next_version, LastVersion, Version};
