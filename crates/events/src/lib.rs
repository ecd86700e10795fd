//! Event-sourcing data model and wire/publisher contracts (spec.md §3, §6).
//!
//! This crate only defines shapes and pluggable interfaces; it does not
//! touch storage. `escore-infra` supplies the storage adapter, write
//! coordinator, read views, dispatch tracker and a reference publisher
//! binding that operate on the types defined here.

pub mod codec;
pub mod commit;
pub mod event;
pub mod payload;
pub mod publisher;
pub mod snapshot;

pub use codec::{CodecError, Decoder, Encoder, JsonCodec};
pub use commit::{CommitHeader, EventCommit, EventCommitRequest, PendingDispatch};
pub use event::Event;
pub use payload::Payload;
pub use publisher::{AckHandler, PubAck, Publisher, PublisherError};
pub use snapshot::Snapshot;
