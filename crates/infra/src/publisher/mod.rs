//! Publisher bindings: adapters from `escore_events::Publisher` onto a
//! concrete transport. `queue_region` generalizes the region-routed queue
//! binding pattern (grounded on the SQS/NATS publishers in the Go source);
//! `inmemory` is an in-process reference sink used by this crate's own
//! tests and by callers wiring up spec.md scenario S6 without a broker.

pub mod inmemory;
pub mod queue_region;

pub use inmemory::InMemoryPublisher;
pub use queue_region::{QueueRegionPublisher, QueueSink};
