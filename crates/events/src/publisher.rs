//! The publisher contract linking the store to external queues (spec.md
//! §3 "Publisher", §6, §7).

use thiserror::Error;

use escore_core::{AggregateId, CommitId, InstanceId, Version};

use crate::codec::CodecError;
use crate::commit::EventCommit;

/// Acknowledgment data handed back to the caller of `Publisher::publish`.
#[derive(Debug, Clone, PartialEq)]
pub struct PubAck {
    pub version: Version,
    pub namespace: String,
    pub commit_id: CommitId,
    pub instance_id: InstanceId,
    pub aggregate_id: AggregateId,
    pub response: Option<serde_json::Value>,
}

/// Called exactly once per successful `publish`, per spec.md scenario S6.
pub type AckHandler = Box<dyn FnOnce(PubAck) + Send>;

#[derive(Debug, Error)]
pub enum PublisherError {
    #[error(transparent)]
    EncodingFailed(#[from] CodecError),

    #[error("transport failed: {0}")]
    TransportFailed(String),

    /// Queue-region binding (spec.md §6): a target name was registered twice.
    #[error("target name already assigned: {0}")]
    TargetNameAssigned(String),

    /// Queue-region binding: a registered URL carries no region hint.
    #[error("url has no region: {0}")]
    URLHasNoRegion(String),

    /// Queue-region binding: publish addressed an unregistered target name.
    #[error("no region registered for target: {0}")]
    NoRegionWithTarget(String),
}

/// Delivers an encoded commit to a named external queue and acknowledges via
/// callback. A queue binding (e.g. the queue-region reference in
/// `escore-infra::publisher`) is the collaborator; this crate only fixes the
/// shape of the contract.
pub trait Publisher {
    fn publish(
        &self,
        namespace: &str,
        commit: EventCommit,
        ack: AckHandler,
    ) -> Result<(), PublisherError>;
}
