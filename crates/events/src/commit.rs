//! The atomic unit persisted and replayed, plus the records the write
//! coordinator (escore-infra) builds around it (spec.md §3, §4.C).

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use escore_core::{AggregateId, CommitId, DispatchId, DomainError, DomainResult, InstanceId, Version};

use crate::event::Event;

/// The atomic unit persisted and replayed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventCommit {
    pub commit_id: CommitId,
    pub aggregate_id: AggregateId,
    pub instance_id: InstanceId,
    pub version: Version,
    pub command: String,
    pub created: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub header: BTreeMap<String, serde_json::Value>,
    pub events: Vec<Event>,
}

/// What a caller submits to have a batch of events committed.
///
/// Unlike `EventCommit`, this has no `version`: the coordinator assigns it.
/// `id` is the idempotency key and becomes the persisted commit's `commit_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventCommitRequest {
    pub id: CommitId,
    pub command: String,
    pub events: Vec<Event>,
    pub created: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub header: BTreeMap<String, serde_json::Value>,
}

impl EventCommitRequest {
    /// Construct a request, enforcing invariant 5 ("events non-empty").
    pub fn new(
        id: CommitId,
        command: impl Into<String>,
        events: Vec<Event>,
        created: DateTime<Utc>,
    ) -> DomainResult<Self> {
        if events.is_empty() {
            return Err(DomainError::invariant(
                "a commit request must carry at least one event",
            ));
        }
        Ok(Self {
            id,
            command: command.into(),
            events,
            created,
            header: BTreeMap::new(),
        })
    }

    pub fn with_header(mut self, header: BTreeMap<String, serde_json::Value>) -> Self {
        self.header = header;
        self
    }

    pub fn into_commit(self, aggregate_id: AggregateId, instance_id: InstanceId, version: Version) -> EventCommit {
        EventCommit {
            commit_id: self.id,
            aggregate_id,
            instance_id,
            version,
            command: self.command,
            created: self.created,
            header: self.header,
            events: self.events,
        }
    }
}

/// The version-leasing side record the coordinator manipulates (spec.md
/// §4.C). `commit_id: None` represents the Go source's empty-string
/// sentinel for "lease held, commit not yet finalized" (invariant 3).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitHeader {
    pub aggregate_id: AggregateId,
    pub instance_id: InstanceId,
    pub version: Version,
    pub commit_id: Option<CommitId>,
    pub timestamp: DateTime<Utc>,
}

impl CommitHeader {
    pub fn is_leased(&self) -> bool {
        self.commit_id.is_none()
    }
}

/// Tracks whether a persisted commit has been forwarded to a publisher
/// (spec.md §3, "PendingDispatch"; invariant 4).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingDispatch {
    pub dispatch_id: DispatchId,
    pub commit_id: Option<CommitId>,
    pub aggregate_id: AggregateId,
    pub instance_id: InstanceId,
}
