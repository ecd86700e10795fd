//! Opaque periodic materialization of an instance's state (spec.md §3, §4.G).
//!
//! Snapshots are independent of the commit log: the store only ever hands
//! them back verbatim, keyed by revision or version range, to shorten replay.

use std::collections::BTreeMap;

use escore_core::{AggregateId, InstanceId, Version};
use serde::{Deserialize, Serialize};

use crate::payload::Payload;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub snap_id: String,
    pub aggregate_id: AggregateId,
    pub instance_id: InstanceId,
    pub revision: i64,
    pub from_version: Version,
    pub to_version: Version,
    pub payload: Payload,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub header: BTreeMap<String, serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<serde_json::Value>,
}
