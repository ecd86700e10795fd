//! A single domain fact (spec.md §3, "Event").
//!
//! Events carry no version of their own — their position in a stream comes
//! entirely from the `EventCommit` that carries them.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::payload::Payload;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Caller-assigned, opaque. Not required to be globally unique; uniqueness
    /// is enforced at the commit level via `commit_id`.
    pub id: String,

    #[serde(rename = "type")]
    pub event_type: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<serde_json::Value>,

    pub data: Payload,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub header: BTreeMap<String, serde_json::Value>,
}

impl Event {
    pub fn new(id: impl Into<String>, event_type: impl Into<String>, data: Payload) -> Self {
        Self {
            id: id.into(),
            event_type: event_type.into(),
            meta: None,
            data,
            header: BTreeMap::new(),
        }
    }

    pub fn with_meta(mut self, meta: serde_json::Value) -> Self {
        self.meta = Some(meta);
        self
    }

    pub fn with_header(mut self, header: BTreeMap<String, serde_json::Value>) -> Self {
        self.header = header;
        self
    }
}
