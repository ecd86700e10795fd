//! Dispatch tracker (spec.md §4.E): a recovery queue for the publisher
//! binding. It does not deliver anything itself, it remembers which commits
//! still need to be.

use std::sync::Arc;

use thiserror::Error;

use escore_core::{AggregateId, CommitId, Deadline, DispatchId, InstanceId};
use escore_events::PendingDispatch;

use crate::adapter::{Adapter, AdapterError, FieldValue, Filter, Limit, Record, Sort};
use crate::collections;

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("no dispatch row for dispatch_id {0}")]
    NotFound(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error("deadline exceeded")]
    DeadlineExceeded,

    #[error(transparent)]
    Storage(#[from] AdapterError),
}

fn check(deadline: &Deadline) -> Result<(), DispatchError> {
    deadline.check(|| DispatchError::Cancelled, || DispatchError::DeadlineExceeded)
}

/// Tracks pending/dispatched state of committed batches.
pub struct DispatchTracker {
    adapter: Arc<dyn Adapter>,
}

impl DispatchTracker {
    pub fn new(adapter: Arc<dyn Adapter>) -> Self {
        Self { adapter }
    }

    /// Rows whose `commit_id` has been finalized (the commit actually
    /// exists) and which have not yet been marked dispatched. A lease row
    /// still pending finalization (empty `commit_id`) is not yet eligible —
    /// there is nothing to publish until the commit itself is durable.
    pub async fn undispatched(&self) -> Result<Vec<PendingDispatch>, DispatchError> {
        self.undispatched_cancellable(&Deadline::none()).await
    }

    pub async fn undispatched_cancellable(
        &self,
        deadline: &Deadline,
    ) -> Result<Vec<PendingDispatch>, DispatchError> {
        check(deadline)?;
        let filter = Filter::new().eq("dispatched", FieldValue::Bool(false));
        let rows = self
            .adapter
            .find(collections::DISPATCH, &filter, &Sort::default(), Limit::Unbounded)
            .await?;
        Ok(rows
            .iter()
            .filter(|r| !matches!(r.get("commit_id"), None | Some(FieldValue::Null)))
            .filter_map(record_to_pending_dispatch)
            .collect())
    }

    /// Marks a row dispatched. Idempotent: dispatching an already-dispatched
    /// row is a no-op.
    pub async fn dispatch(&self, dispatch_id: &DispatchId) -> Result<(), DispatchError> {
        self.dispatch_cancellable(dispatch_id, &Deadline::none()).await
    }

    pub async fn dispatch_cancellable(
        &self,
        dispatch_id: &DispatchId,
        deadline: &Deadline,
    ) -> Result<(), DispatchError> {
        check(deadline)?;
        let id = FieldValue::Str(dispatch_id.to_string());
        let filter = Filter::new().eq("dispatch_id", id.clone());
        if self
            .adapter
            .find_one(collections::DISPATCH, &filter, &Sort::default())
            .await?
            .is_none()
        {
            return Err(DispatchError::NotFound(dispatch_id.to_string()));
        }

        let mut patch = Record::new();
        patch.insert("dispatched".into(), FieldValue::Bool(true));
        self.adapter
            .update_by_id(collections::DISPATCH, "dispatch_id", &id, patch)
            .await?;
        Ok(())
    }
}

fn record_to_pending_dispatch(record: &Record) -> Option<PendingDispatch> {
    Some(PendingDispatch {
        dispatch_id: DispatchId::parse(record.get("dispatch_id")?.as_str()?).ok()?,
        commit_id: CommitId::new(record.get("commit_id")?.as_str()?).ok(),
        aggregate_id: AggregateId::new(record.get("aggregate_id")?.as_str()?).ok()?,
        instance_id: InstanceId::new(record.get("instance_id")?.as_str()?).ok()?,
    })
}
