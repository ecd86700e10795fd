//! Recovery pass (spec.md §4.C "Failure-recovery semantics", §9 "Recovery
//! pass"): heals `commit_headers`/`dispatch` rows left behind by a writer
//! that crashed between steps 4 and 5/6 of the write algorithm — the commit
//! itself is durable, but its header or dispatch row still shows an empty
//! `commit_id`.
//!
//! Not driven by a main loop in the Go source; spec.md specifies it as a
//! required background task. Grounded on
//! `forgeerp-infra::workers::projection_worker::ProjectionWorker`'s
//! shutdown-channel-plus-poll-loop shape, adapted to `tokio` (the worker
//! polls an `Adapter` rather than subscribing to a bus, so there is no
//! blocking `recv` to select against).

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, instrument, warn};

use escore_core::{AggregateId, CommitId, InstanceId};

use crate::adapter::{Adapter, AdapterError, FieldValue, Filter, Limit, Record, Sort};
use crate::collections;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconcileReport {
    pub headers_healed: u64,
    pub dispatch_rows_healed: u64,
}

/// One sweep: scan `commit_headers` and `dispatch` for rows whose
/// `commit_id` is empty but whose `(aggregate_id, instance_id, version)`
/// matches a persisted `commits` row, and copy the `commit_id` across.
#[instrument(skip(adapter))]
pub async fn reconcile_once(adapter: &dyn Adapter) -> Result<ReconcileReport, AdapterError> {
    let open_headers = adapter
        .find(
            collections::COMMIT_HEADERS,
            &Filter::new().eq("commit_id", FieldValue::Null),
            &Sort::default(),
            Limit::Unbounded,
        )
        .await?;

    let mut headers_healed = 0u64;
    for header in &open_headers {
        if let Some(commit_id) = matching_commit_id(adapter, header).await? {
            let Some(row_id) = header.get("row_id").cloned() else {
                continue;
            };
            let mut patch = Record::new();
            patch.insert("commit_id".into(), FieldValue::Str(commit_id.clone()));
            adapter
                .update_by_id(collections::COMMIT_HEADERS, "row_id", &row_id, patch)
                .await?;
            headers_healed += 1;
            warn!(commit_id, "healed commit_headers row left by a crashed writer");
        }
    }

    let open_dispatch = adapter
        .find(
            collections::DISPATCH,
            &Filter::new().eq("commit_id", FieldValue::Null),
            &Sort::default(),
            Limit::Unbounded,
        )
        .await?;

    let mut dispatch_rows_healed = 0u64;
    for row in &open_dispatch {
        if let Some(commit_id) = matching_commit_id(adapter, row).await? {
            let Some(dispatch_id) = row.get("dispatch_id").cloned() else {
                continue;
            };
            let mut patch = Record::new();
            patch.insert("commit_id".into(), FieldValue::Str(commit_id.clone()));
            adapter
                .update_by_id(collections::DISPATCH, "dispatch_id", &dispatch_id, patch)
                .await?;
            dispatch_rows_healed += 1;
            warn!(commit_id, "healed dispatch row left by a crashed writer");
        }
    }

    if headers_healed > 0 || dispatch_rows_healed > 0 {
        info!(headers_healed, dispatch_rows_healed, "recovery pass healed rows");
    }

    Ok(ReconcileReport {
        headers_healed,
        dispatch_rows_healed,
    })
}

async fn matching_commit_id(adapter: &dyn Adapter, row: &Record) -> Result<Option<String>, AdapterError> {
    let (Some(agg), Some(inst), Some(version)) = (
        row.get("aggregate_id").and_then(|v| v.as_str()),
        row.get("instance_id").and_then(|v| v.as_str()),
        row.get("version").and_then(|v| v.as_int()),
    ) else {
        return Ok(None);
    };
    let filter = Filter::new()
        .eq("aggregate_id", FieldValue::Str(agg.to_string()))
        .eq("instance_id", FieldValue::Str(inst.to_string()))
        .eq("version", FieldValue::Int(version));
    let commit = adapter.find_one(collections::COMMITS, &filter, &Sort::default()).await?;
    Ok(commit.and_then(|c| c.get("commit_id").and_then(|v| v.as_str()).map(str::to_string)))
}

/// Handle to a spawned recovery worker. Dropping it does not stop the
/// worker; call `shutdown` for a clean stop (mirrors
/// `ProjectionWorker::WorkerHandle`).
pub struct RecoveryHandle {
    shutdown: tokio::sync::oneshot::Sender<()>,
    join: tokio::task::JoinHandle<()>,
}

impl RecoveryHandle {
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(());
        let _ = self.join.await;
    }
}

/// Spawns a background task that calls `reconcile_once` on `interval` until
/// shut down.
pub fn spawn(adapter: Arc<dyn Adapter>, interval: Duration) -> RecoveryHandle {
    let (shutdown_tx, mut shutdown_rx) = tokio::sync::oneshot::channel::<()>();
    let join = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(err) = reconcile_once(adapter.as_ref()).await {
                        warn!(?err, "recovery pass sweep failed");
                    }
                }
                _ = &mut shutdown_rx => break,
            }
        }
    });
    RecoveryHandle { shutdown: shutdown_tx, join }
}
