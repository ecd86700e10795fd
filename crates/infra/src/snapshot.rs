//! Snapshot store (spec.md §4.G): a pure store for opaque periodic
//! materializations, keyed by id, revision or version range. Snapshot
//! selection, compaction and invalidation are caller concerns — this module
//! only persists and retrieves what it is handed.

use std::sync::Arc;

use thiserror::Error;

use escore_core::{AggregateId, Deadline, InstanceId, Version};
use escore_events::Snapshot;

use crate::adapter::{Adapter, AdapterError, FieldValue, Filter, Limit, Record, Sort, SortOrder};
use crate::collections;

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("no snapshot with id {0}")]
    NotFound(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error("deadline exceeded")]
    DeadlineExceeded,

    #[error(transparent)]
    Storage(#[from] AdapterError),
}

fn check(deadline: &Deadline) -> Result<(), SnapshotError> {
    deadline.check(|| SnapshotError::Cancelled, || SnapshotError::DeadlineExceeded)
}

/// Writer + reader surface over one instance's snapshots (spec.md §4.G).
pub struct SnapshotStore {
    adapter: Arc<dyn Adapter>,
    aggregate_id: AggregateId,
    instance_id: InstanceId,
}

impl SnapshotStore {
    pub fn new(adapter: Arc<dyn Adapter>, aggregate_id: AggregateId, instance_id: InstanceId) -> Self {
        Self { adapter, aggregate_id, instance_id }
    }

    fn scope(&self) -> Filter {
        Filter::new()
            .eq("aggregate_id", FieldValue::Str(self.aggregate_id.as_str().to_string()))
            .eq("instance_id", FieldValue::Str(self.instance_id.as_str().to_string()))
    }

    /// Inserts a new snapshot row.
    pub async fn write(&self, snap: Snapshot) -> Result<(), SnapshotError> {
        check(&Deadline::none())?;
        self.adapter.insert(collections::SNAPSHOTS, snapshot_to_record(&snap)).await?;
        Ok(())
    }

    /// Upsert-by-revision (spec.md §9, resolved Open Question: "Rewrite
    /// semantics … specify as upsert-by-revision"). Replaces the row for
    /// `revision` if one already exists for this instance, otherwise
    /// inserts a fresh one.
    pub async fn rewrite(&self, revision: i64, snap: Snapshot) -> Result<(), SnapshotError> {
        let filter = self.scope().eq("revision", FieldValue::Int(revision));
        match self.adapter.find_one(collections::SNAPSHOTS, &filter, &Sort::default()).await? {
            Some(existing) => {
                let Some(snap_id) = existing.get("snap_id").cloned() else {
                    return Err(AdapterError::Storage("snapshot row missing snap_id".into()).into());
                };
                self.adapter
                    .update_by_id(collections::SNAPSHOTS, "snap_id", &snap_id, snapshot_to_record(&snap))
                    .await?;
            }
            None => {
                self.adapter.insert(collections::SNAPSHOTS, snapshot_to_record(&snap)).await?;
            }
        }
        Ok(())
    }

    pub async fn read_all(&self) -> Result<Vec<Snapshot>, SnapshotError> {
        let rows = self
            .adapter
            .find(collections::SNAPSHOTS, &self.scope(), &Sort::by("revision", SortOrder::Ascending), Limit::Unbounded)
            .await?;
        Ok(rows.iter().filter_map(record_to_snapshot).collect())
    }

    pub async fn read_id(&self, snap_id: &str) -> Result<Snapshot, SnapshotError> {
        let filter = self.scope().eq("snap_id", FieldValue::Str(snap_id.to_string()));
        let row = self.adapter.find_one(collections::SNAPSHOTS, &filter, &Sort::default()).await?;
        row.as_ref()
            .and_then(record_to_snapshot)
            .ok_or_else(|| SnapshotError::NotFound(snap_id.to_string()))
    }

    pub async fn read_revision(&self, revision: i64) -> Result<Snapshot, SnapshotError> {
        let filter = self.scope().eq("revision", FieldValue::Int(revision));
        let row = self.adapter.find_one(collections::SNAPSHOTS, &filter, &Sort::default()).await?;
        row.as_ref()
            .and_then(record_to_snapshot)
            .ok_or_else(|| SnapshotError::NotFound(format!("revision {revision}")))
    }

    /// Snapshots whose `[from_version, to_version]` range overlaps
    /// `[from_v, to_v]`.
    pub async fn read_version(&self, from_v: Version, to_v: Version) -> Result<Vec<Snapshot>, SnapshotError> {
        let all = self.read_all().await?;
        Ok(all
            .into_iter()
            .filter(|s| s.from_version <= to_v && s.to_version >= from_v)
            .collect())
    }
}

fn snapshot_to_record(snap: &Snapshot) -> Record {
    let mut record = Record::new();
    record.insert("snap_id".into(), FieldValue::Str(snap.snap_id.clone()));
    record.insert("aggregate_id".into(), FieldValue::Str(snap.aggregate_id.as_str().to_string()));
    record.insert("instance_id".into(), FieldValue::Str(snap.instance_id.as_str().to_string()));
    record.insert("revision".into(), FieldValue::Int(snap.revision));
    record.insert("from_version".into(), FieldValue::Int(snap.from_version.get() as i64));
    record.insert("to_version".into(), FieldValue::Int(snap.to_version.get() as i64));
    record.insert(
        "payload".into(),
        FieldValue::Json(serde_json::to_value(&snap.payload).unwrap_or(serde_json::Value::Null)),
    );
    record.insert(
        "header".into(),
        FieldValue::Json(serde_json::to_value(&snap.header).unwrap_or(serde_json::Value::Null)),
    );
    record.insert(
        "meta".into(),
        snap.meta.clone().map(FieldValue::Json).unwrap_or(FieldValue::Null),
    );
    record
}

fn record_to_snapshot(record: &Record) -> Option<Snapshot> {
    let snap_id = record.get("snap_id")?.as_str()?.to_string();
    let aggregate_id = AggregateId::new(record.get("aggregate_id")?.as_str()?).ok()?;
    let instance_id = InstanceId::new(record.get("instance_id")?.as_str()?).ok()?;
    let revision = record.get("revision")?.as_int()?;
    let from_version = Version::new(record.get("from_version")?.as_int()? as u64);
    let to_version = Version::new(record.get("to_version")?.as_int()? as u64);
    let payload = match record.get("payload") {
        Some(FieldValue::Json(v)) => serde_json::from_value(v.clone()).ok()?,
        _ => return None,
    };
    let header = match record.get("header") {
        Some(FieldValue::Json(v)) => serde_json::from_value(v.clone()).ok()?,
        _ => Default::default(),
    };
    let meta = match record.get("meta") {
        Some(FieldValue::Json(v)) => Some(v.clone()),
        _ => None,
    };
    Some(Snapshot {
        snap_id,
        aggregate_id,
        instance_id,
        revision,
        from_version,
        to_version,
        payload,
        header,
        meta,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::InMemoryAdapter;
    use escore_events::Payload;

    fn sample(revision: i64, from: u64, to: u64) -> Snapshot {
        Snapshot {
            snap_id: format!("snap-{revision}"),
            aggregate_id: AggregateId::new("agg").unwrap(),
            instance_id: InstanceId::new("inst").unwrap(),
            revision,
            from_version: Version::new(from),
            to_version: Version::new(to),
            payload: Payload::json(serde_json::json!({"balance": 10})),
            header: Default::default(),
            meta: None,
        }
    }

    fn store() -> SnapshotStore {
        let adapter: Arc<dyn Adapter> = Arc::new(InMemoryAdapter::new());
        SnapshotStore::new(adapter, AggregateId::new("agg").unwrap(), InstanceId::new("inst").unwrap())
    }

    #[tokio::test]
    async fn write_then_read_all_round_trips() {
        let store = store();
        store.write(sample(1, 1, 10)).await.unwrap();
        let all = store.read_all().await.unwrap();
        assert_eq!(all, vec![sample(1, 1, 10)]);
    }

    #[tokio::test]
    async fn read_id_and_read_revision_find_the_right_row() {
        let store = store();
        store.write(sample(1, 1, 10)).await.unwrap();
        store.write(sample(2, 11, 20)).await.unwrap();

        assert_eq!(store.read_id("snap-2").await.unwrap().revision, 2);
        assert_eq!(store.read_revision(1).await.unwrap().snap_id, "snap-1");
        assert!(matches!(store.read_id("missing").await, Err(SnapshotError::NotFound(_))));
    }

    #[tokio::test]
    async fn rewrite_upserts_by_revision() {
        let store = store();
        store.write(sample(1, 1, 10)).await.unwrap();

        let mut replacement = sample(1, 1, 15);
        replacement.snap_id = "snap-1-v2".into();
        store.rewrite(1, replacement).await.unwrap();

        let all = store.read_all().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].snap_id, "snap-1-v2");
        assert_eq!(all[0].to_version, Version::new(15));
    }

    #[tokio::test]
    async fn rewrite_inserts_when_no_prior_revision_exists() {
        let store = store();
        store.rewrite(3, sample(3, 21, 30)).await.unwrap();
        assert_eq!(store.read_all().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn read_version_returns_overlapping_ranges() {
        let store = store();
        store.write(sample(1, 1, 10)).await.unwrap();
        store.write(sample(2, 11, 20)).await.unwrap();
        store.write(sample(3, 21, 30)).await.unwrap();

        let overlapping = store.read_version(Version::new(15), Version::new(25)).await.unwrap();
        let revisions: Vec<i64> = overlapping.iter().map(|s| s.revision).collect();
        assert_eq!(revisions, vec![2, 3]);
    }
}
