//! Read view: ordered queries by version, count and time (spec.md §4.D,
//! `ReadRepo` in cqrs.go).

use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;

use escore_core::{AggregateId, Deadline, InstanceId};
use escore_events::EventCommit;

use crate::adapter::{Adapter, AdapterError, FieldValue, Limit, Sort, SortOrder};
use crate::collections;
use crate::coordinator::{instance_filter, record_to_commit};

#[derive(Debug, Error)]
pub enum ReadError {
    #[error("no commit at version {0}")]
    NotFound(u64),

    #[error("operation cancelled")]
    Cancelled,

    #[error("deadline exceeded")]
    DeadlineExceeded,

    #[error(transparent)]
    Storage(#[from] AdapterError),
}

fn check(deadline: &Deadline) -> Result<(), ReadError> {
    deadline.check(|| ReadError::Cancelled, || ReadError::DeadlineExceeded)
}

/// Read-only view over one instance's commit log.
pub struct ReadView {
    adapter: Arc<dyn Adapter>,
    aggregate_id: AggregateId,
    instance_id: InstanceId,
}

impl ReadView {
    pub fn new(adapter: Arc<dyn Adapter>, aggregate_id: AggregateId, instance_id: InstanceId) -> Self {
        Self {
            adapter,
            aggregate_id,
            instance_id,
        }
    }

    pub async fn count_commits(&self) -> Result<u64, ReadError> {
        self.count_commits_cancellable(&Deadline::none()).await
    }

    pub async fn count_commits_cancellable(&self, deadline: &Deadline) -> Result<u64, ReadError> {
        check(deadline)?;
        Ok(self.adapter.count(collections::COMMITS, &self.scope()).await?)
    }

    /// Ascending by version.
    pub async fn read_all(&self) -> Result<Vec<EventCommit>, ReadError> {
        self.read_sorted(Limit::Unbounded, &Deadline::none()).await
    }

    pub async fn read_all_cancellable(&self, deadline: &Deadline) -> Result<Vec<EventCommit>, ReadError> {
        self.read_sorted(Limit::Unbounded, deadline).await
    }

    pub async fn read_version(&self, version: u64) -> Result<EventCommit, ReadError> {
        self.read_version_cancellable(version, &Deadline::none()).await
    }

    pub async fn read_version_cancellable(
        &self,
        version: u64,
        deadline: &Deadline,
    ) -> Result<EventCommit, ReadError> {
        check(deadline)?;
        let filter = self.scope().eq("version", FieldValue::Int(version as i64));
        let row = self
            .adapter
            .find_one(collections::COMMITS, &filter, &Sort::default())
            .await?;
        row.and_then(|r| record_to_commit(&r))
            .ok_or(ReadError::NotFound(version))
    }

    /// `count <= 0` means "no limit", i.e. return everything (spec.md §8
    /// boundary behavior).
    pub async fn read_since_count(&self, count: i64) -> Result<Vec<EventCommit>, ReadError> {
        self.read_sorted(Limit::from_signed(count), &Deadline::none()).await
    }

    pub async fn read_since_count_cancellable(
        &self,
        count: i64,
        deadline: &Deadline,
    ) -> Result<Vec<EventCommit>, ReadError> {
        self.read_sorted(Limit::from_signed(count), deadline).await
    }

    /// `limit <= 0` means "no upper bound on count".
    pub async fn read_since_time(
        &self,
        since: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<EventCommit>, ReadError> {
        self.read_since_time_cancellable(since, limit, &Deadline::none()).await
    }

    /// Ascending by `created`, then `version` as a tiebreaker for equal
    /// timestamps (spec.md §4.D).
    pub async fn read_since_time_cancellable(
        &self,
        since: DateTime<Utc>,
        limit: i64,
        deadline: &Deadline,
    ) -> Result<Vec<EventCommit>, ReadError> {
        check(deadline)?;
        let rows = self
            .adapter
            .find(
                collections::COMMITS,
                &self.scope(),
                &Sort(vec![
                    ("created".to_string(), SortOrder::Ascending),
                    ("version".to_string(), SortOrder::Ascending),
                ]),
                Limit::Unbounded,
            )
            .await?;
        let commits: Vec<EventCommit> = rows.iter().filter_map(record_to_commit).collect();
        let filtered: Vec<EventCommit> = commits.into_iter().filter(|c| c.created >= since).collect();
        Ok(Limit::from_signed(limit).apply(filtered))
    }

    pub async fn read_since_version(
        &self,
        version: u64,
        limit: i64,
    ) -> Result<Vec<EventCommit>, ReadError> {
        self.read_since_version_cancellable(version, limit, &Deadline::none()).await
    }

    pub async fn read_since_version_cancellable(
        &self,
        version: u64,
        limit: i64,
        deadline: &Deadline,
    ) -> Result<Vec<EventCommit>, ReadError> {
        let all = self.read_sorted(Limit::Unbounded, deadline).await?;
        let filtered: Vec<EventCommit> = all
            .into_iter()
            .filter(|c| c.version.get() >= version)
            .collect();
        Ok(Limit::from_signed(limit).apply(filtered))
    }

    fn scope(&self) -> crate::adapter::Filter {
        instance_filter(&self.aggregate_id, &self.instance_id)
    }

    async fn read_sorted(&self, limit: Limit, deadline: &Deadline) -> Result<Vec<EventCommit>, ReadError> {
        check(deadline)?;
        let rows = self
            .adapter
            .find(
                collections::COMMITS,
                &self.scope(),
                &Sort::by("version", SortOrder::Ascending),
                limit,
            )
            .await?;
        Ok(rows.iter().filter_map(record_to_commit).collect())
    }
}
