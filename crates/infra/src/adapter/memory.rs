//! In-memory adapter for tests/dev (grounded on
//! `forgeerp-infra::event_store::InMemoryEventStore`'s `RwLock<HashMap<_>>`
//! shape). Not optimized for performance; unique-index enforcement is a
//! linear scan per insert.

use std::collections::HashMap;
use std::sync::RwLock;

use super::{Adapter, AdapterError, FieldValue, Filter, Limit, Record, Sort, SortOrder};

#[derive(Debug, Default)]
struct CollectionState {
    records: Vec<Record>,
    /// Field-name tuples each insert must stay unique on.
    unique_indexes: Vec<Vec<String>>,
}

/// In-memory implementation of the storage adapter contract.
///
/// Intended for tests, examples, and the reference publisher/recovery demo;
/// not for production (no durability, no cross-process sharing).
#[derive(Debug, Default)]
pub struct InMemoryAdapter {
    collections: RwLock<HashMap<String, CollectionState>>,
}

impl InMemoryAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    fn conflicts(state: &CollectionState, candidate: &Record) -> Option<String> {
        for index in &state.unique_indexes {
            let candidate_key: Vec<&FieldValue> =
                index.iter().filter_map(|f| candidate.get(f)).collect();
            if candidate_key.len() != index.len() {
                // Missing one of the indexed fields: nothing to conflict on.
                continue;
            }
            // A `Null` indexed field is never equal to another `Null`
            // (Postgres/Mongo sparse-unique-index semantics): `commit_id`
            // stays `Null` while a lease/dispatch placeholder is open, and
            // the write coordinator relies on two open placeholders never
            // colliding on that field.
            if candidate_key.iter().any(|v| matches!(v, FieldValue::Null)) {
                continue;
            }
            for existing in &state.records {
                let existing_key: Vec<&FieldValue> =
                    index.iter().filter_map(|f| existing.get(f)).collect();
                if existing_key.len() == index.len() && existing_key == candidate_key {
                    return Some(index.join(","));
                }
            }
        }
        None
    }

    fn sorted(mut records: Vec<Record>, sort: &Sort) -> Vec<Record> {
        if sort.0.is_empty() {
            return records;
        }
        records.sort_by(|a, b| {
            for (field, order) in &sort.0 {
                let av = a.get(field);
                let bv = b.get(field);
                let ord = compare_values(av, bv);
                let ord = match order {
                    SortOrder::Ascending => ord,
                    SortOrder::Descending => ord.reverse(),
                };
                if ord != std::cmp::Ordering::Equal {
                    return ord;
                }
            }
            std::cmp::Ordering::Equal
        });
        records
    }
}

fn compare_values(a: Option<&FieldValue>, b: Option<&FieldValue>) -> std::cmp::Ordering {
    use std::cmp::Ordering;
    match (a, b) {
        (Some(FieldValue::Str(x)), Some(FieldValue::Str(y))) => x.cmp(y),
        (Some(FieldValue::Int(x)), Some(FieldValue::Int(y))) => x.cmp(y),
        (Some(FieldValue::Time(x)), Some(FieldValue::Time(y))) => x.cmp(y),
        (Some(FieldValue::Bool(x)), Some(FieldValue::Bool(y))) => x.cmp(y),
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        _ => Ordering::Equal,
    }
}

#[async_trait::async_trait]
impl Adapter for InMemoryAdapter {
    async fn count(&self, collection: &str, filter: &Filter) -> Result<u64, AdapterError> {
        let collections = self
            .collections
            .read()
            .map_err(|_| AdapterError::Storage("lock poisoned".into()))?;
        let count = collections
            .get(collection)
            .map(|state| state.records.iter().filter(|r| filter.matches(r)).count())
            .unwrap_or(0);
        Ok(count as u64)
    }

    async fn find_one(
        &self,
        collection: &str,
        filter: &Filter,
        sort: &Sort,
    ) -> Result<Option<Record>, AdapterError> {
        let found = self.find(collection, filter, sort, Limit::At(1)).await?;
        Ok(found.into_iter().next())
    }

    async fn find(
        &self,
        collection: &str,
        filter: &Filter,
        sort: &Sort,
        limit: Limit,
    ) -> Result<Vec<Record>, AdapterError> {
        let collections = self
            .collections
            .read()
            .map_err(|_| AdapterError::Storage("lock poisoned".into()))?;
        let matched: Vec<Record> = collections
            .get(collection)
            .map(|state| {
                state
                    .records
                    .iter()
                    .filter(|r| filter.matches(r))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        Ok(limit.apply(Self::sorted(matched, sort)))
    }

    async fn insert(&self, collection: &str, record: Record) -> Result<(), AdapterError> {
        let mut collections = self
            .collections
            .write()
            .map_err(|_| AdapterError::Storage("lock poisoned".into()))?;
        let state = collections.entry(collection.to_string()).or_default();
        if let Some(index) = Self::conflicts(state, &record) {
            return Err(AdapterError::UniqueViolation(index));
        }
        state.records.push(record);
        Ok(())
    }

    async fn update_by_id(
        &self,
        collection: &str,
        id_field: &str,
        id: &FieldValue,
        patch: Record,
    ) -> Result<(), AdapterError> {
        let mut collections = self
            .collections
            .write()
            .map_err(|_| AdapterError::Storage("lock poisoned".into()))?;
        let state = collections.entry(collection.to_string()).or_default();
        let record = state
            .records
            .iter_mut()
            .find(|r| r.get(id_field) == Some(id));
        match record {
            Some(record) => {
                for (k, v) in patch {
                    record.insert(k, v);
                }
                Ok(())
            }
            None => Err(AdapterError::Storage(format!(
                "no record in {collection} with {id_field}={id:?}"
            ))),
        }
    }

    async fn remove_all(&self, collection: &str, filter: &Filter) -> Result<u64, AdapterError> {
        let mut collections = self
            .collections
            .write()
            .map_err(|_| AdapterError::Storage("lock poisoned".into()))?;
        let Some(state) = collections.get_mut(collection) else {
            return Ok(0);
        };
        let before = state.records.len();
        state.records.retain(|r| !filter.matches(r));
        Ok((before - state.records.len()) as u64)
    }

    async fn ensure_unique_index(
        &self,
        collection: &str,
        fields: &[&str],
    ) -> Result<(), AdapterError> {
        let mut collections = self
            .collections
            .write()
            .map_err(|_| AdapterError::Storage("lock poisoned".into()))?;
        let state = collections.entry(collection.to_string()).or_default();
        let fields: Vec<String> = fields.iter().map(|f| f.to_string()).collect();
        if !state.unique_indexes.contains(&fields) {
            state.unique_indexes.push(fields);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(pairs: &[(&str, FieldValue)]) -> Record {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[tokio::test]
    async fn insert_enforces_unique_index() {
        let adapter = InMemoryAdapter::new();
        adapter.ensure_unique_index("commits", &["commit_id"]).await.unwrap();

        adapter
            .insert("commits", rec(&[("commit_id", FieldValue::Str("c1".into()))]))
            .await
            .unwrap();

        let err = adapter
            .insert("commits", rec(&[("commit_id", FieldValue::Str("c1".into()))]))
            .await
            .unwrap_err();
        assert!(matches!(err, AdapterError::UniqueViolation(_)));
    }

    #[tokio::test]
    async fn find_respects_sort_and_limit() {
        let adapter = InMemoryAdapter::new();
        for v in [3, 1, 2] {
            adapter
                .insert("commits", rec(&[("version", FieldValue::Int(v))]))
                .await
                .unwrap();
        }

        let found = adapter
            .find(
                "commits",
                &Filter::new(),
                &Sort::by("version", SortOrder::Ascending),
                Limit::At(2),
            )
            .await
            .unwrap();

        let versions: Vec<i64> = found.iter().map(|r| r["version"].as_int().unwrap()).collect();
        assert_eq!(versions, vec![1, 2]);
    }

    #[tokio::test]
    async fn update_by_id_merges_patch_fields() {
        let adapter = InMemoryAdapter::new();
        adapter
            .insert(
                "commit_headers",
                rec(&[
                    ("version", FieldValue::Int(1)),
                    ("commit_id", FieldValue::Null),
                ]),
            )
            .await
            .unwrap();

        adapter
            .update_by_id(
                "commit_headers",
                "version",
                &FieldValue::Int(1),
                rec(&[("commit_id", FieldValue::Str("c1".into()))]),
            )
            .await
            .unwrap();

        let row = adapter
            .find_one("commit_headers", &Filter::new(), &Sort::default())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(row["commit_id"], FieldValue::Str("c1".into()));
    }

    /// Two rows both holding an open (`commit_id = Null`) lease must not
    /// collide on a `commit_id` unique index: Postgres/Mongo treat `NULL`
    /// as distinct from `NULL` in a unique index, and the write
    /// coordinator's lease/placeholder protocol depends on that to let two
    /// different instances each hold an open lease at the same time.
    #[tokio::test]
    async fn null_indexed_field_never_conflicts_with_another_null() {
        let adapter = InMemoryAdapter::new();
        adapter.ensure_unique_index("commit_headers", &["commit_id"]).await.unwrap();

        adapter
            .insert(
                "commit_headers",
                rec(&[
                    ("instance_id", FieldValue::Str("inst-a".into())),
                    ("commit_id", FieldValue::Null),
                ]),
            )
            .await
            .unwrap();

        adapter
            .insert(
                "commit_headers",
                rec(&[
                    ("instance_id", FieldValue::Str("inst-b".into())),
                    ("commit_id", FieldValue::Null),
                ]),
            )
            .await
            .unwrap();

        assert_eq!(adapter.count("commit_headers", &Filter::new()).await.unwrap(), 2);
    }
}
