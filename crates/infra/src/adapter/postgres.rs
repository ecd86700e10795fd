//! Postgres-backed adapter (grounded on
//! `forgeerp-infra::event_store::PostgresEventStore`'s sqlx usage and error
//! mapping).
//!
//! All five logical collections (`commit_headers`, `commits`, `dispatch`,
//! `snapshots`, and whatever collection a caller names) share one physical
//! table, keyed by collection name plus an opaque JSON document — the same
//! trade the generic `Adapter` trait makes, pushed down to SQL. spec.md
//! §4.B asks for single-document atomic insert with unique-index
//! enforcement, not cross-collection transactions, so this is sufficient:
//! each `Adapter` method is exactly one statement.

use chrono::{DateTime, Utc};
use serde_json::Value as Json;
use sqlx::PgPool;
use tracing::instrument;

use super::{Adapter, AdapterError, FieldValue, Filter, Limit, Record, Sort, SortOrder};

/// `CREATE TABLE adapter_documents (collection text, doc jsonb)` plus, per
/// `ensure_unique_index` call, a partial expression index over
/// `(doc->>'field', ...)  WHERE collection = '<collection>'`.
#[derive(Debug, Clone)]
pub struct PostgresAdapter {
    pool: PgPool,
}

impl PostgresAdapter {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create the backing table. Safe to call on every startup.
    #[instrument(skip(self), err)]
    pub async fn migrate(&self) -> Result<(), AdapterError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS adapter_documents (
                row_id BIGSERIAL PRIMARY KEY,
                collection TEXT NOT NULL,
                doc JSONB NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("migrate", e))?;
        Ok(())
    }
}

fn field_to_json(value: &FieldValue) -> Json {
    match value {
        FieldValue::Str(s) => Json::String(s.clone()),
        FieldValue::Int(n) => Json::Number((*n).into()),
        FieldValue::Bool(b) => Json::Bool(*b),
        FieldValue::Time(t) => Json::String(t.to_rfc3339()),
        FieldValue::Json(v) => v.clone(),
        FieldValue::Null => Json::Null,
    }
}

fn json_to_field(value: &Json) -> FieldValue {
    match value {
        Json::String(s) => {
            if let Ok(t) = DateTime::parse_from_rfc3339(s) {
                FieldValue::Time(t.with_timezone(&Utc))
            } else {
                FieldValue::Str(s.clone())
            }
        }
        Json::Number(n) => n.as_i64().map(FieldValue::Int).unwrap_or(FieldValue::Null),
        Json::Bool(b) => FieldValue::Bool(*b),
        Json::Null => FieldValue::Null,
        other => FieldValue::Json(other.clone()),
    }
}

fn record_to_json(record: &Record) -> Json {
    Json::Object(
        record
            .iter()
            .map(|(k, v)| (k.clone(), field_to_json(v)))
            .collect(),
    )
}

fn json_to_record(value: Json) -> Record {
    match value {
        Json::Object(map) => map.iter().map(|(k, v)| (k.clone(), json_to_field(v))).collect(),
        _ => Record::new(),
    }
}

fn index_name(collection: &str, fields: &[&str]) -> String {
    format!("uq_{collection}_{}", fields.join("_"))
}

#[async_trait::async_trait]
impl Adapter for PostgresAdapter {
    #[instrument(skip(self, filter), err)]
    async fn count(&self, collection: &str, filter: &Filter) -> Result<u64, AdapterError> {
        // JSONB row filtering happens in Rust rather than SQL predicates built
        // from caller-supplied field names, same reasoning as find/find_one.
        let docs = fetch_collection(&self.pool, collection).await?;
        Ok(docs.iter().filter(|d| filter.matches(d)).count() as u64)
    }

    #[instrument(skip(self, filter, sort), err)]
    async fn find_one(
        &self,
        collection: &str,
        filter: &Filter,
        sort: &Sort,
    ) -> Result<Option<Record>, AdapterError> {
        Ok(self
            .find(collection, filter, sort, Limit::At(1))
            .await?
            .into_iter()
            .next())
    }

    #[instrument(skip(self, filter, sort), err)]
    async fn find(
        &self,
        collection: &str,
        filter: &Filter,
        sort: &Sort,
        limit: Limit,
    ) -> Result<Vec<Record>, AdapterError> {
        let mut docs: Vec<Record> = fetch_collection(&self.pool, collection)
            .await?
            .into_iter()
            .filter(|d| filter.matches(d))
            .collect();

        docs.sort_by(|a, b| {
            for (field, order) in &sort.0 {
                let ord = compare(a.get(field), b.get(field));
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

        Ok(limit.apply(docs))
    }

    #[instrument(skip(self, record), err)]
    async fn insert(&self, collection: &str, record: Record) -> Result<(), AdapterError> {
        let doc = record_to_json(&record);
        sqlx::query("INSERT INTO adapter_documents (collection, doc) VALUES ($1, $2)")
            .bind(collection)
            .bind(doc)
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("insert", e))?;
        Ok(())
    }

    #[instrument(skip(self, id, patch), err)]
    async fn update_by_id(
        &self,
        collection: &str,
        id_field: &str,
        id: &FieldValue,
        patch: Record,
    ) -> Result<(), AdapterError> {
        let docs = fetch_collection_with_row_id(&self.pool, collection).await?;
        let Some((row_id, mut doc)) = docs
            .into_iter()
            .find(|(_, doc)| doc.get(id_field) == Some(id))
        else {
            return Err(AdapterError::Storage(format!(
                "no record in {collection} with {id_field}={id:?}"
            )));
        };

        for (k, v) in patch {
            doc.insert(k, v);
        }

        sqlx::query("UPDATE adapter_documents SET doc = $1 WHERE row_id = $2")
            .bind(record_to_json(&doc))
            .bind(row_id)
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("update_by_id", e))?;
        Ok(())
    }

    #[instrument(skip(self, filter), err)]
    async fn remove_all(&self, collection: &str, filter: &Filter) -> Result<u64, AdapterError> {
        let docs = fetch_collection_with_row_id(&self.pool, collection).await?;
        let mut removed = 0u64;
        for (row_id, doc) in docs {
            if filter.matches(&doc) {
                sqlx::query("DELETE FROM adapter_documents WHERE row_id = $1")
                    .bind(row_id)
                    .execute(&self.pool)
                    .await
                    .map_err(|e| map_sqlx_error("remove_all", e))?;
                removed += 1;
            }
        }
        Ok(removed)
    }

    #[instrument(skip(self), err)]
    async fn ensure_unique_index(
        &self,
        collection: &str,
        fields: &[&str],
    ) -> Result<(), AdapterError> {
        let expr = fields
            .iter()
            .map(|f| format!("(doc->>'{f}')"))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "CREATE UNIQUE INDEX IF NOT EXISTS {} ON adapter_documents ({}) WHERE collection = '{}'",
            index_name(collection, fields),
            expr,
            collection
        );
        sqlx::query(&sql)
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("ensure_unique_index", e))?;
        Ok(())
    }
}

async fn fetch_collection(pool: &PgPool, collection: &str) -> Result<Vec<Record>, AdapterError> {
    Ok(fetch_collection_with_row_id(pool, collection)
        .await?
        .into_iter()
        .map(|(_, doc)| doc)
        .collect())
}

async fn fetch_collection_with_row_id(
    pool: &PgPool,
    collection: &str,
) -> Result<Vec<(i64, Record)>, AdapterError> {
    let rows: Vec<(i64, Json)> =
        sqlx::query_as("SELECT row_id, doc FROM adapter_documents WHERE collection = $1")
            .bind(collection)
            .fetch_all(pool)
            .await
            .map_err(|e| map_sqlx_error("fetch_collection", e))?;
    Ok(rows.into_iter().map(|(id, doc)| (id, json_to_record(doc))).collect())
}

fn compare(a: Option<&FieldValue>, b: Option<&FieldValue>) -> std::cmp::Ordering {
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

/// Mirrors `forgeerp-infra::event_store::postgres::map_sqlx_error`: unique
/// violations (`23505`) are the one adapter-level signal the coordinator
/// reinterprets, everything else is an opaque storage error.
fn map_sqlx_error(operation: &str, err: sqlx::Error) -> AdapterError {
    if let sqlx::Error::Database(ref db_err) = err {
        if db_err.code().as_deref() == Some("23505") {
            return AdapterError::UniqueViolation(db_err.message().to_string());
        }
    }
    AdapterError::Storage(format!("{operation}: {err}"))
}
