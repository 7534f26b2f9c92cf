//! SQLite-backed job collection

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use tracing::debug;

use docket_queue::{Collection, JobDocument, JobFilter, JobUpdate, StoreError};

fn query_error(e: sqlx::Error) -> StoreError {
    StoreError::Query(e.to_string())
}

fn serialization_error(e: serde_json::Error) -> StoreError {
    StoreError::Serialization(e.to_string())
}

/// Table names are interpolated into SQL, so only plain identifiers pass.
fn validate_name(name: &str) -> Result<(), StoreError> {
    let mut chars = name.chars();
    let valid = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');

    if valid {
        Ok(())
    } else {
        Err(StoreError::InvalidCollection(name.to_string()))
    }
}

/// Nanoseconds since the epoch, saturating outside 1677..2262 so ordering
/// is preserved. Stored at full precision so `delay` comparisons agree with
/// the in-memory store.
fn epoch_nanos(at: DateTime<Utc>) -> i64 {
    at.timestamp_nanos_opt().unwrap_or(if at.timestamp() < 0 {
        i64::MIN
    } else {
        i64::MAX
    })
}

/// Column values derived from a document
struct Row {
    id: String,
    name: String,
    queue: String,
    status: &'static str,
    priority: i64,
    delay_ns: i64,
    query: Option<String>,
    doc: String,
}

impl Row {
    fn from_doc(doc: &JobDocument) -> Result<Self, StoreError> {
        Ok(Self {
            id: doc.id.to_string(),
            name: doc.name.clone(),
            queue: doc.queue.clone(),
            status: doc.status.as_str(),
            priority: doc.priority,
            delay_ns: epoch_nanos(doc.delay),
            query: doc
                .query
                .as_ref()
                .map(serde_json::to_string)
                .transpose()
                .map_err(serialization_error)?,
            doc: serde_json::to_string(doc).map_err(serialization_error)?,
        })
    }
}

fn decode(doc: &str) -> Result<JobDocument, StoreError> {
    serde_json::from_str(doc).map_err(serialization_error)
}

/// Append ` WHERE ...` for a filter. Lock predicates are compared as
/// canonical JSON text; `serde_json` writes object keys sorted.
fn push_filter(qb: &mut QueryBuilder<'_, Sqlite>, filter: &JobFilter) -> Result<(), StoreError> {
    qb.push(" WHERE 1 = 1");

    if let Some(id) = filter.id {
        qb.push(" AND id = ").push_bind(id.to_string());
    }
    if let Some(queue) = &filter.queue {
        qb.push(" AND queue = ").push_bind(queue.clone());
    }
    if let Some(status) = filter.status {
        qb.push(" AND status = ").push_bind(status.as_str());
    }
    if let Some(before) = filter.delay_before {
        qb.push(" AND delay_ns <= ").push_bind(epoch_nanos(before));
    }
    if let Some(min) = filter.min_priority {
        qb.push(" AND priority >= ").push_bind(min);
    }

    if let Some(names) = &filter.names {
        if names.is_empty() {
            qb.push(" AND 0 = 1");
        } else {
            qb.push(" AND name IN (");
            let mut list = qb.separated(", ");
            for name in names {
                list.push_bind(name.clone());
            }
            qb.push(")");
        }
    }

    if !filter.exclude_queries.is_empty() {
        qb.push(" AND (query IS NULL OR query NOT IN (");
        let mut list = qb.separated(", ");
        for query in &filter.exclude_queries {
            list.push_bind(serde_json::to_string(query).map_err(serialization_error)?);
        }
        qb.push("))");
    }

    Ok(())
}

/// Append the `SET` clause shared by claim and update_many
fn push_update(qb: &mut QueryBuilder<'_, Sqlite>, update: &JobUpdate) {
    let status = update.status.as_str();
    qb.push(" SET status = ")
        .push_bind(status)
        .push(", doc = json_set(doc, '$.status', ")
        .push_bind(status);
    if let Some(at) = update.dequeued {
        qb.push(", '$.dequeued', ")
            .push_bind(at.to_rfc3339_opts(SecondsFormat::AutoSi, true));
    }
    qb.push(")");
}

/// A collection stored as one SQLite table
#[derive(Debug, Clone)]
pub struct SqliteCollection {
    pool: SqlitePool,
    name: String,
}

impl SqliteCollection {
    /// Open a collection, creating its table if needed
    pub async fn open(pool: SqlitePool, name: &str) -> Result<Self, StoreError> {
        validate_name(name)?;

        sqlx::query(&format!(
            r#"
            CREATE TABLE IF NOT EXISTS "{name}" (
                id TEXT PRIMARY KEY NOT NULL,
                name TEXT NOT NULL,
                queue TEXT NOT NULL,
                status TEXT NOT NULL,
                priority INTEGER NOT NULL DEFAULT 0,
                delay_ns INTEGER NOT NULL,
                query TEXT,
                doc TEXT NOT NULL
            )
            "#
        ))
        .execute(&pool)
        .await
        .map_err(query_error)?;

        debug!(collection = %name, "Opened SQLite collection");
        Ok(Self {
            pool,
            name: name.to_string(),
        })
    }

    fn select(&self, columns: &str) -> QueryBuilder<'static, Sqlite> {
        QueryBuilder::new(format!(r#"SELECT {columns} FROM "{}""#, self.name))
    }

    async fn write(&self, sql: &str, doc: &JobDocument) -> Result<(), StoreError> {
        let row = Row::from_doc(doc)?;
        sqlx::query(sql)
            .bind(row.id)
            .bind(row.name)
            .bind(row.queue)
            .bind(row.status)
            .bind(row.priority)
            .bind(row.delay_ns)
            .bind(row.query)
            .bind(row.doc)
            .execute(&self.pool)
            .await
            .map_err(query_error)?;
        Ok(())
    }
}

#[async_trait]
impl Collection for SqliteCollection {
    fn name(&self) -> &str {
        &self.name
    }

    async fn insert(&self, doc: &JobDocument) -> Result<(), StoreError> {
        let sql = format!(
            r#"INSERT INTO "{}" (id, name, queue, status, priority, delay_ns, query, doc)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?)"#,
            self.name
        );
        self.write(&sql, doc).await
    }

    async fn save(&self, doc: &JobDocument) -> Result<(), StoreError> {
        let sql = format!(
            r#"INSERT INTO "{}" (id, name, queue, status, priority, delay_ns, query, doc)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?)
               ON CONFLICT(id) DO UPDATE SET
                   name = excluded.name,
                   queue = excluded.queue,
                   status = excluded.status,
                   priority = excluded.priority,
                   delay_ns = excluded.delay_ns,
                   query = excluded.query,
                   doc = excluded.doc"#,
            self.name
        );
        self.write(&sql, doc).await
    }

    async fn find_one(&self, filter: &JobFilter) -> Result<Option<JobDocument>, StoreError> {
        let mut qb = self.select("doc");
        push_filter(&mut qb, filter)?;
        qb.push(" ORDER BY priority DESC, id ASC LIMIT 1");

        let doc: Option<String> = qb
            .build_query_scalar()
            .fetch_optional(&self.pool)
            .await
            .map_err(query_error)?;
        doc.as_deref().map(decode).transpose()
    }

    async fn find(&self, filter: &JobFilter) -> Result<Vec<JobDocument>, StoreError> {
        let mut qb = self.select("doc");
        push_filter(&mut qb, filter)?;
        qb.push(" ORDER BY priority DESC, id ASC");

        let docs: Vec<String> = qb
            .build_query_scalar()
            .fetch_all(&self.pool)
            .await
            .map_err(query_error)?;
        docs.iter().map(|d| decode(d)).collect()
    }

    async fn claim(
        &self,
        filter: &JobFilter,
        update: &JobUpdate,
    ) -> Result<Option<JobDocument>, StoreError> {
        // SQLite runs the subselect and the update as one write, so no other
        // connection can claim the same row in between.
        let mut qb: QueryBuilder<'_, Sqlite> =
            QueryBuilder::new(format!(r#"UPDATE "{}""#, self.name));
        push_update(&mut qb, update);
        qb.push(format!(r#" WHERE id = (SELECT id FROM "{}""#, self.name));
        push_filter(&mut qb, filter)?;
        qb.push(" ORDER BY priority DESC, id ASC LIMIT 1) RETURNING doc");

        let doc: Option<String> = qb
            .build_query_scalar()
            .fetch_optional(&self.pool)
            .await
            .map_err(query_error)?;
        doc.as_deref().map(decode).transpose()
    }

    async fn update_many(
        &self,
        filter: &JobFilter,
        update: &JobUpdate,
    ) -> Result<u64, StoreError> {
        let mut qb: QueryBuilder<'_, Sqlite> =
            QueryBuilder::new(format!(r#"UPDATE "{}""#, self.name));
        push_update(&mut qb, update);
        push_filter(&mut qb, filter)?;

        let result = qb.build().execute(&self.pool).await.map_err(query_error)?;
        Ok(result.rows_affected())
    }

    async fn count(&self, filter: &JobFilter) -> Result<u64, StoreError> {
        let mut qb = self.select("COUNT(*)");
        push_filter(&mut qb, filter)?;

        let count: i64 = qb
            .build_query_scalar()
            .fetch_one(&self.pool)
            .await
            .map_err(query_error)?;
        Ok(count as u64)
    }

    async fn ensure_indexes(&self) -> Result<(), StoreError> {
        let name = &self.name;
        let statements = [
            format!(
                r#"CREATE INDEX IF NOT EXISTS "{name}_dequeue" ON "{name}" (status, queue, priority DESC, id)"#
            ),
            format!(r#"CREATE INDEX IF NOT EXISTS "{name}_locks" ON "{name}" (status, query)"#),
        ];

        for sql in &statements {
            sqlx::query(sql)
                .execute(&self.pool)
                .await
                .map_err(query_error)?;
        }

        debug!(collection = %name, "Ensured indexes");
        Ok(())
    }
}
