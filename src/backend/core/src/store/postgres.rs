//! PostgreSQL entity store backend.
//!
//! One physical table holds every record type; the sort-key prefix carries
//! the type, a `(index_pk, index_sk)` pair carries the secondary index, and
//! the full record body is stored as JSONB so new types and categories need
//! no migration.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};

use crate::error::{CortexError, Result};
use crate::model::{EntityRecord, ItemType};

use super::{decode_index_cursor, encode_index_cursor, EntityStore, QueryPage};

/// PostgreSQL-backed entity store.
#[derive(Clone)]
pub struct PostgresEntityStore {
    pool: PgPool,
}

impl PostgresEntityStore {
    /// Create a new store over a connection pool.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(std::time::Duration::from_secs(5))
            .connect(database_url)
            .await?;

        Ok(Self { pool })
    }

    /// Wrap an existing pool.
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Run migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| CortexError::from(sqlx::Error::Migrate(Box::new(e))))?;
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    fn row_fields(record: &EntityRecord) -> Result<RowFields> {
        let (index_pk, index_sk) = match record.index_key() {
            Some((pk, sk)) => (Some(pk), Some(sk)),
            None => (None, None),
        };
        let expires_at = match record {
            EntityRecord::Message(m) => Some(m.expires_at),
            _ => None,
        };
        Ok(RowFields {
            status: record.status_label(),
            index_pk,
            index_sk,
            expires_at,
            body: serde_json::to_value(record)?,
        })
    }

    fn decode_row(row: &sqlx::postgres::PgRow) -> Result<EntityRecord> {
        let body: serde_json::Value = row.get("body");
        Ok(serde_json::from_value(body)?)
    }
}

struct RowFields {
    status: String,
    index_pk: Option<String>,
    index_sk: Option<String>,
    expires_at: Option<DateTime<Utc>>,
    body: serde_json::Value,
}

#[async_trait]
impl EntityStore for PostgresEntityStore {
    async fn put(&self, record: &EntityRecord) -> Result<()> {
        let fields = Self::row_fields(record)?;

        sqlx::query(
            r#"
            INSERT INTO entities (namespace, sort_key, item_type, status, index_pk, index_sk, expires_at, body)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (namespace, sort_key) DO UPDATE SET
                status = EXCLUDED.status,
                index_pk = EXCLUDED.index_pk,
                index_sk = EXCLUDED.index_sk,
                expires_at = EXCLUDED.expires_at,
                body = EXCLUDED.body
            "#,
        )
        .bind(record.namespace())
        .bind(record.sort_key())
        .bind(record.item_type().as_str())
        .bind(&fields.status)
        .bind(&fields.index_pk)
        .bind(&fields.index_sk)
        .bind(fields.expires_at)
        .bind(&fields.body)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn put_if_status(&self, record: &EntityRecord, expected_status: &str) -> Result<()> {
        let fields = Self::row_fields(record)?;

        // Single conditional UPDATE; the WHERE clause is the compare-and-swap.
        let result = sqlx::query(
            r#"
            UPDATE entities SET
                status = $4,
                index_pk = $5,
                index_sk = $6,
                expires_at = $7,
                body = $8
            WHERE namespace = $1 AND sort_key = $2 AND status = $3
            "#,
        )
        .bind(record.namespace())
        .bind(record.sort_key())
        .bind(expected_status)
        .bind(&fields.status)
        .bind(&fields.index_pk)
        .bind(&fields.index_sk)
        .bind(fields.expires_at)
        .bind(&fields.body)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            let actual: Option<String> = sqlx::query_scalar(
                "SELECT status FROM entities WHERE namespace = $1 AND sort_key = $2",
            )
            .bind(record.namespace())
            .bind(record.sort_key())
            .fetch_optional(&self.pool)
            .await?;

            return Err(CortexError::conflict(
                record.sort_key(),
                expected_status,
                actual.as_deref().unwrap_or("<absent>"),
            ));
        }

        Ok(())
    }

    async fn get(&self, namespace: &str, sort_key: &str) -> Result<Option<EntityRecord>> {
        let row = sqlx::query("SELECT body FROM entities WHERE namespace = $1 AND sort_key = $2")
            .bind(namespace)
            .bind(sort_key)
            .fetch_optional(&self.pool)
            .await?;

        row.map(|r| Self::decode_row(&r)).transpose()
    }

    async fn query_prefix(
        &self,
        namespace: &str,
        item_type: ItemType,
        after: Option<&str>,
        limit: usize,
    ) -> Result<QueryPage> {
        let start = after.unwrap_or("");
        let rows = sqlx::query(
            r#"
            SELECT body, sort_key FROM entities
            WHERE namespace = $1 AND item_type = $2 AND sort_key > $3
            ORDER BY sort_key
            LIMIT $4
            "#,
        )
        .bind(namespace)
        .bind(item_type.as_str())
        .bind(start)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        let mut items = Vec::with_capacity(rows.len());
        let mut last_key = None;
        for row in &rows {
            last_key = Some(row.get::<String, _>("sort_key"));
            items.push(Self::decode_row(row)?);
        }

        let next = if items.len() >= limit { last_key } else { None };
        Ok(QueryPage { items, next })
    }

    async fn query_index(
        &self,
        index_partition: &str,
        after: Option<&str>,
        limit: usize,
    ) -> Result<QueryPage> {
        let (start_sk, start_record) = match after {
            Some(cursor) => decode_index_cursor(cursor),
            None => (String::new(), String::new()),
        };

        let rows = sqlx::query(
            r#"
            SELECT body, sort_key, index_sk FROM entities
            WHERE index_pk = $1 AND (index_sk, sort_key) > ($2, $3)
            ORDER BY index_sk, sort_key
            LIMIT $4
            "#,
        )
        .bind(index_partition)
        .bind(&start_sk)
        .bind(&start_record)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        let mut items = Vec::with_capacity(rows.len());
        let mut last_cursor = None;
        for row in &rows {
            let sort_key: String = row.get("sort_key");
            let index_sk: String = row.get("index_sk");
            last_cursor = Some(encode_index_cursor(&index_sk, &sort_key));
            items.push(Self::decode_row(row)?);
        }

        let next = if items.len() >= limit { last_cursor } else { None };
        Ok(QueryPage { items, next })
    }

    async fn purge_expired(&self, namespace: &str, now: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query(
            r#"
            DELETE FROM entities
            WHERE namespace = $1 AND item_type = 'message' AND expires_at < $2
            "#,
        )
        .bind(namespace)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn put_many(&self, records: &[EntityRecord]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;
        for record in records {
            let fields = Self::row_fields(record)?;
            sqlx::query(
                r#"
                INSERT INTO entities (namespace, sort_key, item_type, status, index_pk, index_sk, expires_at, body)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                ON CONFLICT (namespace, sort_key) DO UPDATE SET
                    status = EXCLUDED.status,
                    index_pk = EXCLUDED.index_pk,
                    index_sk = EXCLUDED.index_sk,
                    expires_at = EXCLUDED.expires_at,
                    body = EXCLUDED.body
                "#,
            )
            .bind(record.namespace())
            .bind(record.sort_key())
            .bind(record.item_type().as_str())
            .bind(&fields.status)
            .bind(&fields.index_pk)
            .bind(&fields.index_sk)
            .bind(fields.expires_at)
            .bind(&fields.body)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;

        Ok(())
    }
}
