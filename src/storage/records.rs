//! Queryable news record store on SQLite.
//!
//! Records are keyed by `(Source, Id)` and read back newest first per source.
//! The most recent `CreatedAt` of a source doubles as the ingestion
//! watermark.

use crate::error::StoreError;
use crate::models::{NewsRecord, PageKey};
use crate::utils::validate_identifier;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info, instrument};

/// Row type for record queries.
type RecordRow = (String, String, String, String, String, i64, Option<String>);

/// Read/write access to persisted news records.
pub trait RecordStore {
    /// `CreatedAt` of the newest record of `source`, if any.
    async fn last_update(&self, source: &str) -> Result<Option<i64>, StoreError>;

    /// Write one record. Writing the same `(Source, Id)` again replaces it.
    async fn put(&self, record: &NewsRecord) -> Result<(), StoreError>;

    /// Up to `limit` records of `source`, newest first, optionally restricted
    /// to one `CreatedAt` and starting strictly after `after`.
    async fn query(
        &self,
        source: &str,
        created_at: Option<i64>,
        after: Option<&PageKey>,
        limit: u32,
    ) -> Result<Vec<NewsRecord>, StoreError>;
}

impl<T: RecordStore> RecordStore for &T {
    async fn last_update(&self, source: &str) -> Result<Option<i64>, StoreError> {
        (**self).last_update(source).await
    }

    async fn put(&self, record: &NewsRecord) -> Result<(), StoreError> {
        (**self).put(record).await
    }

    async fn query(
        &self,
        source: &str,
        created_at: Option<i64>,
        after: Option<&PageKey>,
        limit: u32,
    ) -> Result<Vec<NewsRecord>, StoreError> {
        (**self).query(source, created_at, after, limit).await
    }
}

/// [`RecordStore`] backed by one SQLite table.
#[derive(Clone)]
pub struct SqliteRecordStore {
    pool: SqlitePool,
    table: String,
}

impl SqliteRecordStore {
    /// Connect to `database_url` and create `table` if it does not exist.
    pub async fn connect(database_url: &str, table: &str) -> Result<Self, StoreError> {
        let table = validate_identifier(table)?;
        let options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .busy_timeout(Duration::from_secs(10));
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(10))
            .connect_with(options)
            .await?;

        info!(%database_url, %table, "Connected to record store");
        let store = Self { pool, table };
        store.migrate().await?;
        Ok(store)
    }

    /// Open an existing database and table without creating either, so a
    /// wrong `database_url` fails instead of listing an empty store.
    pub async fn open_existing(database_url: &str, table: &str) -> Result<Self, StoreError> {
        let table = validate_identifier(table)?;
        let options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(false)
            .busy_timeout(Duration::from_secs(10));
        let pool = SqlitePoolOptions::new()
            .max_connections(2)
            .acquire_timeout(Duration::from_secs(10))
            .connect_with(options)
            .await?;

        let exists = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?",
        )
        .bind(&table)
        .fetch_one(&pool)
        .await?;
        if exists == 0 {
            return Err(StoreError::MissingTable(table));
        }

        info!(%database_url, %table, "Opened existing record store");
        Ok(Self { pool, table })
    }

    /// In-memory store for tests.
    #[cfg(test)]
    pub async fn in_memory(table: &str) -> Result<Self, StoreError> {
        let table = validate_identifier(table)?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        let store = Self { pool, table };
        store.migrate().await?;
        Ok(store)
    }

    async fn migrate(&self) -> Result<(), StoreError> {
        let table = &self.table;
        sqlx::query(&format!(
            "CREATE TABLE IF NOT EXISTS {table} (
                Source TEXT NOT NULL,
                Id TEXT NOT NULL,
                Title TEXT NOT NULL,
                Summary TEXT NOT NULL,
                Link TEXT NOT NULL,
                CreatedAt INTEGER NOT NULL,
                Image TEXT,
                PRIMARY KEY (Source, Id)
            )"
        ))
        .execute(&self.pool)
        .await?;

        sqlx::query(&format!(
            "CREATE INDEX IF NOT EXISTS idx_{table}_source_created
             ON {table} (Source, CreatedAt DESC)"
        ))
        .execute(&self.pool)
        .await?;

        debug!(%table, "Record store schema ready");
        Ok(())
    }
}

impl RecordStore for SqliteRecordStore {
    #[instrument(level = "info", skip(self))]
    async fn last_update(&self, source: &str) -> Result<Option<i64>, StoreError> {
        let sql = format!(
            "SELECT CreatedAt FROM {} WHERE Source = ? ORDER BY CreatedAt DESC LIMIT 1",
            self.table
        );
        let created_at = sqlx::query_scalar::<_, i64>(&sql)
            .bind(source)
            .fetch_optional(&self.pool)
            .await?;
        Ok(created_at)
    }

    #[instrument(level = "debug", skip_all, fields(id = %record.id, source = %record.source))]
    async fn put(&self, record: &NewsRecord) -> Result<(), StoreError> {
        let sql = format!(
            "INSERT INTO {} (Source, Id, Title, Summary, Link, CreatedAt, Image)
             VALUES (?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(Source, Id) DO UPDATE SET
                Title = excluded.Title,
                Summary = excluded.Summary,
                Link = excluded.Link,
                CreatedAt = excluded.CreatedAt,
                Image = excluded.Image",
            self.table
        );
        sqlx::query(&sql)
            .bind(&record.source)
            .bind(&record.id)
            .bind(&record.title)
            .bind(&record.summary)
            .bind(&record.link)
            .bind(record.created_at)
            .bind(record.image.as_deref())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    #[instrument(level = "debug", skip(self))]
    async fn query(
        &self,
        source: &str,
        created_at: Option<i64>,
        after: Option<&PageKey>,
        limit: u32,
    ) -> Result<Vec<NewsRecord>, StoreError> {
        let mut sql = format!(
            "SELECT Source, Id, Title, Summary, Link, CreatedAt, Image FROM {} WHERE Source = ?",
            self.table
        );
        if created_at.is_some() {
            sql.push_str(" AND CreatedAt = ?");
        }
        if after.is_some() {
            sql.push_str(" AND (CreatedAt < ? OR (CreatedAt = ? AND Id < ?))");
        }
        sql.push_str(" ORDER BY CreatedAt DESC, Id DESC LIMIT ?");

        let mut query = sqlx::query_as::<_, RecordRow>(&sql).bind(source);
        if let Some(ts) = created_at {
            query = query.bind(ts);
        }
        if let Some(key) = after {
            query = query.bind(key.created_at).bind(key.created_at).bind(&key.id);
        }
        let rows = query.bind(i64::from(limit)).fetch_all(&self.pool).await?;

        Ok(rows
            .into_iter()
            .map(|(source, id, title, summary, link, created_at, image)| NewsRecord {
                id,
                title,
                summary,
                link,
                source,
                created_at,
                image,
            })
            .collect())
    }
}
