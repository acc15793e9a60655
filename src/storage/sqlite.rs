//! SQLite storage backend implementation
//!
//! ## Features
//!
//! - **Embedded**: No separate database server required
//! - **WAL mode**: Dashboard reads do not block report ingestion
//! - **Connection pooling**: Efficient resource usage
//! - **Migrations**: Automatic schema versioning with sqlx
//!
//! Timestamps are stored as unix milliseconds. Failed probes are stored with
//! a `NULL` latency.

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow, SqliteSynchronous,
};
use sqlx::{Pool, Row, Sqlite, Transaction};
use tracing::{debug, info, instrument, warn};

use super::backend::{BackendStats, HealthStatus, SampleQuery, StorageBackend};
use super::error::{StorageError, StorageResult};
use super::schema::SampleRow;
use crate::targets::{NewTarget, Target};

/// SQLite storage backend
pub struct SqliteBackend {
    pool: Pool<Sqlite>,
    db_path: String,
}

impl SqliteBackend {
    /// Open (or create) the database at `db_path` and run migrations
    #[instrument(skip_all)]
    pub async fn new(db_path: impl AsRef<Path>) -> StorageResult<Self> {
        let db_path_str = db_path.as_ref().to_string_lossy().to_string();

        info!("initializing SQLite backend at: {}", db_path_str);

        let options = SqliteConnectOptions::new()
            .filename(&db_path_str)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(std::time::Duration::from_secs(30));

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| StorageError::ConnectionFailed(e.to_string()))?;

        debug!("running database migrations");
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await?;

        info!("database migrations complete");

        Ok(Self {
            pool,
            db_path: db_path_str,
        })
    }

    fn millis_to_timestamp(millis: i64) -> StorageResult<DateTime<Utc>> {
        DateTime::from_timestamp_millis(millis)
            .ok_or_else(|| StorageError::InvalidData(format!("timestamp {} out of range", millis)))
    }

    fn to_u64(value: i64, column: &str) -> StorageResult<u64> {
        u64::try_from(value)
            .map_err(|_| StorageError::InvalidData(format!("negative {}: {}", column, value)))
    }

    fn to_i64(value: u64, column: &str) -> StorageResult<i64> {
        i64::try_from(value)
            .map_err(|_| StorageError::InvalidData(format!("{} too large: {}", column, value)))
    }

    fn target_from_row(row: &SqliteRow) -> StorageResult<Target> {
        Ok(Target {
            id: Self::to_u64(row.get("id"), "target id")?,
            name: row.get("name"),
            address: row.get("address"),
            enabled: row.get::<i64, _>("enabled") != 0,
            interval_seconds: Self::to_u64(row.get("interval_seconds"), "interval")?,
        })
    }

    fn sample_from_row(row: &SqliteRow) -> StorageResult<SampleRow> {
        Ok(SampleRow {
            node_id: row.get("node_id"),
            target_id: Self::to_u64(row.get("target_id"), "target id")?,
            timestamp: Self::millis_to_timestamp(row.get("timestamp"))?,
            latency: row.get("latency"),
        })
    }

    async fn insert_rows(
        tx: &mut Transaction<'_, Sqlite>,
        rows: &[SampleRow],
    ) -> StorageResult<()> {
        for sample in rows {
            sqlx::query(
                "INSERT INTO ping_raw (node_id, target_id, timestamp, latency) VALUES (?, ?, ?, ?)",
            )
            .bind(&sample.node_id)
            .bind(Self::to_i64(sample.target_id, "target id")?)
            .bind(sample.timestamp.timestamp_millis())
            .bind(sample.latency)
            .execute(&mut **tx)
            .await?;
        }
        Ok(())
    }
}

#[async_trait]
impl StorageBackend for SqliteBackend {
    #[instrument(skip(self))]
    async fn list_targets(&self) -> StorageResult<Vec<Target>> {
        let rows = sqlx::query(
            "SELECT id, name, address, enabled, interval_seconds FROM targets ORDER BY id ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::target_from_row).collect()
    }

    #[instrument(skip(self), fields(name = %new.name))]
    async fn insert_target(&self, new: &NewTarget) -> StorageResult<Target> {
        let interval = Self::to_i64(new.interval_seconds(), "interval")?;

        let mut tx = self.pool.begin().await?;

        let (max_id,): (Option<i64>,) = sqlx::query_as("SELECT MAX(id) FROM targets")
            .fetch_one(&mut *tx)
            .await?;
        let id = max_id.unwrap_or(0) + 1;

        sqlx::query(
            r#"
            INSERT INTO targets (id, name, address, enabled, interval_seconds)
            VALUES (?, ?, ?, 1, ?)
            "#,
        )
        .bind(id)
        .bind(&new.name)
        .bind(&new.address)
        .bind(interval)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        info!("created target {} ({})", id, new.name);

        Ok(Target {
            id: Self::to_u64(id, "target id")?,
            name: new.name.clone(),
            address: new.address.clone(),
            enabled: true,
            interval_seconds: new.interval_seconds(),
        })
    }

    #[instrument(skip(self))]
    async fn disable_target(&self, id: u64) -> StorageResult<bool> {
        let result = sqlx::query("UPDATE targets SET enabled = 0 WHERE id = ?")
            .bind(Self::to_i64(id, "target id")?)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self, rows), fields(count = rows.len()))]
    async fn insert_samples(&self, rows: Vec<SampleRow>) -> StorageResult<()> {
        if rows.is_empty() {
            return Ok(());
        }

        debug!("inserting {} samples into SQLite", rows.len());

        let mut tx = self.pool.begin().await?;

        Self::insert_rows(&mut tx, &rows).await?;

        tx.commit().await?;

        Ok(())
    }

    #[instrument(skip(self), fields(start = %query.start, end = %query.end))]
    async fn query_samples(&self, query: &SampleQuery) -> StorageResult<Vec<SampleRow>> {
        let start = query.start.timestamp_millis();
        let end = query.end.timestamp_millis();
        let through = query.through_sequence.unwrap_or(i64::MAX);

        let rows = match &query.node_id {
            Some(node_id) => {
                sqlx::query(
                    r#"
                    SELECT node_id, target_id, timestamp, latency
                    FROM ping_raw
                    WHERE timestamp >= ? AND timestamp < ? AND seq <= ? AND node_id = ?
                    ORDER BY timestamp ASC
                    "#,
                )
                .bind(start)
                .bind(end)
                .bind(through)
                .bind(node_id)
                .fetch_all(&self.pool)
                .await
            }
            None => {
                sqlx::query(
                    r#"
                    SELECT node_id, target_id, timestamp, latency
                    FROM ping_raw
                    WHERE timestamp >= ? AND timestamp < ? AND seq <= ?
                    ORDER BY timestamp ASC
                    "#,
                )
                .bind(start)
                .bind(end)
                .bind(through)
                .fetch_all(&self.pool)
                .await
            }
        }?;

        let samples = rows
            .iter()
            .map(Self::sample_from_row)
            .collect::<StorageResult<Vec<SampleRow>>>()?;
        debug!("query returned {} samples", samples.len());
        Ok(samples)
    }

    #[instrument(skip(self))]
    async fn latest_sequence(&self) -> StorageResult<i64> {
        let (latest,): (i64,) = sqlx::query_as("SELECT COALESCE(MAX(seq), 0) FROM ping_raw")
            .fetch_one(&self.pool)
            .await?;
        Ok(latest)
    }

    #[instrument(
        skip(self, rows),
        fields(start = %start, end = %end, through = through_sequence, count = rows.len())
    )]
    async fn replace_window(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        through_sequence: i64,
        rows: Vec<SampleRow>,
    ) -> StorageResult<usize> {
        let mut tx = self.pool.begin().await?;

        let deleted = sqlx::query(
            "DELETE FROM ping_raw WHERE timestamp >= ? AND timestamp < ? AND seq <= ?",
        )
        .bind(start.timestamp_millis())
        .bind(end.timestamp_millis())
        .bind(through_sequence)
        .execute(&mut *tx)
        .await?
        .rows_affected() as usize;

        Self::insert_rows(&mut tx, &rows).await?;

        tx.commit().await?;

        Ok(deleted)
    }

    #[instrument(skip(self), fields(before = %before))]
    async fn delete_before(&self, before: DateTime<Utc>) -> StorageResult<usize> {
        let result = sqlx::query("DELETE FROM ping_raw WHERE timestamp < ?")
            .bind(before.timestamp_millis())
            .execute(&self.pool)
            .await?;

        let deleted = result.rows_affected() as usize;
        if deleted > 0 {
            info!("deleted {} expired samples", deleted);
        }

        Ok(deleted)
    }

    #[instrument(skip(self))]
    async fn health_check(&self) -> StorageResult<HealthStatus> {
        match sqlx::query("SELECT 1").fetch_one(&self.pool).await {
            Ok(_) => {
                let mut metadata = HashMap::new();
                metadata.insert("backend".to_string(), "sqlite".to_string());
                metadata.insert("db_path".to_string(), self.db_path.clone());

                Ok(HealthStatus {
                    healthy: true,
                    message: "SQLite backend operational".to_string(),
                    metadata,
                })
            }
            Err(e) => {
                warn!("health check failed: {}", e);
                Ok(HealthStatus {
                    healthy: false,
                    message: format!("health check failed: {}", e),
                    metadata: HashMap::new(),
                })
            }
        }
    }

    #[instrument(skip(self))]
    async fn get_stats(&self) -> StorageResult<BackendStats> {
        let (sample_rows, oldest, newest): (i64, Option<i64>, Option<i64>) =
            sqlx::query_as("SELECT COUNT(*), MIN(timestamp), MAX(timestamp) FROM ping_raw")
                .fetch_one(&self.pool)
                .await?;

        let (target_rows,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM targets")
            .fetch_one(&self.pool)
            .await?;

        Ok(BackendStats {
            sample_rows: Self::to_u64(sample_rows, "row count")?,
            target_rows: Self::to_u64(target_rows, "row count")?,
            oldest_sample: oldest.map(Self::millis_to_timestamp).transpose()?,
            newest_sample: newest.map(Self::millis_to_timestamp).transpose()?,
        })
    }

    async fn close(&self) -> StorageResult<()> {
        info!("closing SQLite backend");
        self.pool.close().await;
        Ok(())
    }
}
