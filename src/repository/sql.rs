use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use tracing::{debug, info, instrument};

use super::Repository;
use crate::error::{MetricsError, Result};
use crate::metric::{Metric, MetricKind};

/// One row per metric, keyed by name. Every store is durable on its own,
/// so `flush_all` and `restore` have nothing to do.
#[derive(Clone)]
pub struct SqlRepository {
    pool: SqlitePool,
}

impl SqlRepository {
    /// Opens (creating if needed) the database behind `dsn` and bootstraps the table.
    #[instrument(skip(dsn))]
    pub async fn connect(dsn: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(dsn)
            .map_err(|e| MetricsError::Configuration(format!("invalid database DSN: {e}")))?
            .create_if_missing(true);

        // Every connection to `:memory:` opens its own database, so pin one.
        let pool_options = if dsn.contains(":memory:") || dsn.contains("mode=memory") {
            SqlitePoolOptions::new()
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(Option::<Duration>::None)
                .max_lifetime(Option::<Duration>::None)
        } else {
            SqlitePoolOptions::new().max_connections(5)
        };

        let pool = pool_options
            .connect_with(options)
            .await
            .map_err(|e| MetricsError::storage("connecting to database", e))?;

        let repo = Self { pool };
        repo.bootstrap().await?;
        info!("Relational metric store ready");
        Ok(repo)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn bootstrap(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS metrics (
                name  TEXT PRIMARY KEY,
                mtype TEXT NOT NULL,
                delta INTEGER,
                value REAL,
                hash  TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| MetricsError::storage("creating metrics table", e))?;
        Ok(())
    }

    async fn update(&self, metric: &Metric) -> Result<()> {
        sqlx::query("UPDATE metrics SET mtype = ?, delta = ?, value = ?, hash = ? WHERE name = ?")
            .bind(metric.kind.as_str())
            .bind(metric.delta)
            .bind(metric.value)
            .bind(&metric.hash)
            .bind(&metric.id)
            .execute(&self.pool)
            .await
            .map_err(|e| MetricsError::storage("updating metric", e))?;
        Ok(())
    }
}

fn row_to_metric(row: SqliteRow) -> Result<Metric> {
    let kind: String = row.try_get("mtype")?;
    Ok(Metric {
        id: row.try_get("name")?,
        kind: MetricKind::from(kind),
        delta: row.try_get("delta")?,
        value: row.try_get("value")?,
        hash: row.try_get("hash")?,
    })
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db) => db.is_unique_violation(),
        _ => false,
    }
}

#[async_trait]
impl Repository for SqlRepository {
    /// INSERT first; a duplicate-key failure (row exists, or a concurrent
    /// insert won the race) falls back to UPDATE.
    #[instrument(skip(self, metric), fields(metric_id = %metric.id))]
    async fn store_metric(&self, metric: Metric) -> Result<()> {
        let inserted = sqlx::query("INSERT INTO metrics (name, mtype, delta, value, hash) VALUES (?, ?, ?, ?, ?)")
            .bind(&metric.id)
            .bind(metric.kind.as_str())
            .bind(metric.delta)
            .bind(metric.value)
            .bind(&metric.hash)
            .execute(&self.pool)
            .await;

        match inserted {
            Ok(_) => Ok(()),
            Err(e) if is_unique_violation(&e) => {
                debug!("Row exists, updating");
                self.update(&metric).await
            }
            Err(e) => Err(MetricsError::storage("inserting metric", e)),
        }
    }

    #[instrument(skip(self))]
    async fn get_metric(&self, id: &str) -> Result<Metric> {
        let row = sqlx::query("SELECT name, mtype, delta, value, hash FROM metrics WHERE name = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| MetricsError::storage("selecting metric", e))?;

        match row {
            Some(row) => row_to_metric(row),
            None => Err(MetricsError::not_found(id)),
        }
    }

    async fn list_metric_names(&self) -> Result<Vec<String>> {
        let names = sqlx::query_scalar::<_, String>("SELECT name FROM metrics")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| MetricsError::storage("listing metric names", e))?;
        Ok(names)
    }

    async fn flush_all(&self) -> Result<()> {
        Ok(())
    }

    async fn restore(&self) -> Result<()> {
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| MetricsError::storage("pinging database", e))?;
        Ok(())
    }
}
