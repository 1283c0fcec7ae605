//! Durable keyed store of the latest `Metric` per id.
//!
//! Three interchangeable backends implement [`Repository`]:
//! - [`MemoryRepository`]: a mutex-guarded map, nothing survives a restart
//! - [`FileRepository`]: the memory map plus a one-line JSON snapshot file
//! - [`SqlRepository`]: one SQLite row per metric, durable on every write
//!
//! The repository performs a raw upsert. Counter accumulation and signature
//! checks live one layer up in [`crate::service::MetricsService`].

pub mod file;
pub mod memory;
pub mod sql;

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use crate::error::Result;
use crate::metric::Metric;

pub use file::FileRepository;
pub use memory::MemoryRepository;
pub use sql::SqlRepository;

/// Storage contract shared by every backend.
///
/// Dropping a returned future cancels the operation; for SQL that aborts the
/// query, for the in-memory map the mutation is already complete.
#[async_trait]
pub trait Repository: Send + Sync {
    /// Insert-if-absent, replace-if-present.
    async fn store_metric(&self, metric: Metric) -> Result<()>;

    /// Fails with `NotFound` for an unknown id.
    async fn get_metric(&self, id: &str) -> Result<Metric>;

    /// All known ids, in no particular order.
    async fn list_metric_names(&self) -> Result<Vec<String>>;

    /// Forces the current snapshot to durable media.
    async fn flush_all(&self) -> Result<()>;

    /// Replaces the in-memory contents with the last flushed snapshot.
    async fn restore(&self) -> Result<()>;

    /// Liveness probe.
    async fn ping(&self) -> Result<()>;
}

/// Values the backend factory needs; loading them is the config layer's job.
#[derive(Debug, Clone, Default)]
pub struct StorageSettings {
    /// Presence selects the relational backend.
    pub database_dsn: Option<String>,
    /// Presence (without a DSN) selects the file-snapshot backend.
    pub store_file: Option<PathBuf>,
    /// Load the snapshot file on start.
    pub restore: bool,
}

/// Which backend a set of settings resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Memory,
    File,
    Sql,
}

impl StorageSettings {
    pub fn backend(&self) -> Backend {
        if self.database_dsn.is_some() {
            Backend::Sql
        } else if self.store_file.is_some() {
            Backend::File
        } else {
            Backend::Memory
        }
    }
}

/// Builds the backend selected by `settings`, restoring the snapshot when asked to.
pub async fn open(settings: &StorageSettings) -> Result<Arc<dyn Repository>> {
    let repo: Arc<dyn Repository> = match (&settings.database_dsn, &settings.store_file) {
        (Some(dsn), _) => Arc::new(SqlRepository::connect(dsn).await?),
        (None, Some(path)) => Arc::new(FileRepository::new(path.clone())),
        (None, None) => Arc::new(MemoryRepository::new()),
    };

    if settings.restore && settings.backend() == Backend::File {
        repo.restore().await?;
        info!(
            "Restored {} metrics from snapshot",
            repo.list_metric_names().await?.len()
        );
    }

    Ok(repo)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_selection() {
        let mut s = StorageSettings::default();
        assert_eq!(s.backend(), Backend::Memory);

        s.store_file = Some("/tmp/metrics.json".into());
        assert_eq!(s.backend(), Backend::File);

        s.database_dsn = Some("sqlite::memory:".into());
        assert_eq!(s.backend(), Backend::Sql);
    }

    #[tokio::test]
    async fn test_open_restores_file_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metrics.json");

        let first = FileRepository::new(path.clone());
        first.store_metric(Metric::gauge("Alloc", 12.5)).await.unwrap();
        first.flush_all().await.unwrap();

        let settings = StorageSettings {
            database_dsn: None,
            store_file: Some(path),
            restore: true,
        };
        let repo = open(&settings).await.unwrap();
        assert_eq!(repo.get_metric("Alloc").await.unwrap().value, Some(12.5));
    }

    #[tokio::test]
    async fn test_open_without_restore_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metrics.json");

        let first = FileRepository::new(path.clone());
        first.store_metric(Metric::counter("PollCount", 3)).await.unwrap();
        first.flush_all().await.unwrap();

        let settings = StorageSettings {
            database_dsn: None,
            store_file: Some(path),
            restore: false,
        };
        let repo = open(&settings).await.unwrap();
        assert!(repo.list_metric_names().await.unwrap().is_empty());
    }
}
