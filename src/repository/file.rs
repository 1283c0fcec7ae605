use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::{debug, instrument, warn};

use super::memory::{MemoryRepository, Snapshot};
use super::Repository;
use crate::error::{MetricsError, Result};
use crate::metric::Metric;

/// Memory map plus a snapshot file holding one JSON object and a newline.
///
/// `flush_all` truncates and rewrites the file in place (no temp-file
/// rename), so a crash mid-write can leave a torn line behind. `restore`
/// ignores a line that has no terminating newline for that reason.
pub struct FileRepository {
    memory: MemoryRepository,
    path: PathBuf,
    // Serialises writers; synchronous persistence flushes from many requests at once.
    write_lock: tokio::sync::Mutex<()>,
}

impl FileRepository {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            memory: MemoryRepository::new(),
            path: path.into(),
            write_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Decodes and validates the first newline-terminated line of a snapshot file.
fn decode_snapshot(contents: &[u8]) -> Result<Option<Snapshot>> {
    let Some(end) = contents.iter().position(|b| *b == b'\n') else {
        return Ok(None);
    };
    let line = &contents[..end];
    if line.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }
    let snapshot: Snapshot = serde_json::from_slice(line)
        .map_err(|e| MetricsError::storage("decoding snapshot", e))?;

    for (key, metric) in &snapshot {
        if *key != metric.id {
            return Err(MetricsError::Storage(format!(
                "snapshot entry {key:?} holds metric {:?}",
                metric.id
            )));
        }
        metric
            .check_payload()
            .map_err(|e| MetricsError::storage("validating snapshot", e))?;
    }
    Ok(Some(snapshot))
}

#[async_trait]
impl Repository for FileRepository {
    async fn store_metric(&self, metric: Metric) -> Result<()> {
        self.memory.store_metric(metric).await
    }

    async fn get_metric(&self, id: &str) -> Result<Metric> {
        self.memory.get_metric(id).await
    }

    async fn list_metric_names(&self) -> Result<Vec<String>> {
        self.memory.list_metric_names().await
    }

    #[instrument(skip(self), fields(path = %self.path.display()))]
    async fn flush_all(&self) -> Result<()> {
        let _guard = self.write_lock.lock().await;

        let snapshot = self.memory.snapshot();
        let mut line = serde_json::to_vec(&snapshot)
            .map_err(|e| MetricsError::storage("encoding snapshot", e))?;
        line.push(b'\n');

        tokio::fs::write(&self.path, &line)
            .await
            .map_err(|e| MetricsError::storage("writing snapshot", e))?;

        debug!("Flushed {} metrics ({} bytes)", snapshot.len(), line.len());
        Ok(())
    }

    #[instrument(skip(self), fields(path = %self.path.display()))]
    async fn restore(&self) -> Result<()> {
        let contents = match tokio::fs::read(&self.path).await {
            Ok(c) => c,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("No snapshot file yet, starting empty");
                Vec::new()
            }
            Err(e) => return Err(MetricsError::storage("reading snapshot", e)),
        };

        let snapshot = match decode_snapshot(&contents)? {
            Some(s) => s,
            None => {
                if !contents.is_empty() {
                    warn!("Snapshot file has no complete line, ignoring it");
                }
                Snapshot::new()
            }
        };

        self.memory.replace(snapshot);
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}
