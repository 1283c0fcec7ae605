use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::Repository;
use crate::error::{MetricsError, Result};
use crate::metric::Metric;

/// Entire keyed collection of metrics at one instant.
pub type Snapshot = HashMap<String, Metric>;

/// Mutex-guarded map of the latest metric per id.
///
/// One coarse lock serialises every read and write.
#[derive(Default)]
pub struct MemoryRepository {
    inner: Mutex<Snapshot>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of the current contents, taken under the lock.
    pub fn snapshot(&self) -> Snapshot {
        self.inner.lock().clone()
    }

    /// Swaps in a whole snapshot.
    pub fn replace(&self, snapshot: Snapshot) {
        *self.inner.lock() = snapshot;
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl Repository for MemoryRepository {
    async fn store_metric(&self, metric: Metric) -> Result<()> {
        self.inner.lock().insert(metric.id.clone(), metric);
        Ok(())
    }

    async fn get_metric(&self, id: &str) -> Result<Metric> {
        self.inner
            .lock()
            .get(id)
            .cloned()
            .ok_or_else(|| MetricsError::not_found(id))
    }

    async fn list_metric_names(&self) -> Result<Vec<String>> {
        Ok(self.inner.lock().keys().cloned().collect())
    }

    async fn flush_all(&self) -> Result<()> {
        Ok(())
    }

    async fn restore(&self) -> Result<()> {
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}
