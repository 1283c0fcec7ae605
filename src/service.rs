//! Update semantics and persistence policy on top of a [`Repository`].
//!
//! Counters accumulate, gauges overwrite. With a signing key every incoming
//! record is verified before anything is written. Flushes requested by the
//! periodic ticker or by callers go through a one-slot channel drained by a
//! single worker task, so at most one `flush_all` runs at any time.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info, instrument, warn};

use crate::error::{MetricsError, Result};
use crate::metric::{Metric, MetricKind, Signer};
use crate::repository::Repository;

/// When the service asks the repository to persist its snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Persistence {
    /// `flush_all` after every successful store.
    Synchronous,
    /// A background ticker requests one flush per interval.
    Periodic(Duration),
    /// The repository is durable per write (relational) or not at all (memory).
    Unconfigured,
}

pub struct MetricsService {
    repo: Arc<dyn Repository>,
    signer: Option<Signer>,
    persistence: Persistence,

    // Serialises read-modify-write of counters
    update_lock: tokio::sync::Mutex<()>,

    // Single-slot flush signal; `None` once shut down
    flush_tx: Mutex<Option<mpsc::Sender<()>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    ticker: Mutex<Option<JoinHandle<()>>>,
}

impl MetricsService {
    /// Must be called inside a Tokio runtime: the flush worker (and the ticker,
    /// in periodic mode) are spawned here.
    pub fn new(repo: Arc<dyn Repository>, signer: Option<Signer>, persistence: Persistence) -> Self {
        let (flush_tx, flush_rx) = mpsc::channel::<()>(1);

        let worker = tokio::spawn(flush_worker(repo.clone(), flush_rx));

        let ticker = match persistence {
            Persistence::Periodic(period) => Some(tokio::spawn(flush_ticker(period, flush_tx.clone()))),
            _ => None,
        };

        info!(
            "Metrics service started (persistence: {:?}, signing: {})",
            persistence,
            if signer.is_some() { "on" } else { "off" }
        );

        Self {
            repo,
            signer,
            persistence,
            update_lock: tokio::sync::Mutex::new(()),
            flush_tx: Mutex::new(Some(flush_tx)),
            worker: Mutex::new(Some(worker)),
            ticker: Mutex::new(ticker),
        }
    }

    pub fn persistence(&self) -> Persistence {
        self.persistence
    }

    /// Applies one update and returns the record as stored.
    ///
    /// Signature mismatch and unknown kinds are rejected before the repository
    /// is touched.
    #[instrument(skip(self, metric), fields(metric_id = %metric.id, kind = %metric.kind))]
    pub async fn store_metric(&self, mut metric: Metric) -> Result<Metric> {
        if let Some(signer) = &self.signer {
            if !signer.verify(&metric) {
                warn!("Rejecting metric with bad signature");
                return Err(MetricsError::InvalidSignature { id: metric.id });
            }
        }

        if let MetricKind::Other(kind) = &metric.kind {
            return Err(MetricsError::NotImplemented { kind: kind.clone() });
        }
        metric.check_payload()?;

        {
            let _guard = self.update_lock.lock().await;

            if metric.kind == MetricKind::Counter {
                let previous = match self.repo.get_metric(&metric.id).await {
                    Ok(existing) => existing.delta.unwrap_or(0),
                    Err(MetricsError::NotFound { .. }) => 0,
                    Err(e) => {
                        error!("Reading previous counter value failed: {e}");
                        return Err(e);
                    }
                };
                metric.delta = Some(previous.wrapping_add(metric.delta.unwrap_or(0)));

                // The accumulated value needs its own signature
                if let Some(signer) = &self.signer {
                    signer.sign(&mut metric);
                }
            }

            self.repo.store_metric(metric.clone()).await.map_err(|e| {
                error!("Storing metric failed: {e}");
                e
            })?;
        }

        if self.persistence == Persistence::Synchronous {
            self.repo.flush_all().await.map_err(|e| {
                error!("Synchronous flush failed: {e}");
                e
            })?;
        }

        debug!("Stored");
        Ok(metric)
    }

    /// Current stored record for `query.id`; the kind of the query is not consulted.
    pub async fn get_metrics(&self, query: &Metric) -> Result<Metric> {
        self.repo.get_metric(&query.id).await
    }

    pub async fn list_metric_names(&self) -> Result<Vec<String>> {
        self.repo.list_metric_names().await
    }

    pub async fn ping_repo(&self) -> Result<()> {
        self.repo.ping().await
    }

    /// Queues a flush. Waits while the slot is full, which applies
    /// backpressure to the caller instead of dropping the request.
    pub async fn request_flush(&self) -> Result<()> {
        let tx = self.flush_tx.lock().clone();
        match tx {
            Some(tx) => tx
                .send(())
                .await
                .map_err(|_| MetricsError::Storage("flush worker has stopped".into())),
            None => Err(MetricsError::Storage("metrics service is shut down".into())),
        }
    }

    /// Queues a flush if the slot is free. Returns `false` when one is already queued.
    pub fn try_request_flush(&self) -> bool {
        match self.flush_tx.lock().as_ref() {
            Some(tx) => tx.try_send(()).is_ok(),
            None => false,
        }
    }

    /// Stops the ticker, lets the worker finish any queued flush, then
    /// flushes the final snapshot once more.
    pub async fn shutdown(&self) -> Result<()> {
        let ticker = self.ticker.lock().take();
        if let Some(ticker) = ticker {
            ticker.abort();
            let _ = ticker.await;
        }

        // Dropping the last sender ends the worker loop after it drains
        drop(self.flush_tx.lock().take());

        let worker = self.worker.lock().take();
        if let Some(worker) = worker {
            let _ = worker.await;
        }

        self.repo.flush_all().await?;
        info!("Final snapshot flushed");
        Ok(())
    }
}

impl Drop for MetricsService {
    fn drop(&mut self) {
        if let Some(t) = self.ticker.get_mut().take() {
            t.abort();
        }
        if let Some(w) = self.worker.get_mut().take() {
            w.abort();
        }
    }
}

// ─── Background tasks ────────────────────────────────────────────

async fn flush_worker(repo: Arc<dyn Repository>, mut rx: mpsc::Receiver<()>) {
    while rx.recv().await.is_some() {
        match repo.flush_all().await {
            Ok(()) => debug!("Snapshot flushed"),
            Err(e) => error!("Flushing snapshot failed: {e}"),
        }
    }
    debug!("Flush worker stopped");
}

async fn flush_ticker(period: Duration, tx: mpsc::Sender<()>) {
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        // Blocks while a flush is already queued
        if tx.send(()).await.is_err() {
            break;
        }
    }
}
