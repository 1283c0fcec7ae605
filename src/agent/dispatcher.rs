use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::{mpsc, Mutex};
use tracing::{debug, error, warn};

use super::registry::Registry;
use super::sampler::Samples;
use super::stats::{CycleReport, LatencyRecorder};
use super::transport::Transport;
use crate::error::{MetricsError, Result};
use crate::metric::Metric;

type JobQueue = Arc<Mutex<mpsc::Receiver<Metric>>>;

/// Turns one set of samples into at most `limit` concurrent sends.
pub struct Dispatcher {
    transport: Arc<dyn Transport>,
    registry: Registry,
    names: Vec<String>,
    limit: usize,
}

impl Dispatcher {
    /// A limit below 1 is a configuration error.
    pub fn new(transport: Arc<dyn Transport>, names: Vec<String>, limit: i64) -> Result<Self> {
        if limit < 1 {
            return Err(MetricsError::Configuration(format!(
                "send concurrency limit must be at least 1, got {limit}"
            )));
        }

        let registry = Registry::new();
        for name in names.iter().filter(|n| !registry.contains(n)) {
            warn!("Metric {name} is not registered and will be skipped");
        }

        Ok(Self {
            transport,
            registry,
            names,
            limit: limit as usize,
        })
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Resolves every tracked name; unresolved names are logged and counted.
    pub fn build_jobs(&self, samples: &Samples) -> (Vec<Metric>, usize) {
        let mut jobs = Vec::with_capacity(self.names.len());
        let mut skipped = 0;

        for name in &self.names {
            match self.registry.resolve(name, samples) {
                Some(reading) => jobs.push(reading.into_metric(name)),
                None => {
                    debug!("Skipping {name}: no value");
                    skipped += 1;
                }
            }
        }

        (jobs, skipped)
    }

    /// Sends every resolved metric once, with `limit` workers pulling from
    /// one queue. Returns after every job has been attempted.
    pub async fn dispatch(&self, samples: &Samples) -> CycleReport {
        let started = Instant::now();
        let (jobs, skipped) = self.build_jobs(samples);

        let (tx, rx) = mpsc::channel::<Metric>(jobs.len().max(1));
        let queue: JobQueue = Arc::new(Mutex::new(rx));
        let sent = Arc::new(AtomicUsize::new(0));
        let failed = Arc::new(AtomicUsize::new(0));
        let latency = Arc::new(LatencyRecorder::new());

        let mut handles = Vec::with_capacity(self.limit);
        for worker_id in 0..self.limit {
            handles.push(tokio::spawn(worker(
                worker_id,
                self.transport.clone(),
                queue.clone(),
                sent.clone(),
                failed.clone(),
                latency.clone(),
            )));
        }

        for job in jobs {
            // Capacity covers every job, so this only fails if all workers died
            if tx.send(job).await.is_err() {
                error!("Job queue closed early");
                break;
            }
        }
        drop(tx);

        for h in handles {
            if let Err(e) = h.await {
                error!("Send worker panicked: {e}");
            }
        }

        CycleReport {
            sent: sent.load(Ordering::SeqCst),
            failed: failed.load(Ordering::SeqCst),
            skipped,
            elapsed_ms: started.elapsed().as_millis() as u64,
            latency: latency.percentiles(),
        }
    }

    /// Sends every resolved metric in a single batch request.
    pub async fn dispatch_batch(&self, samples: &Samples) -> CycleReport {
        let started = Instant::now();
        let (jobs, skipped) = self.build_jobs(samples);
        let count = jobs.len();
        let latency = LatencyRecorder::new();

        let t0 = Instant::now();
        let (sent, failed) = match self.transport.send_batch(jobs).await {
            Ok(()) => {
                latency.record(t0.elapsed());
                (count, 0)
            }
            Err(e) => {
                error!("Batch send failed: {e}");
                (0, count)
            }
        };

        CycleReport {
            sent,
            failed,
            skipped,
            elapsed_ms: started.elapsed().as_millis() as u64,
            latency: latency.percentiles(),
        }
    }
}

// ─── Worker loop ─────────────────────────────────────────────────

async fn worker(
    id: usize,
    transport: Arc<dyn Transport>,
    queue: JobQueue,
    sent: Arc<AtomicUsize>,
    failed: Arc<AtomicUsize>,
    latency: Arc<LatencyRecorder>,
) {
    loop {
        // The lock is released before the send starts
        let job = queue.lock().await.recv().await;
        let Some(metric) = job else { break };

        let metric_id = metric.id.clone();
        let t0 = Instant::now();
        match transport.send(metric).await {
            Ok(()) => {
                latency.record(t0.elapsed());
                sent.fetch_add(1, Ordering::SeqCst);
            }
            Err(e) => {
                error!(worker = id, %metric_id, "Sending metric failed: {e}");
                failed.fetch_add(1, Ordering::SeqCst);
            }
        }
    }
}
