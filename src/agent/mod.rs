//! Telemetry agent: polls local samples on one interval and reports them on
//! another, with at most `rate_limit` sends in flight per report cycle.

pub mod dispatcher;
pub mod registry;
pub mod sampler;
pub mod stats;
pub mod transport;

use std::future::Future;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::time::{interval, interval_at, Instant, MissedTickBehavior};
use tracing::{info, warn};

pub use dispatcher::Dispatcher;
pub use registry::{Reading, Registry};
pub use sampler::{Sampler, Samples};
pub use stats::{CycleReport, PercentileSet};
pub use transport::{HttpTransport, Transport};

use crate::config::AgentConfig;
use crate::error::Result;
use crate::shutdown::shutdown_signal;

/// Runs until SIGINT or SIGTERM.
pub async fn run(config: AgentConfig) -> Result<()> {
    run_until(config, shutdown_signal()).await
}

/// Runs the poll and report loops until `shutdown` resolves.
///
/// Sends still in flight at that point are abandoned.
pub async fn run_until(config: AgentConfig, shutdown: impl Future<Output = ()>) -> Result<()> {
    config.validate()?;

    let base_url = config.base_url();
    let transport: Arc<dyn Transport> = Arc::new(HttpTransport::new(base_url.clone(), config.signer())?);
    let dispatcher = Dispatcher::new(transport, config.metric_names(), config.rate_limit)?;

    info!(
        "Agent reporting to {base_url} (poll {:?}, report {:?}, limit {}, batch {})",
        config.poll_interval,
        config.report_interval,
        dispatcher.limit(),
        config.batch
    );

    let samples = Arc::new(Mutex::new(Samples::default()));

    // ── Poll loop ───────────────────────────────────────────────
    let poll_samples = samples.clone();
    let poll_interval = config.poll_interval;
    let poller = tokio::spawn(async move {
        let mut sampler = Sampler::new();
        let mut ticker = interval(poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            // Collect into a copy so the lock is not held across sysinfo refreshes
            let mut next = poll_samples.lock().clone();
            sampler.collect(&mut next);
            let mut shared = poll_samples.lock();
            // Polls counted while collecting are kept, then this poll is added
            next.poll_count = shared.poll_count + 1;
            *shared = next;
        }
    });

    // ── Report loop ─────────────────────────────────────────────
    let report_samples = samples.clone();
    let report_interval = config.report_interval;
    let batch = config.batch;
    let reporter = tokio::spawn(async move {
        let mut ticker = interval_at(Instant::now() + report_interval, report_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut cycle: u64 = 0;
        loop {
            ticker.tick().await;
            cycle += 1;

            let snapshot = sampler::take_for_report(&report_samples);
            let report = if batch {
                dispatcher.dispatch_batch(&snapshot).await
            } else {
                dispatcher.dispatch(&snapshot).await
            };

            if report.failed > 0 {
                warn!(
                    cycle,
                    sent = report.sent,
                    failed = report.failed,
                    skipped = report.skipped,
                    "Report cycle finished with failures"
                );
            } else {
                info!(
                    cycle,
                    sent = report.sent,
                    skipped = report.skipped,
                    elapsed_ms = report.elapsed_ms,
                    p50_us = report.latency.p50,
                    p99_us = report.latency.p99,
                    "Report cycle finished"
                );
            }
        }
    });

    shutdown.await;

    warn!("Shutting down agent; in-flight sends are abandoned");
    poller.abort();
    reporter.abort();
    let _ = poller.await;
    let _ = reporter.await;

    info!("Agent stopped");
    Ok(())
}
