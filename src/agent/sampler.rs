use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use sysinfo::{CpuExt, Pid, ProcessExt, System, SystemExt};
use tracing::debug;

/// Latest values of everything the agent can report.
///
/// `poll_count` counts polls since the last report cycle took the samples.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Samples {
    pub poll_count: i64,
    pub random_value: f64,

    // Host memory (bytes)
    pub total_memory: f64,
    pub free_memory: f64,
    pub available_memory: f64,
    pub used_memory: f64,
    pub total_swap: f64,
    pub used_swap: f64,

    // Host load
    pub load_average_1: f64,
    pub uptime_secs: f64,
    /// Per-CPU utilisation in percent
    pub cpu_utilization: Vec<f64>,

    // This process
    pub process_rss: f64,
    pub process_virtual_memory: f64,
    pub process_cpu_usage: f64,
}

impl Samples {
    pub fn cpu(&self, index: usize) -> Option<f64> {
        self.cpu_utilization.get(index).copied()
    }
}

/// Takes a copy for one report cycle and restarts the poll counter,
/// so `PollCount` is sent as a delta.
pub fn take_for_report(samples: &Mutex<Samples>) -> Samples {
    let mut guard = samples.lock();
    let taken = guard.clone();
    guard.poll_count = 0;
    taken
}

/// Reads host and process statistics through `sysinfo`.
pub struct Sampler {
    system: System,
    pid: Option<Pid>,
    rng: StdRng,
}

impl Sampler {
    pub fn new() -> Self {
        Self {
            system: System::new(),
            pid: sysinfo::get_current_pid().ok(),
            rng: StdRng::from_entropy(),
        }
    }

    /// Refreshes every sample in place and bumps the poll counter.
    pub fn collect(&mut self, samples: &mut Samples) {
        let sys = &mut self.system;
        sys.refresh_memory();
        sys.refresh_cpu();

        samples.total_memory = sys.total_memory() as f64;
        samples.free_memory = sys.free_memory() as f64;
        samples.available_memory = sys.available_memory() as f64;
        samples.used_memory = sys.used_memory() as f64;
        samples.total_swap = sys.total_swap() as f64;
        samples.used_swap = sys.used_swap() as f64;

        samples.load_average_1 = sys.load_average().one;
        samples.uptime_secs = sys.uptime() as f64;
        samples.cpu_utilization = sys.cpus().iter().map(|c| c.cpu_usage() as f64).collect();

        if let Some(pid) = self.pid {
            if sys.refresh_process(pid) {
                if let Some(process) = sys.process(pid) {
                    samples.process_rss = process.memory() as f64;
                    samples.process_virtual_memory = process.virtual_memory() as f64;
                    samples.process_cpu_usage = process.cpu_usage() as f64;
                }
            }
        }

        samples.random_value = self.rng.gen::<f64>();
        samples.poll_count += 1;

        debug!("Collected samples (poll #{})", samples.poll_count);
    }
}

impl Default for Sampler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collect_increments_poll_count() {
        let mut sampler = Sampler::new();
        let mut samples = Samples {
            poll_count: 100,
            ..Default::default()
        };

        sampler.collect(&mut samples);
        assert_eq!(samples.poll_count, 101);
        assert!((0.0..1.0).contains(&samples.random_value));
        assert!(samples.total_memory > 0.0);
    }

    #[test]
    fn test_take_for_report_resets_poll_count() {
        let shared = Mutex::new(Samples {
            poll_count: 5,
            random_value: 0.5,
            ..Default::default()
        });

        let taken = take_for_report(&shared);
        assert_eq!(taken.poll_count, 5);

        let after = shared.lock();
        assert_eq!(after.poll_count, 0);
        assert_eq!(after.random_value, 0.5);
    }
}
