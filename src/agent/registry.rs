use std::collections::HashMap;

use super::sampler::Samples;
use crate::metric::Metric;

/// A typed value read from `Samples`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Reading {
    Gauge(f64),
    Counter(i64),
}

impl Reading {
    pub fn into_metric(self, id: &str) -> Metric {
        match self {
            Self::Gauge(v) => Metric::gauge(id, v),
            Self::Counter(d) => Metric::counter(id, d),
        }
    }
}

/// `None` when the sample does not exist on this host (e.g. a missing CPU).
pub type Accessor = fn(&Samples) -> Option<Reading>;

/// Closed, statically declared mapping from metric name to accessor.
pub struct Registry {
    order: Vec<&'static str>,
    accessors: HashMap<&'static str, Accessor>,
}

impl Registry {
    pub fn new() -> Self {
        let mut r = Self {
            order: Vec::new(),
            accessors: HashMap::new(),
        };

        r.register("PollCount", |s| Some(Reading::Counter(s.poll_count)));
        r.register("RandomValue", |s| Some(Reading::Gauge(s.random_value)));

        r.register("TotalMemory", |s| Some(Reading::Gauge(s.total_memory)));
        r.register("FreeMemory", |s| Some(Reading::Gauge(s.free_memory)));
        r.register("AvailableMemory", |s| Some(Reading::Gauge(s.available_memory)));
        r.register("UsedMemory", |s| Some(Reading::Gauge(s.used_memory)));
        r.register("TotalSwap", |s| Some(Reading::Gauge(s.total_swap)));
        r.register("UsedSwap", |s| Some(Reading::Gauge(s.used_swap)));

        r.register("LoadAverage1", |s| Some(Reading::Gauge(s.load_average_1)));
        r.register("Uptime", |s| Some(Reading::Gauge(s.uptime_secs)));
        r.register("CPUutilization1", |s| s.cpu(0).map(Reading::Gauge));
        r.register("CPUutilization2", |s| s.cpu(1).map(Reading::Gauge));
        r.register("CPUutilization3", |s| s.cpu(2).map(Reading::Gauge));
        r.register("CPUutilization4", |s| s.cpu(3).map(Reading::Gauge));

        r.register("ProcessRss", |s| Some(Reading::Gauge(s.process_rss)));
        r.register("ProcessVirtualMemory", |s| Some(Reading::Gauge(s.process_virtual_memory)));
        r.register("ProcessCpuUsage", |s| Some(Reading::Gauge(s.process_cpu_usage)));

        r
    }

    fn register(&mut self, name: &'static str, accessor: Accessor) {
        self.order.push(name);
        self.accessors.insert(name, accessor);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.accessors.contains_key(name)
    }

    pub fn names(&self) -> &[&'static str] {
        &self.order
    }

    /// `None` for an unregistered name or a sample this host lacks.
    pub fn resolve(&self, name: &str, samples: &Samples) -> Option<Reading> {
        self.accessors.get(name).and_then(|read| read(samples))
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

/// Every registered name, in registration order.
pub fn default_names() -> Vec<String> {
    Registry::new().names().iter().map(|n| n.to_string()).collect()
}
