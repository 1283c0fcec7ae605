//! Two-process telemetry pipeline.
//!
//! The agent ([`agent`]) samples host and process statistics and reports
//! them with bounded concurrency. The server ([`server`]) verifies, merges
//! and stores them through [`service::MetricsService`] on top of a
//! pluggable [`repository::Repository`].

pub mod agent;
pub mod config;
pub mod error;
pub mod logging;
pub mod metric;
pub mod repository;
pub mod server;
pub mod service;
pub mod shutdown;

pub mod middleware {
    pub mod timing;
}

pub use error::{MetricsError, Result};
pub use metric::{Metric, MetricKind, Signer};
