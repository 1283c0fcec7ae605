//! Command-line / environment configuration for both binaries.
//!
//! Every flag can also come from the environment variable named next to it;
//! the flag wins when both are given.

use std::path::PathBuf;
use std::time::Duration;

use clap::{ArgAction, Parser};

use crate::agent::registry;
use crate::error::{MetricsError, Result};
use crate::metric::Signer;
use crate::repository::{Backend, StorageSettings};
use crate::service::Persistence;

// ─── Server ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Parser)]
#[command(name = "metrics-server", about = "Accepts, accumulates and persists metrics")]
pub struct ServerConfig {
    /// Listen address
    #[arg(short = 'a', long, env = "ADDRESS", default_value = "127.0.0.1:8080")]
    pub address: String,

    /// Snapshot interval; 0 flushes after every update
    #[arg(short = 'i', long, env = "STORE_INTERVAL", default_value = "300s", value_parser = parse_duration)]
    pub store_interval: Duration,

    /// Snapshot file; empty keeps metrics in memory only
    #[arg(short = 'f', long, env = "STORE_FILE", default_value = "/tmp/devops-metrics-db.json")]
    pub store_file: String,

    /// Load the snapshot file on start
    #[arg(short = 'r', long, env = "RESTORE", default_value_t = true, action = ArgAction::Set)]
    pub restore: bool,

    /// Shared HMAC key; empty disables signature checks
    #[arg(short = 'k', long, env = "KEY", default_value = "")]
    pub key: String,

    /// SQLite connection string; selects the relational backend
    #[arg(short = 'd', long, env = "DATABASE_DSN")]
    pub database_dsn: Option<String>,

    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

impl ServerConfig {
    pub fn storage_settings(&self) -> StorageSettings {
        StorageSettings {
            database_dsn: self.database_dsn.clone().filter(|dsn| !dsn.is_empty()),
            store_file: Some(self.store_file.as_str())
                .filter(|path| !path.is_empty())
                .map(PathBuf::from),
            restore: self.restore,
        }
    }

    /// Only the file backend needs scheduled flushes.
    pub fn persistence(&self) -> Persistence {
        match self.storage_settings().backend() {
            Backend::Sql | Backend::Memory => Persistence::Unconfigured,
            Backend::File if self.store_interval.is_zero() => Persistence::Synchronous,
            Backend::File => Persistence::Periodic(self.store_interval),
        }
    }

    pub fn signer(&self) -> Option<Signer> {
        Signer::new(&self.key)
    }
}

// ─── Agent ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Parser)]
#[command(name = "metrics-agent", about = "Samples process metrics and reports them to the server")]
pub struct AgentConfig {
    /// Server address (host:port)
    #[arg(short = 'a', long, env = "ADDRESS", default_value = "127.0.0.1:8080")]
    pub address: String,

    #[arg(short = 'p', long, env = "POLL_INTERVAL", default_value = "2s", value_parser = parse_duration)]
    pub poll_interval: Duration,

    #[arg(short = 'r', long, env = "REPORT_INTERVAL", default_value = "10s", value_parser = parse_duration)]
    pub report_interval: Duration,

    /// Maximum concurrent sends per report cycle (at least 1)
    #[arg(short = 'l', long, env = "RATE_LIMIT", default_value_t = 1, allow_negative_numbers = true)]
    pub rate_limit: i64,

    /// Shared HMAC key; empty disables signing
    #[arg(short = 'k', long, env = "KEY", default_value = "")]
    pub key: String,

    /// Metric names to report; defaults to every registered metric
    #[arg(short = 'm', long = "metric", env = "METRICS_NAMES", value_delimiter = ',')]
    pub metrics: Vec<String>,

    /// Send one batch request per cycle instead of one request per metric
    #[arg(long, env = "BATCH")]
    pub batch: bool,

    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

impl AgentConfig {
    /// Rejects settings the agent cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.rate_limit < 1 {
            return Err(MetricsError::Configuration(format!(
                "rate limit must be at least 1, got {}",
                self.rate_limit
            )));
        }
        if self.poll_interval.is_zero() || self.report_interval.is_zero() {
            return Err(MetricsError::Configuration(
                "poll and report intervals must be positive".into(),
            ));
        }
        Ok(())
    }

    pub fn metric_names(&self) -> Vec<String> {
        if self.metrics.is_empty() {
            registry::default_names()
        } else {
            self.metrics.clone()
        }
    }

    pub fn signer(&self) -> Option<Signer> {
        Signer::new(&self.key)
    }

    pub fn base_url(&self) -> String {
        if self.address.starts_with("http://") || self.address.starts_with("https://") {
            self.address.trim_end_matches('/').to_string()
        } else {
            format!("http://{}", self.address.trim_end_matches('/'))
        }
    }
}

// ─── Helpers ─────────────────────────────────────────────────────

/// Parses `500ms`, `10s`, `5m`, `1h`, or a bare number of seconds.
pub fn parse_duration(s: &str) -> std::result::Result<Duration, String> {
    let s = s.trim();
    let split = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
    let (digits, unit) = s.split_at(split);

    let n: u64 = digits
        .parse()
        .map_err(|_| format!("invalid duration {s:?}"))?;

    let secs_per_unit = match unit {
        "ms" => return Ok(Duration::from_millis(n)),
        "" | "s" => 1,
        "m" => 60,
        "h" => 3600,
        _ => return Err(format!("unknown duration unit {unit:?} in {s:?}")),
    };

    n.checked_mul(secs_per_unit)
        .map(Duration::from_secs)
        .ok_or_else(|| format!("duration {s:?} is too large"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("10").unwrap(), Duration::from_secs(10));
        assert_eq!(parse_duration("10s").unwrap(), Duration::from_secs(10));
        assert_eq!(parse_duration("250ms").unwrap(), Duration::from_millis(250));
        assert_eq!(parse_duration("5m").unwrap(), Duration::from_secs(300));
        assert_eq!(parse_duration("1h").unwrap(), Duration::from_secs(3600));
        assert!(parse_duration("").is_err());
        assert!(parse_duration("ten").is_err());
        assert!(parse_duration("3d").is_err());
    }

    #[test]
    fn test_parse_duration_overflow_is_error() {
        let huge = format!("{}h", u64::MAX);
        assert!(parse_duration(&huge).is_err());
        assert!(parse_duration(&format!("{}m", u64::MAX / 2)).is_err());
        assert_eq!(
            parse_duration(&format!("{}s", u64::MAX)).unwrap(),
            Duration::from_secs(u64::MAX)
        );
    }

    #[test]
    fn test_server_defaults() {
        let cfg = ServerConfig::try_parse_from(["metrics-server"]).unwrap();
        assert_eq!(cfg.address, "127.0.0.1:8080");
        assert_eq!(cfg.store_interval, Duration::from_secs(300));
        assert!(cfg.restore);
        assert!(cfg.signer().is_none());
        assert_eq!(cfg.persistence(), Persistence::Periodic(Duration::from_secs(300)));
        assert_eq!(cfg.storage_settings().backend(), Backend::File);
    }

    #[test]
    fn test_server_persistence_selection() {
        let sync = ServerConfig::try_parse_from(["s", "-i", "0"]).unwrap();
        assert_eq!(sync.persistence(), Persistence::Synchronous);

        let memory = ServerConfig::try_parse_from(["s", "-f", ""]).unwrap();
        assert_eq!(memory.storage_settings().backend(), Backend::Memory);
        assert_eq!(memory.persistence(), Persistence::Unconfigured);

        let sql = ServerConfig::try_parse_from(["s", "-d", "sqlite::memory:", "-i", "0"]).unwrap();
        assert_eq!(sql.storage_settings().backend(), Backend::Sql);
        assert_eq!(sql.persistence(), Persistence::Unconfigured);

        let no_restore = ServerConfig::try_parse_from(["s", "-r", "false"]).unwrap();
        assert!(!no_restore.storage_settings().restore);
    }

    #[test]
    fn test_agent_rate_limit_validation() {
        let ok = AgentConfig::try_parse_from(["a", "-l", "4"]).unwrap();
        assert!(ok.validate().is_ok());

        for bad in ["0", "-2"] {
            let cfg = AgentConfig::try_parse_from(["a", "-l", bad]).unwrap();
            assert!(matches!(cfg.validate(), Err(MetricsError::Configuration(_))));
        }
    }

    #[test]
    fn test_agent_metric_names() {
        let all = AgentConfig::try_parse_from(["a"]).unwrap();
        assert_eq!(all.metric_names(), registry::default_names());

        let some = AgentConfig::try_parse_from(["a", "-m", "PollCount,RandomValue"]).unwrap();
        assert_eq!(some.metric_names(), vec!["PollCount", "RandomValue"]);
    }

    #[test]
    fn test_agent_base_url() {
        let cfg = AgentConfig::try_parse_from(["a", "-a", "localhost:9000"]).unwrap();
        assert_eq!(cfg.base_url(), "http://localhost:9000");

        let cfg = AgentConfig::try_parse_from(["a", "-a", "https://metrics.example/"]).unwrap();
        assert_eq!(cfg.base_url(), "https://metrics.example");
    }
}
