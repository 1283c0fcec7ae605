use std::fmt;
use std::str::FromStr;

use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::error::{MetricsError, Result};

// ─── Kind ────────────────────────────────────────────────────────

/// Metric kind as it appears on the wire (`"gauge"` / `"counter"`).
///
/// Unknown kinds survive deserialisation as `Other` so the service can
/// answer them with `NotImplemented` instead of a decode failure.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum MetricKind {
    Gauge,
    Counter,
    Other(String),
}

impl MetricKind {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Gauge => "gauge",
            Self::Counter => "counter",
            Self::Other(kind) => kind,
        }
    }
}

impl From<String> for MetricKind {
    fn from(s: String) -> Self {
        match s.as_str() {
            "gauge" => Self::Gauge,
            "counter" => Self::Counter,
            _ => Self::Other(s),
        }
    }
}

impl From<MetricKind> for String {
    fn from(kind: MetricKind) -> Self {
        kind.as_str().to_owned()
    }
}

impl FromStr for MetricKind {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self::from(s.to_owned()))
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─── Record ──────────────────────────────────────────────────────

/// The wire and storage record: the latest materialised value of one metric.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metric {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: MetricKind,
    /// Set iff `kind` is `Counter`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delta: Option<i64>,
    /// Set iff `kind` is `Gauge`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
    /// Hex HMAC-SHA256 of `id:kind:payload`, present when a key is configured
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
}

impl Metric {
    pub fn gauge(id: impl Into<String>, value: f64) -> Self {
        Self {
            id: id.into(),
            kind: MetricKind::Gauge,
            delta: None,
            value: Some(value),
            hash: None,
        }
    }

    pub fn counter(id: impl Into<String>, delta: i64) -> Self {
        Self {
            id: id.into(),
            kind: MetricKind::Counter,
            delta: Some(delta),
            value: None,
            hash: None,
        }
    }

    /// A query record: identity only, no payload.
    pub fn query(id: impl Into<String>, kind: MetricKind) -> Self {
        Self {
            id: id.into(),
            kind,
            delta: None,
            value: None,
            hash: None,
        }
    }

    /// Checks that the id is non-empty and that exactly one finite payload
    /// matching the kind is set. Unknown kinds are not judged here.
    pub fn check_payload(&self) -> Result<()> {
        let reason = if self.id.is_empty() {
            "empty id"
        } else {
            match (&self.kind, self.delta, self.value) {
                (MetricKind::Gauge, None, Some(v)) if !v.is_finite() => "gauge value is not finite",
                (MetricKind::Counter, Some(_), None) | (MetricKind::Gauge, None, Some(_)) => return Ok(()),
                (MetricKind::Other(_), _, _) => return Ok(()),
                (MetricKind::Counter, None, _) => "counter without delta",
                (MetricKind::Gauge, _, None) => "gauge without value",
                _ => "both delta and value are set",
            }
        };
        Err(MetricsError::MalformedMetric {
            id: self.id.clone(),
            reason: reason.into(),
        })
    }

    /// The string covered by the signature: `id:kind:value-or-delta`.
    /// Gauges use six fractional digits.
    pub fn signing_payload(&self) -> String {
        let payload = match self.kind {
            MetricKind::Gauge => self.value.map(|v| format!("{v:.6}")),
            MetricKind::Counter => self.delta.map(|d| d.to_string()),
            MetricKind::Other(_) => None,
        };
        format!("{}:{}:{}", self.id, self.kind, payload.unwrap_or_default())
    }

    /// Plain-text rendering of the payload used by the `/value/:type/:name` route.
    pub fn payload_text(&self) -> Option<String> {
        match self.kind {
            MetricKind::Gauge => self.value.map(format_gauge),
            MetricKind::Counter => self.delta.map(|d| d.to_string()),
            MetricKind::Other(_) => None,
        }
    }
}

/// Shortest round-trip digits, switching to exponent form (`1e-07`,
/// `1.234567e+06`) when the decimal exponent is below -4 or at least 6.
fn format_gauge(v: f64) -> String {
    if !v.is_finite() {
        return v.to_string();
    }
    let sci = format!("{v:e}");
    let Some((mantissa, exp)) = sci.split_once('e') else {
        return v.to_string();
    };
    match exp.parse::<i32>() {
        Ok(exp) if !(-4..6).contains(&exp) => {
            let sign = if exp < 0 { '-' } else { '+' };
            format!("{mantissa}e{sign}{:02}", exp.abs())
        }
        _ => v.to_string(),
    }
}

// ─── Signing ─────────────────────────────────────────────────────

type HmacSha256 = Hmac<Sha256>;

/// HMAC-SHA256 signer bound to one shared key.
#[derive(Clone)]
pub struct Signer {
    // Keyed once; cloned per signature
    mac: HmacSha256,
}

impl Signer {
    /// Returns `None` for an empty key: an empty key means signing is off.
    pub fn new(key: &str) -> Option<Self> {
        if key.is_empty() {
            return None;
        }
        HmacSha256::new_from_slice(key.as_bytes())
            .ok()
            .map(|mac| Self { mac })
    }

    pub fn hash(&self, metric: &Metric) -> String {
        let mut mac = self.mac.clone();
        mac.update(metric.signing_payload().as_bytes());
        format!("{:x}", mac.finalize().into_bytes())
    }

    /// Attaches a fresh signature to `metric`.
    pub fn sign(&self, metric: &mut Metric) {
        metric.hash = Some(self.hash(metric));
    }

    pub fn verify(&self, metric: &Metric) -> bool {
        metric.hash.as_deref() == Some(self.hash(metric).as_str())
    }
}

impl fmt::Debug for Signer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Signer(..)")
    }
}
