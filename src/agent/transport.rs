use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use tracing::debug;

use crate::error::{MetricsError, Result};
use crate::metric::{Metric, Signer};

/// Sends metrics to the server. One call per metric; a batch call is
/// available for transports that support it.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, metric: Metric) -> Result<()>;

    /// Defaults to sequential single sends, stopping at the first failure.
    async fn send_batch(&self, metrics: Vec<Metric>) -> Result<()> {
        for metric in metrics {
            self.send(metric).await?;
        }
        Ok(())
    }
}

/// JSON over HTTP: `POST /update/` per metric, `POST /updates/` per batch.
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
    signer: Option<Signer>,
}

impl HttpTransport {
    pub fn new(base_url: impl Into<String>, signer: Option<Signer>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| MetricsError::Configuration(format!("building HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.into(),
            signer,
        })
    }

    fn sign(&self, metric: &mut Metric) {
        if let Some(signer) = &self.signer {
            signer.sign(metric);
        }
    }

    async fn post<T: serde::Serialize + ?Sized>(&self, path: &str, body: &T) -> Result<()> {
        let url = format!("{}{}", self.base_url, path);
        let resp = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| MetricsError::Transport(format!("POST {url}: {e}")))?;

        match resp.status() {
            StatusCode::OK => Ok(()),
            status => Err(MetricsError::Transport(format!(
                "POST {url}: unexpected status {status}"
            ))),
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, mut metric: Metric) -> Result<()> {
        self.sign(&mut metric);
        self.post("/update/", &metric).await?;
        debug!(metric_id = %metric.id, "Sent");
        Ok(())
    }

    async fn send_batch(&self, mut metrics: Vec<Metric>) -> Result<()> {
        if metrics.is_empty() {
            return Ok(());
        }
        for m in metrics.iter_mut() {
            self.sign(m);
        }
        self.post("/updates/", &metrics).await?;
        debug!("Sent batch of {}", metrics.len());
        Ok(())
    }
}
