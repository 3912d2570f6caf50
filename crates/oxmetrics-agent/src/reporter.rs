use crate::config::{AgentConfig, ReportMode};
use flate2::write::GzEncoder;
use flate2::Compression;
use oxmetrics_common::types::{Metric, MetricKind, MetricPayload};
use oxmetrics_storage::{MemStorage, MetricStorage, StorageError};
use reqwest::header::{CONTENT_ENCODING, CONTENT_TYPE};
use reqwest::{Client, StatusCode};
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

pub const HASH_HEADER: &str = "Hash";

#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("server rejected report with status {status}: {body}")]
    Rejected { status: StatusCode, body: String },

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("cannot encode payload: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("cannot compress payload: {0}")]
    Compress(#[from] std::io::Error),
}

/// Sends the contents of the local buffer to the server.
///
/// A counter's sent delta is subtracted from the buffer only after the server
/// acknowledged it with a 2xx status. Increments polled during the send stay
/// buffered. A counter whose send failed keeps accumulating and goes out again
/// on the next tick.
pub struct Reporter {
    client: Client,
    base_url: String,
    key: String,
    mode: ReportMode,
    compress: bool,
    storage: Arc<MemStorage>,
}

impl Reporter {
    pub fn new(config: &AgentConfig, storage: Arc<MemStorage>) -> Result<Self, ReportError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;
        Ok(Self {
            client,
            base_url: config.server_url(),
            key: config.key.clone(),
            mode: config.report_mode,
            compress: config.compress,
            storage,
        })
    }

    /// Reports a snapshot of the buffer in the configured mode.
    ///
    /// Returns how many metrics the server acknowledged.
    pub async fn report_once(self: &Arc<Self>) -> Result<usize, ReportError> {
        let snapshot = self.storage.get_all()?;
        if snapshot.is_empty() {
            return Ok(0);
        }
        match self.mode {
            ReportMode::Batch => self.report_batch(snapshot).await,
            ReportMode::Json | ReportMode::Text => Ok(self.report_each(snapshot).await),
        }
    }

    async fn report_batch(&self, snapshot: Vec<Metric>) -> Result<usize, ReportError> {
        let payloads: Vec<MetricPayload> = snapshot
            .iter()
            .map(|m| MetricPayload::signed(m, &self.key))
            .collect();
        let body = serde_json::to_vec(&payloads)?;
        let request = self.json_request("/updates/", body)?;
        check_status(request.send().await?).await?;

        for metric in &snapshot {
            self.reset_counter(metric);
        }
        tracing::debug!(count = snapshot.len(), "Batch reported");
        Ok(snapshot.len())
    }

    async fn report_each(self: &Arc<Self>, snapshot: Vec<Metric>) -> usize {
        let total = snapshot.len();
        let mut handles = Vec::with_capacity(total);
        for metric in snapshot {
            let this = Arc::clone(self);
            handles.push(tokio::spawn(async move {
                match this.send_one(&metric).await {
                    Ok(()) => {
                        this.reset_counter(&metric);
                        true
                    }
                    Err(e) => {
                        tracing::warn!(metric = %metric.id, error = %e, "Failed to report metric");
                        false
                    }
                }
            }));
        }

        let mut acknowledged = 0;
        for handle in handles {
            match handle.await {
                Ok(true) => acknowledged += 1,
                Ok(false) => {}
                Err(e) => tracing::error!(error = %e, "Report task panicked"),
            }
        }
        tracing::debug!(count = acknowledged, total, "Metrics reported");
        acknowledged
    }

    async fn send_one(&self, metric: &Metric) -> Result<(), ReportError> {
        let request = match self.mode {
            ReportMode::Text => {
                let raw = match metric.kind {
                    MetricKind::Gauge => metric.value.map(|v| v.to_string()),
                    MetricKind::Counter => metric.delta.map(|d| d.to_string()),
                };
                let Some(raw) = raw else {
                    return Ok(());
                };
                let url = format!(
                    "{}/update/{}/{}/{}",
                    self.base_url,
                    metric.kind,
                    urlencoding::encode(&metric.id),
                    raw
                );
                self.client.post(url)
            }
            ReportMode::Json | ReportMode::Batch => {
                let payload = MetricPayload::signed(metric, &self.key);
                let body = serde_json::to_vec(&payload)?;
                let mut request = self.json_request("/update/", body)?;
                if !payload.hash.is_empty() {
                    request = request.header(HASH_HEADER, payload.hash.as_str());
                }
                request
            }
        };
        check_status(request.send().await?).await
    }

    fn json_request(&self, path: &str, body: Vec<u8>) -> Result<reqwest::RequestBuilder, ReportError> {
        let request = self
            .client
            .post(format!("{}{}", self.base_url, path))
            .header(CONTENT_TYPE, "application/json");
        if !self.compress {
            return Ok(request.body(body));
        }
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&body)?;
        Ok(request
            .header(CONTENT_ENCODING, "gzip")
            .body(encoder.finish()?))
    }

    /// Subtracts the delta carried by `sent` from the buffered counter.
    fn reset_counter(&self, sent: &Metric) {
        let (MetricKind::Counter, Some(delta)) = (sent.kind, sent.delta) else {
            return;
        };
        if let Err(e) = self.storage.reset_delta(&sent.id, delta) {
            tracing::warn!(metric = %sent.id, error = %e, "Failed to reset counter");
        }
    }
}

async fn check_status(response: reqwest::Response) -> Result<(), ReportError> {
    let status = response.status();
    if status.is_success() {
        return Ok(());
    }
    let body = response.text().await.unwrap_or_default();
    Err(ReportError::Rejected {
        status,
        body: body.trim().to_string(),
    })
}
