use anyhow::{bail, Context};
use oxmetrics_common::env::parse_secs;
use serde::Deserialize;
use std::time::Duration;

/// How collected metrics are sent on each report tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportMode {
    /// One `POST /updates/` carrying every metric.
    #[default]
    Batch,
    /// One `POST /update/` JSON request per metric.
    Json,
    /// One `POST /update/{type}/{name}/{value}` request per metric.
    Text,
}

impl std::str::FromStr for ReportMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "batch" => Ok(ReportMode::Batch),
            "json" => Ok(ReportMode::Json),
            "text" => Ok(ReportMode::Text),
            other => bail!("unknown report mode '{other}' (expected batch, json or text)"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AgentConfig {
    /// Server address, `host:port` or a full `http://` URL.
    #[serde(default = "default_address")]
    pub address: String,
    /// Shared key for payload integrity tags. Empty disables tagging.
    #[serde(default)]
    pub key: String,
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_report_interval")]
    pub report_interval_secs: u64,
    #[serde(default)]
    pub report_mode: ReportMode,
    /// Gzip JSON request bodies.
    #[serde(default = "default_true")]
    pub compress: bool,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    /// Upper bound (exclusive) of the `RandomValue` gauge.
    #[serde(default = "default_random_max")]
    pub random_max: f64,
}

fn default_address() -> String {
    "127.0.0.1:8080".to_string()
}

fn default_poll_interval() -> u64 {
    2
}

fn default_report_interval() -> u64 {
    10
}

fn default_true() -> bool {
    true
}

fn default_request_timeout() -> u64 {
    5
}

fn default_random_max() -> f64 {
    100.0
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            address: default_address(),
            key: String::new(),
            poll_interval_secs: default_poll_interval(),
            report_interval_secs: default_report_interval(),
            report_mode: ReportMode::default(),
            compress: true,
            request_timeout_secs: default_request_timeout(),
            random_max: default_random_max(),
        }
    }
}

impl AgentConfig {
    /// Reads the TOML file at `path`, falling back to defaults when it does
    /// not exist, then applies environment overrides.
    pub fn load(path: &str) -> anyhow::Result<Self> {
        Self::load_with(path, |name| std::env::var(name).ok())
    }

    /// Like [`AgentConfig::load`], with overrides taken from `lookup`.
    pub fn load_with<F>(path: &str, lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = match std::fs::read_to_string(path) {
            Ok(content) => toml::from_str(&content)
                .with_context(|| format!("invalid agent config {path}"))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = %path, "Config file not found, using defaults");
                Self::default()
            }
            Err(e) => return Err(e).with_context(|| format!("cannot read {path}")),
        };
        config.apply_overrides(lookup)?;
        config.validate()?;
        Ok(config)
    }

    /// Applies `ADDRESS`, `KEY`, `POLL_INTERVAL`, `REPORT_INTERVAL` and
    /// `REPORT_MODE` as returned by `lookup`.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> anyhow::Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(address) = lookup("ADDRESS") {
            self.address = address;
        }
        if let Some(key) = lookup("KEY") {
            self.key = key;
        }
        if let Some(raw) = lookup("POLL_INTERVAL") {
            self.poll_interval_secs =
                parse_secs(&raw).with_context(|| format!("invalid POLL_INTERVAL '{raw}'"))?;
        }
        if let Some(raw) = lookup("REPORT_INTERVAL") {
            self.report_interval_secs =
                parse_secs(&raw).with_context(|| format!("invalid REPORT_INTERVAL '{raw}'"))?;
        }
        if let Some(raw) = lookup("REPORT_MODE") {
            self.report_mode = raw.parse()?;
        }
        Ok(())
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.poll_interval_secs == 0 {
            bail!("poll_interval_secs must be greater than zero");
        }
        if self.report_interval_secs == 0 {
            bail!("report_interval_secs must be greater than zero");
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn report_interval(&self) -> Duration {
        Duration::from_secs(self.report_interval_secs)
    }

    /// Base URL of the server, with an `http://` scheme when none is given.
    pub fn server_url(&self) -> String {
        let addr = self.address.trim().trim_end_matches('/');
        if addr.contains("://") {
            return addr.to_string();
        }
        format!("http://{addr}")
    }
}
