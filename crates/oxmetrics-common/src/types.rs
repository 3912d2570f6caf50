use serde::{Deserialize, Serialize};

use crate::hash;

/// Metric kind tag, serialized as `"gauge"` / `"counter"`.
///
/// # Examples
///
/// ```
/// use oxmetrics_common::types::MetricKind;
///
/// let kind: MetricKind = "counter".parse().unwrap();
/// assert_eq!(kind, MetricKind::Counter);
/// assert_eq!(kind.to_string(), "counter");
/// assert!("histogram".parse::<MetricKind>().is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricKind {
    Gauge,
    Counter,
}

impl MetricKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricKind::Gauge => "gauge",
            MetricKind::Counter => "counter",
        }
    }
}

impl std::fmt::Display for MetricKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for MetricKind {
    type Err = MetricError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "gauge" => Ok(MetricKind::Gauge),
            "counter" => Ok(MetricKind::Counter),
            _ => Err(MetricError::UnsupportedKind(s.to_string())),
        }
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum MetricError {
    #[error("unsupported metric type <{0}>")]
    UnsupportedKind(String),
}

/// A stored metric record.
///
/// Gauges carry `value`, counters carry `delta`. Either field may be absent
/// in an update, in which case the stored field is left as it was.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metric {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: MetricKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delta: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
}

impl Metric {
    pub fn gauge(id: impl Into<String>, value: f64) -> Self {
        Self {
            id: id.into(),
            kind: MetricKind::Gauge,
            delta: None,
            value: Some(value),
        }
    }

    pub fn counter(id: impl Into<String>, delta: i64) -> Self {
        Self {
            id: id.into(),
            kind: MetricKind::Counter,
            delta: Some(delta),
            value: None,
        }
    }

    /// Renders the field that matches the metric's kind as plain text.
    ///
    /// Gauges use three decimals, counters a plain integer. Returns `None`
    /// when that field has never been set.
    ///
    /// # Examples
    ///
    /// ```
    /// use oxmetrics_common::types::Metric;
    ///
    /// assert_eq!(Metric::gauge("temp", 19.75).render_value().as_deref(), Some("19.750"));
    /// assert_eq!(Metric::counter("hits", 8).render_value().as_deref(), Some("8"));
    /// ```
    pub fn render_value(&self) -> Option<String> {
        match self.kind {
            MetricKind::Gauge => self.value.map(|v| format!("{v:.3}")),
            MetricKind::Counter => self.delta.map(|d| d.to_string()),
        }
    }

    /// Whether the field required by the kind is present.
    pub fn has_payload(&self) -> bool {
        match self.kind {
            MetricKind::Gauge => self.value.is_some(),
            MetricKind::Counter => self.delta.is_some(),
        }
    }
}

/// JSON wire form of a metric, as exchanged between agent and server.
///
/// `type` is kept as a raw string so an unknown kind can be reported as
/// unsupported rather than as malformed JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricPayload {
    #[serde(default)]
    pub id: String,
    #[serde(rename = "type", default)]
    pub mtype: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delta: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub hash: String,
}

impl MetricPayload {
    /// Builds a payload from a stored metric, tagging it with `key`.
    pub fn signed(metric: &Metric, key: &str) -> Self {
        let mtype = metric.kind.as_str().to_string();
        let hash = hash::integrity_tag(key, &metric.id, &mtype, metric.delta, metric.value);
        Self {
            id: metric.id.clone(),
            mtype,
            delta: metric.delta,
            value: metric.value,
            hash,
        }
    }

    /// Checks the carried tag against `key`. Always true for an empty key.
    pub fn verify(&self, key: &str) -> bool {
        hash::verify_tag(key, &self.id, &self.mtype, self.delta, self.value, &self.hash)
    }
}

impl TryFrom<MetricPayload> for Metric {
    type Error = MetricError;

    fn try_from(payload: MetricPayload) -> Result<Self, Self::Error> {
        Ok(Metric {
            kind: payload.mtype.parse()?,
            id: payload.id,
            delta: payload.delta,
            value: payload.value,
        })
    }
}
