use crate::logging::TraceId;
use crate::state::AppState;
use axum::body::Bytes;
use axum::extract::{Extension, Path, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::Json;
use oxmetrics_common::types::{Metric, MetricError, MetricKind, MetricPayload};
use oxmetrics_storage::StorageError;
use serde::de::DeserializeOwned;
use std::fmt::Write;

pub const HASH_HEADER: &str = "Hash";

const PING_BODY: &str = "STORAGE IS AVAILABLE";

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error(transparent)]
    UnsupportedType(#[from] MetricError),

    #[error("hash mismatch for metric <{0}>")]
    IntegrityMismatch(String),

    #[error("metric <{id}> of type {kind} carries no {field}")]
    MissingField {
        id: String,
        kind: MetricKind,
        field: &'static str,
    },

    #[error("metric <{id}> is not a {requested}")]
    TypeMismatch { id: String, requested: MetricKind },

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_)
            | ApiError::IntegrityMismatch(_)
            | ApiError::MissingField { .. } => StatusCode::BAD_REQUEST,
            ApiError::UnsupportedType(_) => StatusCode::NOT_IMPLEMENTED,
            ApiError::TypeMismatch { .. } => StatusCode::NOT_FOUND,
            ApiError::Storage(StorageError::InvalidFormat) => StatusCode::BAD_REQUEST,
            ApiError::Storage(StorageError::NotFound { .. }) => StatusCode::NOT_FOUND,
            ApiError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), self.to_string()).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

/// Logs a failed request under its trace id.
fn traced<T>(trace_id: &TraceId, result: ApiResult<T>) -> ApiResult<T> {
    if let Err(e) = &result {
        if e.status().is_server_error() {
            tracing::error!(trace_id = %trace_id.0, error = %e, "Request failed");
        } else {
            tracing::debug!(trace_id = %trace_id.0, error = %e, "Request rejected");
        }
    }
    result
}

fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

fn parse_json<T: DeserializeOwned>(body: &[u8]) -> ApiResult<T> {
    serde_json::from_slice(body).map_err(|e| ApiError::BadRequest(format!("invalid JSON: {e}")))
}

/// Checks the payload's tag, taking it from the `Hash` header when the
/// body carries none. Always passes when the server has no key.
fn verify(payload: &mut MetricPayload, key: &str, headers: Option<&HeaderMap>) -> ApiResult<()> {
    if key.is_empty() {
        return Ok(());
    }
    if payload.hash.is_empty() {
        if let Some(tag) = headers
            .and_then(|h| h.get(HASH_HEADER))
            .and_then(|v| v.to_str().ok())
        {
            payload.hash = tag.to_string();
        }
    }
    if payload.hash.is_empty() || !payload.verify(key) {
        return Err(ApiError::IntegrityMismatch(payload.id.clone()));
    }
    Ok(())
}

/// Keeps only the field matching the metric's kind, rejecting updates
/// that lack it.
fn update_from(metric: Metric) -> ApiResult<Metric> {
    match metric.kind {
        MetricKind::Gauge => match metric.value {
            Some(value) => Ok(Metric::gauge(metric.id, value)),
            None => Err(ApiError::MissingField {
                id: metric.id,
                kind: metric.kind,
                field: "value",
            }),
        },
        MetricKind::Counter => match metric.delta {
            Some(delta) => Ok(Metric::counter(metric.id, delta)),
            None => Err(ApiError::MissingField {
                id: metric.id,
                kind: metric.kind,
                field: "delta",
            }),
        },
    }
}

fn lookup(state: &AppState, id: &str, requested: MetricKind) -> ApiResult<Metric> {
    let metric = state.storage.get_metric(id)?;
    if metric.kind != requested {
        return Err(ApiError::TypeMismatch {
            id: id.to_string(),
            requested,
        });
    }
    Ok(metric)
}

fn signed_response(state: &AppState, metric: &Metric) -> Response {
    let payload = MetricPayload::signed(metric, &state.key);
    let tag = HeaderValue::from_str(&payload.hash).ok();
    let mut response = Json(payload).into_response();
    if let Some(tag) = tag.filter(|t| !t.is_empty()) {
        response.headers_mut().insert(HASH_HEADER, tag);
    }
    response
}

fn render_index(state: &AppState) -> ApiResult<Html<String>> {
    let mut metrics = state.storage.get_all()?;
    metrics.sort_by(|a, b| a.id.cmp(&b.id));

    let mut page = String::from("<html><body>\n");
    for metric in &metrics {
        let rendered = metric.render_value().unwrap_or_default();
        let _ = writeln!(
            page,
            "<p>{}: {} ({})</p>",
            escape_html(&metric.id),
            rendered,
            metric.kind
        );
    }
    page.push_str("</body></html>\n");
    Ok(Html(page))
}

/// `GET /`: every metric as an HTML list, sorted by id.
pub async fn list_metrics(
    Extension(trace_id): Extension<TraceId>,
    State(state): State<AppState>,
) -> ApiResult<Html<String>> {
    traced(&trace_id, render_index(&state))
}

/// `GET /ping`
pub async fn ping(
    Extension(trace_id): Extension<TraceId>,
    State(state): State<AppState>,
) -> ApiResult<&'static str> {
    let health = state.storage.health_check().map_err(ApiError::from);
    traced(&trace_id, health.map(|()| PING_BODY))
}

/// `GET /value/{kind}/{name}`: the metric's value as plain text.
pub async fn value_text(
    Extension(trace_id): Extension<TraceId>,
    State(state): State<AppState>,
    Path((kind, name)): Path<(String, String)>,
) -> ApiResult<String> {
    traced(&trace_id, read_text(&state, &kind, name))
}

fn read_text(state: &AppState, kind: &str, name: String) -> ApiResult<String> {
    let kind: MetricKind = kind.parse()?;
    let metric = lookup(state, &name, kind)?;
    metric
        .render_value()
        .ok_or_else(|| ApiError::Storage(StorageError::NotFound { id: name }))
}

/// `POST /value/`: looks up `{id, type}` and answers with the signed metric.
pub async fn value_json(
    Extension(trace_id): Extension<TraceId>,
    State(state): State<AppState>,
    body: Bytes,
) -> ApiResult<Response> {
    traced(&trace_id, read_json(&state, &body))
}

fn read_json(state: &AppState, body: &[u8]) -> ApiResult<Response> {
    let payload: MetricPayload = parse_json(body)?;
    let kind: MetricKind = payload.mtype.parse()?;
    let metric = lookup(state, &payload.id, kind)?;
    Ok(signed_response(state, &metric))
}

/// `POST /update/{kind}/{name}/{value}`
pub async fn update_text(
    Extension(trace_id): Extension<TraceId>,
    State(state): State<AppState>,
    Path((kind, name, raw)): Path<(String, String, String)>,
) -> ApiResult<StatusCode> {
    traced(&trace_id, write_text(&state, &kind, name, &raw))
}

fn write_text(state: &AppState, kind: &str, name: String, raw: &str) -> ApiResult<StatusCode> {
    let kind: MetricKind = kind.parse()?;
    let metric = match kind {
        MetricKind::Gauge => raw
            .parse::<f64>()
            .map(|v| Metric::gauge(name, v))
            .map_err(|_| ApiError::BadRequest(format!("invalid gauge value '{raw}'")))?,
        MetricKind::Counter => raw
            .parse::<i64>()
            .map(|d| Metric::counter(name, d))
            .map_err(|_| ApiError::BadRequest(format!("invalid counter value '{raw}'")))?,
    };
    state.storage.update_metric(&metric)?;
    state.written();
    Ok(StatusCode::OK)
}

/// `POST /update/`: one JSON metric, tagged when the server has a key.
pub async fn update_json(
    Extension(trace_id): Extension<TraceId>,
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Response> {
    traced(&trace_id, write_json(&state, &headers, &body))
}

fn write_json(state: &AppState, headers: &HeaderMap, body: &[u8]) -> ApiResult<Response> {
    let mut payload: MetricPayload = parse_json(body)?;
    let _: MetricKind = payload.mtype.parse()?;
    verify(&mut payload, &state.key, Some(headers))?;
    let metric = update_from(Metric::try_from(payload)?)?;

    state.storage.update_metric(&metric)?;
    state.written();

    let stored = state.storage.get_metric(&metric.id)?;
    Ok(signed_response(state, &stored))
}

/// `POST /updates/`: a JSON array applied as one all-or-nothing batch.
///
/// Every entry is validated, and with a server key verified, before any of
/// them reaches storage.
pub async fn update_batch(
    Extension(trace_id): Extension<TraceId>,
    State(state): State<AppState>,
    body: Bytes,
) -> ApiResult<StatusCode> {
    traced(&trace_id, write_batch(&state, &body))
}

fn write_batch(state: &AppState, body: &[u8]) -> ApiResult<StatusCode> {
    let payloads: Vec<MetricPayload> = parse_json(body)?;
    let mut batch = Vec::with_capacity(payloads.len());
    for mut payload in payloads {
        verify(&mut payload, &state.key, None)?;
        let metric = Metric::try_from(payload)
            .map_err(|e| ApiError::BadRequest(format!("invalid batch entry: {e}")))?;
        batch.push(update_from(metric)?);
    }

    state.storage.update_batch(&batch)?;
    state.written();
    tracing::debug!(count = batch.len(), "Batch applied");
    Ok(StatusCode::OK)
}
