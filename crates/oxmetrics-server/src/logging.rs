use axum::{
    body::{Body, Bytes},
    extract::{FromRequest, Request},
    http::{header, HeaderMap, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Response},
};
use rand::Rng;
use std::fmt::Write;
use std::time::Instant;

pub const TRACE_HEADER: &str = "X-Trace-Id";

/// Per-request trace id, stored in request extensions.
///
/// Handlers extract it with `Extension<TraceId>` and attach it to their
/// error logs, so a failed request can be matched to its `--> request` line.
#[derive(Clone)]
pub struct TraceId(pub String);

impl std::ops::Deref for TraceId {
    type Target = str;
    fn deref(&self) -> &str {
        &self.0
    }
}

/// 8 random bytes as 16 hex chars.
fn generate_trace_id() -> String {
    let bytes: [u8; 8] = rand::thread_rng().gen();
    let mut s = String::with_capacity(16);
    for b in bytes {
        let _ = write!(s, "{b:02x}");
    }
    s
}

/// Characters of a request body kept in the `--> request` line.
const MAX_BODY_LOG_CHARS: usize = 200;

/// Cuts a body down to `max` bytes without splitting a UTF-8 character.
fn truncate_body(bytes: &[u8], max: usize) -> String {
    match std::str::from_utf8(bytes) {
        Ok(s) if s.len() > max => {
            let mut end = max;
            while end > 0 && !s.is_char_boundary(end) {
                end -= 1;
            }
            format!("{}...", &s[..end])
        }
        Ok(s) => s.to_string(),
        Err(_) => "<binary body>".to_string(),
    }
}

/// Latency as µs, ms or seconds, whichever reads best.
fn format_elapsed(elapsed_us: u128) -> String {
    if elapsed_us < 1000 {
        format!("{elapsed_us}µs")
    } else if elapsed_us < 1_000_000 {
        format!("{}ms", elapsed_us / 1000)
    } else {
        format!("{:.1}s", elapsed_us as f64 / 1_000_000.0)
    }
}

/// Bodies are only logged when they are plain (not content-encoded).
fn is_encoded(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_ENCODING)
        .is_some_and(|v| v.as_bytes() != b"identity")
}

fn with_trace_header(mut response: Response, trace_id: &str) -> Response {
    if let Ok(val) = HeaderValue::from_str(trace_id) {
        response.headers_mut().insert(TRACE_HEADER, val);
    }
    response
}

/// Request/response logging middleware.
///
/// Logs `--> request` with method, path and a body snippet for POSTs, then
/// `<-- response` with status and latency at a level chosen by status class.
/// Every response carries the request's trace id in `X-Trace-Id`.
///
/// Plain POST bodies are buffered under the router's body limit. A body that
/// cannot be read is answered here with the extractor's rejection (413 when
/// it is over the limit) instead of reaching a handler.
pub async fn request_logging(mut req: Request, next: Next) -> Response {
    let trace_id = generate_trace_id();
    req.extensions_mut().insert(TraceId(trace_id.clone()));

    let method = req.method().clone();
    let path = req.uri().path().to_string();

    let (req, req_snippet) = if method == axum::http::Method::POST && !is_encoded(req.headers()) {
        let (parts, body) = req.into_parts();
        let buffered = Request::from_parts(parts.clone(), body);
        let bytes = match Bytes::from_request(buffered, &()).await {
            Ok(bytes) => bytes,
            Err(rejection) => {
                tracing::warn!(
                    trace_id = %trace_id,
                    method = %method,
                    path = %path,
                    status = rejection.status().as_u16(),
                    error = %rejection.body_text(),
                    "--> request body rejected"
                );
                return with_trace_header(rejection.into_response(), &trace_id);
            }
        };
        let snippet = truncate_body(&bytes, MAX_BODY_LOG_CHARS);
        (Request::from_parts(parts, Body::from(bytes)), snippet)
    } else {
        (req, String::new())
    };

    if req_snippet.is_empty() {
        tracing::info!(trace_id = %trace_id, method = %method, path = %path, "--> request");
    } else {
        tracing::info!(
            trace_id = %trace_id,
            method = %method,
            path = %path,
            body = %req_snippet,
            "--> request"
        );
    }

    let start = Instant::now();
    let response = next.run(req).await;
    let elapsed = format_elapsed(start.elapsed().as_micros());
    let status = response.status().as_u16();

    if response.status().is_server_error() {
        tracing::error!(trace_id = %trace_id, status, elapsed = %elapsed, "<-- response");
    } else if response.status().is_client_error() {
        tracing::warn!(trace_id = %trace_id, status, elapsed = %elapsed, "<-- response");
    } else {
        tracing::info!(trace_id = %trace_id, status, elapsed = %elapsed, "<-- response");
    }

    with_trace_header(response, &trace_id)
}
