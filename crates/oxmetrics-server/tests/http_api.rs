mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use common::{
    build_keyed_context, build_sqlite_context, build_test_context, request_json, request_no_body,
    request_raw, send,
};
use flate2::write::GzEncoder;
use flate2::Compression;
use oxmetrics_common::types::{Metric, MetricPayload};
use serde_json::json;
use std::io::Write;

fn signed(metric: &Metric, key: &str) -> serde_json::Value {
    serde_json::to_value(MetricPayload::signed(metric, key)).unwrap()
}

#[tokio::test]
async fn text_counter_accumulates() {
    let ctx = build_test_context();

    let resp = request_no_body(&ctx.app, "POST", "/update/counter/hits/5").await;
    assert_eq!(resp.status, StatusCode::OK);
    let resp = request_no_body(&ctx.app, "GET", "/value/counter/hits").await;
    assert_eq!(resp.body, "5");

    request_no_body(&ctx.app, "POST", "/update/counter/hits/3").await;
    let resp = request_no_body(&ctx.app, "GET", "/value/counter/hits").await;
    assert_eq!(resp.status, StatusCode::OK);
    assert_eq!(resp.body, "8");
}

#[tokio::test]
async fn text_gauge_keeps_last_value() {
    let ctx = build_test_context();
    request_no_body(&ctx.app, "POST", "/update/gauge/temp/21.5").await;
    request_no_body(&ctx.app, "POST", "/update/gauge/temp/19.75").await;

    let resp = request_no_body(&ctx.app, "GET", "/value/gauge/temp").await;
    assert_eq!(resp.body, "19.750");
}

#[tokio::test]
async fn unknown_type_is_not_implemented() {
    let ctx = build_test_context();
    let resp = request_no_body(&ctx.app, "GET", "/value/unknowntype/name").await;
    assert_eq!(resp.status, StatusCode::NOT_IMPLEMENTED);

    let resp = request_no_body(&ctx.app, "POST", "/update/histogram/name/1").await;
    assert_eq!(resp.status, StatusCode::NOT_IMPLEMENTED);

    let resp = request_json(&ctx.app, "/update/", json!({"id": "x", "type": "summary", "value": 1.0}), &[]).await;
    assert_eq!(resp.status, StatusCode::NOT_IMPLEMENTED);
}

#[tokio::test]
async fn missing_or_mismatched_metric_is_not_found() {
    let ctx = build_test_context();
    let resp = request_no_body(&ctx.app, "GET", "/value/counter/nope").await;
    assert_eq!(resp.status, StatusCode::NOT_FOUND);

    request_no_body(&ctx.app, "POST", "/update/gauge/temp/1").await;
    let resp = request_no_body(&ctx.app, "GET", "/value/counter/temp").await;
    assert_eq!(resp.status, StatusCode::NOT_FOUND);

    let resp = request_json(&ctx.app, "/value/", json!({"id": "temp", "type": "counter"}), &[]).await;
    assert_eq!(resp.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn unparsable_text_value_is_bad_request() {
    let ctx = build_test_context();
    let resp = request_no_body(&ctx.app, "POST", "/update/counter/hits/1.5").await;
    assert_eq!(resp.status, StatusCode::BAD_REQUEST);
    let resp = request_no_body(&ctx.app, "POST", "/update/gauge/temp/warm").await;
    assert_eq!(resp.status, StatusCode::BAD_REQUEST);
    assert!(ctx.storage.get_all().unwrap().is_empty());
}

#[tokio::test]
async fn json_update_returns_stored_metric() {
    let ctx = build_test_context();
    let body = json!({"id": "PollCount", "type": "counter", "delta": 2});

    let resp = request_json(&ctx.app, "/update/", body.clone(), &[]).await;
    assert_eq!(resp.status, StatusCode::OK);
    let resp = request_json(&ctx.app, "/update", body, &[]).await;
    assert_eq!(resp.status, StatusCode::OK);
    assert_eq!(resp.json()["delta"], 4);
    assert_eq!(resp.json()["type"], "counter");
}

#[tokio::test]
async fn json_update_without_payload_field_is_bad_request() {
    let ctx = build_test_context();
    let resp = request_json(&ctx.app, "/update/", json!({"id": "temp", "type": "gauge", "delta": 3}), &[]).await;
    assert_eq!(resp.status, StatusCode::BAD_REQUEST);

    let resp = request_json(&ctx.app, "/update/", json!({"type": "gauge", "value": 3.0}), &[]).await;
    assert_eq!(resp.status, StatusCode::BAD_REQUEST);

    let resp = request_raw(&ctx.app, "/update/", "null").await;
    assert_eq!(resp.status, StatusCode::BAD_REQUEST);
    let resp = request_raw(&ctx.app, "/update/", "{not json").await;
    assert_eq!(resp.status, StatusCode::BAD_REQUEST);
    assert!(ctx.storage.get_all().unwrap().is_empty());
}

#[tokio::test]
async fn keyed_json_update_requires_valid_hash() {
    let ctx = build_keyed_context("secret");
    let metric = Metric::gauge("Alloc", 512.0);

    let unsigned = json!({"id": "Alloc", "type": "gauge", "value": 512.0});
    let resp = request_json(&ctx.app, "/update/", unsigned.clone(), &[]).await;
    assert_eq!(resp.status, StatusCode::BAD_REQUEST);

    let wrong = signed(&metric, "not-the-key");
    let resp = request_json(&ctx.app, "/update/", wrong, &[]).await;
    assert_eq!(resp.status, StatusCode::BAD_REQUEST);
    assert!(ctx.storage.get_all().unwrap().is_empty());

    let resp = request_json(&ctx.app, "/update/", signed(&metric, "secret"), &[]).await;
    assert_eq!(resp.status, StatusCode::OK);

    let tag = MetricPayload::signed(&metric, "secret").hash;
    let resp = request_json(&ctx.app, "/update/", unsigned, &[("Hash", tag.as_str())]).await;
    assert_eq!(resp.status, StatusCode::OK);
}

#[tokio::test]
async fn keyed_value_lookup_is_signed() {
    let ctx = build_keyed_context("secret");
    request_no_body(&ctx.app, "POST", "/update/counter/hits/8").await;

    let resp = request_json(&ctx.app, "/value/", json!({"id": "hits", "type": "counter"}), &[]).await;
    assert_eq!(resp.status, StatusCode::OK);
    let payload: MetricPayload = serde_json::from_str(&resp.body).unwrap();
    assert_eq!(payload.delta, Some(8));
    assert!(payload.verify("secret"));
    assert_eq!(resp.headers["hash"].to_str().unwrap(), payload.hash);
}

#[tokio::test]
async fn batch_with_unhashed_entry_is_rejected_without_mutation() {
    let ctx = build_keyed_context("secret");
    request_no_body(&ctx.app, "POST", "/update/counter/PollCount/1").await;

    let batch = json!([
        signed(&Metric::counter("PollCount", 10), "secret"),
        {"id": "RandomValue", "type": "gauge", "value": 0.5},
    ]);
    let resp = request_json(&ctx.app, "/updates/", batch, &[]).await;
    assert_eq!(resp.status, StatusCode::BAD_REQUEST);

    let all = ctx.storage.get_all().unwrap();
    assert_eq!(all, vec![Metric::counter("PollCount", 1)]);
}

#[tokio::test]
async fn keyed_batch_applies_signed_entries() {
    let ctx = build_keyed_context("secret");
    let batch = json!([
        signed(&Metric::counter("PollCount", 2), "secret"),
        signed(&Metric::gauge("RandomValue", 0.25), "secret"),
        signed(&Metric::counter("PollCount", 3), "secret"),
    ]);
    let resp = request_json(&ctx.app, "/updates/", batch, &[]).await;
    assert_eq!(resp.status, StatusCode::OK);

    let resp = request_no_body(&ctx.app, "GET", "/value/counter/PollCount").await;
    assert_eq!(resp.body, "5");
    let resp = request_no_body(&ctx.app, "GET", "/value/gauge/RandomValue").await;
    assert_eq!(resp.body, "0.250");
}

#[tokio::test]
async fn batch_with_bad_entry_is_bad_request() {
    let ctx = build_test_context();
    let batch = json!([
        {"id": "ok", "type": "counter", "delta": 1},
        {"id": "bad", "type": "histogram", "value": 1.0},
    ]);
    let resp = request_json(&ctx.app, "/updates", batch, &[]).await;
    assert_eq!(resp.status, StatusCode::BAD_REQUEST);

    let batch = json!([
        {"id": "ok", "type": "counter", "delta": 1},
        {"id": "", "type": "counter", "delta": 1},
    ]);
    let resp = request_json(&ctx.app, "/updates/", batch, &[]).await;
    assert_eq!(resp.status, StatusCode::BAD_REQUEST);
    assert!(ctx.storage.get_all().unwrap().is_empty());
}

#[tokio::test]
async fn gzip_request_body_is_accepted() {
    let ctx = build_test_context();
    let body = json!([{"id": "PollCount", "type": "counter", "delta": 4}]).to_string();
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(body.as_bytes()).unwrap();
    let compressed = encoder.finish().unwrap();

    let req = Request::builder()
        .method("POST")
        .uri("/updates/")
        .header("Content-Type", "application/json")
        .header("Content-Encoding", "gzip")
        .body(Body::from(compressed))
        .unwrap();
    let resp = send(&ctx.app, req).await;
    assert_eq!(resp.status, StatusCode::OK);
    assert_eq!(ctx.storage.get_metric("PollCount").unwrap().delta, Some(4));
}

#[tokio::test]
async fn response_is_compressed_when_accepted() {
    let ctx = build_test_context();
    for i in 0..20 {
        request_no_body(&ctx.app, "POST", &format!("/update/gauge/Metric{i:02}/{i}")).await;
    }
    let req = Request::builder()
        .method("GET")
        .uri("/")
        .header("Accept-Encoding", "gzip")
        .body(Body::empty())
        .unwrap();
    let resp = send(&ctx.app, req).await;
    assert_eq!(resp.status, StatusCode::OK);
    assert_eq!(
        resp.headers
            .get("content-encoding")
            .and_then(|v| v.to_str().ok()),
        Some("gzip")
    );
}

#[tokio::test]
async fn index_lists_metrics_sorted() {
    let ctx = build_test_context();
    request_no_body(&ctx.app, "POST", "/update/gauge/temp/19.75").await;
    request_no_body(&ctx.app, "POST", "/update/counter/hits/8").await;

    let resp = request_no_body(&ctx.app, "GET", "/").await;
    assert_eq!(resp.status, StatusCode::OK);
    assert!(resp.headers["content-type"]
        .to_str()
        .unwrap()
        .starts_with("text/html"));
    let hits = resp.body.find("<p>hits: 8 (counter)</p>").unwrap();
    let temp = resp.body.find("<p>temp: 19.750 (gauge)</p>").unwrap();
    assert!(hits < temp);
}

#[tokio::test]
async fn index_escapes_markup_in_ids() {
    let ctx = build_test_context();
    let resp = request_json(
        &ctx.app,
        "/update/",
        json!({"id": "<b>x&y</b>", "type": "gauge", "value": 1.0}),
        &[],
    )
    .await;
    assert_eq!(resp.status, StatusCode::OK);

    let resp = request_no_body(&ctx.app, "GET", "/").await;
    assert!(resp
        .body
        .contains("<p>&lt;b&gt;x&amp;y&lt;/b&gt;: 1.000 (gauge)</p>"));
    assert!(!resp.body.contains("<b>x"));
}

#[tokio::test]
async fn oversized_body_is_payload_too_large() {
    let ctx = build_test_context();
    let entry = r#"{"id":"hits","type":"counter","delta":1}"#;
    let count = oxmetrics_server::app::MAX_REQUEST_BODY / entry.len() + 1;
    let body = format!("[{}]", vec![entry; count].join(","));

    let req = Request::builder()
        .method("POST")
        .uri("/updates/")
        .header("Content-Type", "application/json")
        .body(Body::from(body))
        .unwrap();
    let resp = send(&ctx.app, req).await;
    assert_eq!(resp.status, StatusCode::PAYLOAD_TOO_LARGE);
    assert!(resp.headers.contains_key("x-trace-id"));
    assert!(ctx.storage.get_all().unwrap().is_empty());
}

#[tokio::test]
async fn ping_reports_storage_health() {
    let ctx = build_test_context();
    let resp = request_no_body(&ctx.app, "GET", "/ping").await;
    assert_eq!(resp.status, StatusCode::OK);
    assert_eq!(resp.body, "STORAGE IS AVAILABLE");
    assert!(resp.headers.contains_key("x-trace-id"));

    ctx.storage.close().unwrap();
    let resp = request_no_body(&ctx.app, "GET", "/ping").await;
    assert_eq!(resp.status, StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn sqlite_backend_serves_same_api() {
    let ctx = build_sqlite_context();
    request_no_body(&ctx.app, "POST", "/update/counter/hits/5").await;
    request_no_body(&ctx.app, "POST", "/update/counter/hits/3").await;
    let resp = request_no_body(&ctx.app, "GET", "/value/counter/hits").await;
    assert_eq!(resp.body, "8");

    let batch = json!([
        {"id": "hits", "type": "counter", "delta": 2},
        {"id": "temp", "type": "gauge", "value": 21.5},
    ]);
    let resp = request_json(&ctx.app, "/updates/", batch, &[]).await;
    assert_eq!(resp.status, StatusCode::OK);
    let resp = request_no_body(&ctx.app, "GET", "/value/counter/hits").await;
    assert_eq!(resp.body, "10");
    let resp = request_no_body(&ctx.app, "GET", "/value/gauge/temp").await;
    assert_eq!(resp.body, "21.500");

    let resp = request_no_body(&ctx.app, "GET", "/ping").await;
    assert_eq!(resp.status, StatusCode::OK);
}
