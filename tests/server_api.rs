use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tower::ServiceExt;

use rust_metrics_pipeline::{
    repository::MemoryRepository,
    server::{create_router, AppState},
    service::{MetricsService, Persistence},
    Metric, Signer,
};

fn app(key: &str) -> Router {
    let repo = Arc::new(MemoryRepository::new());
    let service = Arc::new(MetricsService::new(repo, Signer::new(key), Persistence::Unconfigured));
    create_router(Arc::new(AppState { service }))
}

async fn send(app: &Router, req: Request<Body>) -> (StatusCode, String) {
    let resp = app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    (status, String::from_utf8(bytes.to_vec()).unwrap())
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::post(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn post_empty(uri: &str) -> Request<Body> {
    Request::post(uri).body(Body::empty()).unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::get(uri).body(Body::empty()).unwrap()
}

#[tokio::test]
async fn test_counter_updates_echo_accumulated_total() {
    let app = app("");

    let (status, body) = send(&app, post_json("/update/", json!({"id": "hits", "type": "counter", "delta": 5}))).await;
    assert_eq!(status, StatusCode::OK);
    let echoed: Metric = serde_json::from_str(&body).unwrap();
    assert_eq!(echoed.delta, Some(5));

    let (_, body) = send(&app, post_json("/update/", json!({"id": "hits", "type": "counter", "delta": 3}))).await;
    let echoed: Metric = serde_json::from_str(&body).unwrap();
    assert_eq!(echoed.delta, Some(8));

    let (status, body) = send(&app, get("/value/counter/hits")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "8");
}

#[tokio::test]
async fn test_path_update_and_text_value() {
    let app = app("");

    let (status, _) = send(&app, post_empty("/update/gauge/temp/21.5")).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = send(&app, post_empty("/update/gauge/temp/-3.25")).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(&app, get("/value/gauge/temp")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "-3.25");

    // Stored as a gauge, so a counter lookup misses
    let (status, _) = send(&app, get("/value/counter/temp")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_value_json_lookup() {
    let app = app("");
    send(&app, post_empty("/update/counter/PollCount/4")).await;

    let (status, body) = send(&app, post_json("/value/", json!({"id": "PollCount", "type": "counter"}))).await;
    assert_eq!(status, StatusCode::OK);
    let stored: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(stored, json!({"id": "PollCount", "type": "counter", "delta": 4}));

    let (status, body) = send(&app, post_json("/value/", json!({"id": "missing", "type": "gauge"}))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let err: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(err["status"], 404);
}

#[tokio::test]
async fn test_unknown_kind_is_not_implemented() {
    let app = app("");

    let (status, _) = send(&app, post_empty("/update/histogram/lat/1")).await;
    assert_eq!(status, StatusCode::NOT_IMPLEMENTED);

    let (status, _) = send(&app, post_json("/update/", json!({"id": "lat", "type": "histogram", "value": 1.0}))).await;
    assert_eq!(status, StatusCode::NOT_IMPLEMENTED);

    let (status, _) = send(&app, get("/value/histogram/lat")).await;
    assert_eq!(status, StatusCode::NOT_IMPLEMENTED);
}

#[tokio::test]
async fn test_bad_requests() {
    let app = app("");

    let (status, _) = send(&app, post_empty("/update/counter/hits/1.5")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(&app, post_empty("/update/gauge/temp/warm")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(&app, post_json("/update/", json!({"id": "hits", "type": "counter", "value": 1.0}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let req = Request::post("/update/")
        .header("content-type", "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let (status, _) = send(&app, req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_signatures_are_enforced() {
    let app = app("secret");
    let signer = Signer::new("secret").unwrap();

    let mut good = Metric::counter("hits", 2);
    signer.sign(&mut good);
    let (status, body) = send(&app, post_json("/update/", serde_json::to_value(&good).unwrap())).await;
    assert_eq!(status, StatusCode::OK);
    let echoed: Metric = serde_json::from_str(&body).unwrap();
    assert!(signer.verify(&echoed));

    let mut forged = Metric::counter("hits", 100);
    forged.hash = good.hash.clone();
    let (status, _) = send(&app, post_json("/update/", serde_json::to_value(&forged).unwrap())).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, body) = send(&app, get("/value/counter/hits")).await;
    assert_eq!(body, "2");
}

#[tokio::test]
async fn test_batch_update() {
    let app = app("");

    let batch = json!([
        {"id": "hits", "type": "counter", "delta": 1},
        {"id": "hits", "type": "counter", "delta": 2},
        {"id": "temp", "type": "gauge", "value": 0.5}
    ]);
    let (status, body) = send(&app, post_json("/updates/", batch)).await;
    assert_eq!(status, StatusCode::OK);
    let stored: Vec<Metric> = serde_json::from_str(&body).unwrap();
    assert_eq!(stored.len(), 3);
    assert_eq!(stored[1].delta, Some(3));

    // A bad record stops the batch; earlier records stay applied
    let batch = json!([
        {"id": "hits", "type": "counter", "delta": 10},
        {"id": "bad", "type": "counter"},
        {"id": "hits", "type": "counter", "delta": 100}
    ]);
    let (status, _) = send(&app, post_json("/updates/", batch)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, body) = send(&app, get("/value/counter/hits")).await;
    assert_eq!(body, "13");
}

#[tokio::test]
async fn test_ping_and_listing() {
    let app = app("");

    let (status, body) = send(&app, get("/ping")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "OK");

    send(&app, post_empty("/update/gauge/b/1")).await;
    send(&app, post_empty("/update/counter/a/1")).await;

    let (status, body) = send(&app, get("/")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "a\nb");
}

#[tokio::test]
async fn test_responses_carry_request_headers() {
    let app = app("");
    let resp = app.oneshot(get("/ping")).await.unwrap();
    assert!(resp.headers().contains_key("x-request-id"));
    assert!(resp.headers().contains_key("x-response-time-us"));
}

#[tokio::test]
async fn test_non_finite_gauges_are_rejected() {
    let app = app("");

    for value in ["NaN", "inf", "-inf"] {
        let (status, _) = send(&app, post_empty(&format!("/update/gauge/g/{value}"))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "value {value}");
    }

    let (status, _) = send(&app, get("/value/gauge/g")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_empty_id_is_rejected() {
    let app = app("");

    let (status, _) = send(&app, post_json("/update/", json!({"id": "", "type": "gauge", "value": 1.0}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, body) = send(&app, get("/")).await;
    assert_eq!(body, "");
}

#[tokio::test]
async fn test_small_gauge_uses_exponent_form() {
    let app = app("");
    send(&app, post_json("/update/", json!({"id": "tiny", "type": "gauge", "value": 1e-7}))).await;

    let (_, body) = send(&app, get("/value/gauge/tiny")).await;
    assert_eq!(body, "1e-07");
}
