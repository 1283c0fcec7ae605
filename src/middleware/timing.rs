use axum::{
    extract::Request,
    http::{HeaderName, HeaderValue},
    middleware::Next,
    response::Response,
};
use std::time::Instant;
use tracing::{info, warn};
use uuid::Uuid;

pub const REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");
pub const RESPONSE_TIME_US: HeaderName = HeaderName::from_static("x-response-time-us");
pub const SERVER_TIMING: HeaderName = HeaderName::from_static("server-timing");

/// Tags every response with a request id and its handler wall time, and logs
/// one line per request.
///
/// A request id sent by the client is echoed back instead of a fresh UUID.
pub async fn timing_middleware(req: Request, next: Next) -> Response {
    let method = req.method().clone();
    let path = req.uri().path().to_owned();
    let request_id = req
        .headers()
        .get(&REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned)
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let start = Instant::now();
    let mut response = next.run(req).await;
    let elapsed = start.elapsed();
    let us = elapsed.as_micros() as u64;

    // ── Response headers ────────────────────────────────────────
    let headers = response.headers_mut();
    if let Ok(val) = HeaderValue::from_str(&request_id) {
        headers.insert(REQUEST_ID, val);
    }
    headers.insert(RESPONSE_TIME_US, HeaderValue::from(us));
    if let Ok(val) = HeaderValue::from_str(&format!("total;dur={:.3}", elapsed.as_secs_f64() * 1000.0)) {
        headers.insert(SERVER_TIMING, val);
    }

    // ── Log ─────────────────────────────────────────────────────
    let status = response.status().as_u16();
    if status >= 500 {
        warn!(%request_id, %method, %path, status, us, "request failed");
    } else {
        info!(%request_id, %method, %path, status, us, "request");
    }

    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, http, middleware, routing::get, Router};
    use tower::ServiceExt;

    fn app() -> Router {
        Router::new()
            .route("/", get(|| async { "ok" }))
            .layer(middleware::from_fn(timing_middleware))
    }

    #[tokio::test]
    async fn test_fresh_request_id() {
        let resp = app()
            .oneshot(http::Request::get("/").body(Body::empty()).unwrap())
            .await
            .unwrap();

        let id = resp.headers().get(&REQUEST_ID).unwrap().to_str().unwrap();
        assert!(Uuid::parse_str(id).is_ok());
        assert!(resp.headers().contains_key(&RESPONSE_TIME_US));
        assert!(resp.headers().contains_key(&SERVER_TIMING));
    }

    #[tokio::test]
    async fn test_client_request_id_is_echoed() {
        let req = http::Request::get("/")
            .header("x-request-id", "agent-42")
            .body(Body::empty())
            .unwrap();
        let resp = app().oneshot(req).await.unwrap();
        assert_eq!(resp.headers().get(&REQUEST_ID).unwrap(), "agent-42");
    }
}
