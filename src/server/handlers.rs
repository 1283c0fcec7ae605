use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    Json,
};
use std::sync::Arc;
use tracing::{error, warn};

use crate::error::MetricsError;
use crate::metric::{Metric, MetricKind};

use super::AppState;

// ─── Unified error type ──────────────────────────────────────────

#[derive(Debug)]
pub enum AppError {
    /// A failure raised by the metrics service or repository.
    Metrics(MetricsError),
    /// Undecodable body or unparsable path value.
    BadRequest(String),
}

impl From<MetricsError> for AppError {
    fn from(e: MetricsError) -> Self {
        Self::Metrics(e)
    }
}

impl From<JsonRejection> for AppError {
    fn from(e: JsonRejection) -> Self {
        Self::BadRequest(e.body_text())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            Self::Metrics(e) => match e {
                MetricsError::NotFound { .. } => (StatusCode::NOT_FOUND, e.to_string()),
                MetricsError::NotImplemented { .. } => {
                    (StatusCode::NOT_IMPLEMENTED, e.to_string())
                }
                MetricsError::InvalidSignature { .. }
                | MetricsError::MalformedMetric { .. } => {
                    (StatusCode::BAD_REQUEST, e.to_string())
                }
                MetricsError::Storage(_)
                | MetricsError::Transport(_)
                | MetricsError::Configuration(_) => {
                    error!("Internal failure: {e}");
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "internal server error".to_string(),
                    )
                }
            },
        };

        let body = serde_json::json!({
            "error":  message,
            "status": status.as_u16(),
        });

        (status, Json(body)).into_response()
    }
}

// ─── GET / ───────────────────────────────────────────────────────

pub async fn list_metrics(
    State(state): State<Arc<AppState>>,
) -> Result<Html<String>, AppError> {
    let mut names = state.service.list_metric_names().await?;
    names.sort();
    Ok(Html(names.join("\n")))
}

// ─── GET /ping ───────────────────────────────────────────────────

pub async fn ping(State(state): State<Arc<AppState>>) -> Response {
    match state.service.ping_repo().await {
        Ok(()) => (StatusCode::OK, "OK").into_response(),
        Err(e) => {
            error!("Repository ping failed: {e}");
            (StatusCode::INTERNAL_SERVER_ERROR, "storage unavailable").into_response()
        }
    }
}

// ─── POST /update/ ───────────────────────────────────────────────

/// Stores one JSON record and echoes it back as stored
/// (counters carry the accumulated total).
pub async fn update_json(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<Metric>, JsonRejection>,
) -> Result<Json<Metric>, AppError> {
    let Json(metric) = payload?;
    let stored = state.service.store_metric(metric).await.map_err(|e| {
        warn!("Update rejected: {e}");
        e
    })?;
    Ok(Json(stored))
}

// ─── POST /update/:kind/:name/:value ─────────────────────────────

pub async fn update_path(
    State(state): State<Arc<AppState>>,
    Path((kind, name, value)): Path<(String, String, String)>,
) -> Result<Json<Metric>, AppError> {
    let metric = match MetricKind::from(kind) {
        MetricKind::Gauge => {
            let v: f64 = value
                .parse()
                .map_err(|_| AppError::BadRequest(format!("cannot parse gauge value {value:?}")))?;
            Metric::gauge(name, v)
        }
        MetricKind::Counter => {
            let d: i64 = value
                .parse()
                .map_err(|_| AppError::BadRequest(format!("cannot parse counter value {value:?}")))?;
            Metric::counter(name, d)
        }
        MetricKind::Other(kind) => {
            return Err(MetricsError::NotImplemented { kind }.into())
        }
    };

    let stored = state.service.store_metric(metric).await?;
    Ok(Json(stored))
}

// ─── POST /updates/ ──────────────────────────────────────────────

/// Applies records in order; the first failure stops the batch and
/// earlier records stay applied.
pub async fn update_batch(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<Vec<Metric>>, JsonRejection>,
) -> Result<Json<Vec<Metric>>, AppError> {
    let Json(items) = payload?;

    let mut stored = Vec::with_capacity(items.len());
    for item in items {
        let id = item.id.clone();
        match state.service.store_metric(item).await {
            Ok(m) => stored.push(m),
            Err(e) => {
                warn!("Batch stopped at {id}: {e}");
                return Err(e.into());
            }
        }
    }
    Ok(Json(stored))
}

// ─── POST /value/ ────────────────────────────────────────────────

pub async fn value_json(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<Metric>, JsonRejection>,
) -> Result<Json<Metric>, AppError> {
    let Json(query) = payload?;
    let stored = state.service.get_metrics(&query).await?;
    Ok(Json(stored))
}

// ─── GET /value/:kind/:name ──────────────────────────────────────

/// Plain-text value. A stored record of another kind counts as not found.
pub async fn value_text(
    State(state): State<Arc<AppState>>,
    Path((kind, name)): Path<(String, String)>,
) -> Result<String, AppError> {
    let kind = MetricKind::from(kind);
    if let MetricKind::Other(other) = kind {
        return Err(MetricsError::NotImplemented { kind: other }.into());
    }

    let stored = state
        .service
        .get_metrics(&Metric::query(name.clone(), kind.clone()))
        .await?;
    if stored.kind != kind {
        return Err(MetricsError::not_found(name).into());
    }

    stored
        .payload_text()
        .ok_or_else(|| MetricsError::not_found(name).into())
}
