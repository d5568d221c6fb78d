//! Read-only HTTP query surface.
//!
//! Endpoints:
//! - `GET /` plain-text welcome with the host name
//! - `GET /health` engine health summary
//! - `GET /snapshot` the bucket currently recording
//! - `GET /monitor/:metric` one metric from the current bucket
//! - `GET /history/:version` a retired bucket, 0 being the latest
//! - `GET /history/:version/:metric` one metric from a retired bucket
//!
//! Handlers only call the monitor's query accessors, which take read locks.

use crate::core::{HttpConfig, MonitorError, Result};
use crate::metrics::{BucketSnapshot, PersistentReading};
use crate::monitoring::Monitor;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// API server state.
#[derive(Clone)]
struct ApiState {
    monitor: Arc<Monitor>,
    welcome: Arc<str>,
}

/// Error response.
#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
    code: u16,
}

/// A single metric looked up in one bucket.
#[derive(Debug, Serialize)]
struct MetricResponse {
    metric: String,
    started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    adhoc: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    persistent: Option<PersistentReading>,
}

impl MetricResponse {
    /// `None` when the bucket knows nothing under `name`.
    fn from_snapshot(snapshot: BucketSnapshot, name: &str) -> Option<Self> {
        let adhoc = snapshot.adhoc.get(name).copied();
        let persistent = snapshot.persistent.into_iter().find(|r| r.name == name);
        if adhoc.is_none() && persistent.is_none() {
            return None;
        }

        Some(Self {
            metric: name.to_string(),
            started_at: snapshot.started_at,
            adhoc,
            persistent,
        })
    }
}

fn error_response(status: StatusCode, error: String) -> Response {
    (
        status,
        Json(ErrorResponse {
            error,
            code: status.as_u16(),
        }),
    )
        .into_response()
}

/// Host name from the environment, `/etc/hostname`, or "unknown".
fn host_name() -> String {
    std::env::var("HOSTNAME")
        .ok()
        .filter(|h| !h.is_empty())
        .or_else(|| {
            std::fs::read_to_string("/etc/hostname")
                .ok()
                .map(|h| h.trim().to_string())
                .filter(|h| !h.is_empty())
        })
        .unwrap_or_else(|| "unknown".to_string())
}

/// Build the router; exposed for in-process tests.
pub fn router(monitor: Arc<Monitor>) -> Router {
    let state = ApiState {
        monitor,
        welcome: Arc::from(format!("Welcome to intervalmon\nHostName: {}\n", host_name())),
    };

    Router::new()
        .route("/", get(welcome_handler))
        .route("/health", get(health_handler))
        .route("/snapshot", get(snapshot_handler))
        .route("/monitor/:metric", get(monitor_handler))
        .route("/history/:version", get(history_handler))
        .route("/history/:version/:metric", get(history_metric_handler))
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
}

/// Serve the query surface until `shutdown` resolves.
pub async fn start_server<F>(monitor: Arc<Monitor>, config: &HttpConfig, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = SocketAddr::new(config.bind_address, config.port);
    let listener = TcpListener::bind(addr).await.map_err(|e| {
        MonitorError::Io(std::io::Error::new(
            e.kind(),
            format!("failed to bind to {}: {}", addr, e),
        ))
    })?;

    tracing::info!("serving query API on http://{}", addr);

    axum::serve(listener, router(monitor))
        .with_graceful_shutdown(shutdown)
        .await?;

    tracing::info!("query API stopped");
    Ok(())
}

/// GET /
async fn welcome_handler(State(state): State<ApiState>) -> impl IntoResponse {
    state.welcome.to_string()
}

/// GET /health
async fn health_handler(State(state): State<ApiState>) -> impl IntoResponse {
    Json(state.monitor.health())
}

/// GET /snapshot
async fn snapshot_handler(State(state): State<ApiState>) -> impl IntoResponse {
    Json(state.monitor.current_snapshot())
}

/// GET /monitor/:metric
async fn monitor_handler(
    State(state): State<ApiState>,
    Path(metric): Path<String>,
) -> Response {
    match MetricResponse::from_snapshot(state.monitor.current_snapshot(), &metric) {
        Some(found) => Json(found).into_response(),
        None => error_response(StatusCode::NOT_FOUND, format!("metric not found: {}", metric)),
    }
}

/// GET /history/:version
async fn history_handler(
    State(state): State<ApiState>,
    Path(version): Path<usize>,
) -> Response {
    match state.monitor.history_snapshot(version) {
        Some(snapshot) => Json(snapshot).into_response(),
        None => missing_version(&state, version),
    }
}

/// GET /history/:version/:metric
async fn history_metric_handler(
    State(state): State<ApiState>,
    Path((version, metric)): Path<(usize, String)>,
) -> Response {
    let Some(snapshot) = state.monitor.history_snapshot(version) else {
        return missing_version(&state, version);
    };

    match MetricResponse::from_snapshot(snapshot, &metric) {
        Some(found) => Json(found).into_response(),
        None => error_response(
            StatusCode::NOT_FOUND,
            format!("metric not found in version {}: {}", version, metric),
        ),
    }
}

fn missing_version(state: &ApiState, version: usize) -> Response {
    error_response(
        StatusCode::NOT_FOUND,
        format!(
            "no bucket {} versions back (history depth {})",
            version,
            state.monitor.store().depth()
        ),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Config;
    use crate::metrics::AggregationKind;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use std::collections::HashMap;
    use tower::ServiceExt;

    async fn get_json(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[tokio::test]
    async fn test_welcome() {
        let monitor = Arc::new(Monitor::new(Config::default()).unwrap());
        let response = router(monitor)
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert!(String::from_utf8_lossy(&body).contains("HostName: "));
    }

    #[tokio::test]
    async fn test_monitor_metric() {
        let monitor = Arc::new(Monitor::new(Config::default()).unwrap());
        let id = monitor.metric("calls", AggregationKind::Count, "", HashMap::new());
        monitor.add_persistent(id, AggregationKind::Count, 1.0);
        monitor.add("bytes", 10.0);

        let (status, body) = get_json(router(Arc::clone(&monitor)), "/monitor/calls").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["persistent"]["values"][0]["text"], "1");
        assert!(body.get("adhoc").is_none());

        let (status, body) = get_json(router(Arc::clone(&monitor)), "/monitor/bytes").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["adhoc"], 10.0);

        let (status, body) = get_json(router(monitor), "/monitor/nope").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["code"], 404);
    }

    #[tokio::test]
    async fn test_history_routes() {
        let monitor = Arc::new(Monitor::new(Config::default()).unwrap());
        monitor.add("hits", 3.0);
        monitor.rotate_now().await;

        let (status, body) = get_json(router(Arc::clone(&monitor)), "/history/0").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["adhoc"]["hits"], 3.0);

        let (status, body) = get_json(router(Arc::clone(&monitor)), "/history/0/hits").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["adhoc"], 3.0);

        let (status, _) = get_json(router(Arc::clone(&monitor)), "/history/1").await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = get_json(router(monitor), "/history/0/misses").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_health() {
        let monitor = Arc::new(Monitor::new(Config::default()).unwrap());
        let (status, body) = get_json(router(monitor), "/health").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["scheduler"], "idle");
        assert_eq!(body["interval_seconds"], 60);
    }
}
