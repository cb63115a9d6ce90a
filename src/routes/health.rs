use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use prometheus::{Encoder, TextEncoder};
use serde::Serialize;
use std::sync::Arc;
use tracing::error;

use crate::AppState;

/// Root endpoint - basic status
pub async fn root() -> impl IntoResponse {
    Json(serde_json::json!({
        "name": "AnimeOnline Addon",
        "version": env!("CARGO_PKG_VERSION"),
        "status": "running",
        "manifest": "/manifest.json"
    }))
}

/// Health check response
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct HealthResponse {
    status: String,
    uptime: u64,
    started_at: DateTime<Utc>,
    site: String,
    catalogs: usize,
    resolvers: Vec<String>,
}

/// GET /health
pub async fn health_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_string(),
        uptime: state.start_time.elapsed().as_secs(),
        started_at: state.started_at,
        site: state.config.site_base_url.clone(),
        catalogs: state.catalog.catalogs().iter().count(),
        resolvers: state
            .streams
            .resolver_names()
            .into_iter()
            .map(String::from)
            .collect(),
    })
}

/// GET /metrics
/// Pipeline counters in the Prometheus text exposition format.
pub async fn metrics() -> Response {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&prometheus::gather(), &mut buffer) {
        error!("Metrics export failed: {}", e);
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }

    (
        [(header::CONTENT_TYPE, encoder.format_type().to_string())],
        buffer,
    )
        .into_response()
}

/// GET /live
pub async fn live(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    format!("alive {}s", state.start_time.elapsed().as_secs())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::services::http::HttpFetcher;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_health_reports_resolvers() {
        let config = Config::from_env();
        let http = HttpFetcher::new(&config.user_agent).unwrap();
        let app = crate::build_router(Arc::new(crate::AppState::new(config, http)));

        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["status"], "ok");
        assert_eq!(json["catalogs"], 2);
        assert_eq!(json["resolvers"], serde_json::json!(["STREAMTAPE", "MP4UPLOAD"]));
    }

    #[tokio::test]
    async fn test_metrics_export_pipeline_counters() {
        crate::services::metrics::relay_response(403);

        let response = metrics().await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers()[header::CONTENT_TYPE]
            .to_str()
            .unwrap()
            .starts_with("text/plain"));

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(text.contains("addon_image_relay_responses_total"));
    }

    #[tokio::test]
    async fn test_live_answers_without_upstream() {
        let config = Config::from_env();
        let http = HttpFetcher::new(&config.user_agent).unwrap();
        let app = crate::build_router(Arc::new(crate::AppState::new(config, http)));

        let response = app
            .oneshot(Request::builder().uri("/live").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert!(body.starts_with(b"alive "));
    }
}
