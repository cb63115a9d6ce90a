use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::PLACEHOLDER_POSTER;
use crate::services::{allowlist, identity, metrics};
use crate::AppState;

// Re-export reqwest header module to avoid version conflicts
mod reqwest_header {
    pub use reqwest::header::CONTENT_TYPE;
}

const CACHE_CONTROL_DAY: &str = "public, max-age=86400";

fn status_only(status: StatusCode, message: &'static str) -> Response {
    metrics::relay_response(status.as_u16());
    (status, message).into_response()
}

fn placeholder_redirect() -> Response {
    metrics::relay_response(StatusCode::FOUND.as_u16());
    (
        StatusCode::FOUND,
        [(header::LOCATION, PLACEHOLDER_POSTER)],
    )
        .into_response()
}

/// GET /img/*payload
/// Relays an allowlisted image whose URL is carried base64-encoded in the path.
/// Upstream failures redirect to the placeholder instead of erroring.
pub async fn relay(
    State(state): State<Arc<AppState>>,
    Path(payload): Path<String>,
) -> Response {
    let payload = payload.trim_matches('/');
    if payload.is_empty() {
        return status_only(StatusCode::NOT_FOUND, "Not Found");
    }

    let target = match identity::decode_payload(payload) {
        Ok(url) => url,
        Err(e) => {
            debug!("Relay path not decodable: {}", e);
            return status_only(StatusCode::NOT_FOUND, "Not Found");
        }
    };

    if let Err(e) = allowlist::check(&target) {
        warn!("Relay refused: {}", e);
        return status_only(StatusCode::FORBIDDEN, "Forbidden");
    }

    let referer = format!("{}/", state.config.site_base_url);
    let timeout = Duration::from_millis(state.config.relay_timeout_ms);
    let upstream = match state.http.get_relayed(&target, &referer, timeout).await {
        Ok(response) => response,
        Err(e) => {
            warn!("Proxy error: {}", e);
            return placeholder_redirect();
        }
    };

    let content_type = upstream
        .headers()
        .get(reqwest_header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("image/jpeg")
        .to_string();

    let body = Body::from_stream(upstream.bytes_stream());
    match Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, content_type)
        .header(header::CACHE_CONTROL, CACHE_CONTROL_DAY)
        .header(header::ACCESS_CONTROL_ALLOW_ORIGIN, "*")
        .body(body)
    {
        Ok(response) => {
            metrics::relay_response(StatusCode::OK.as_u16());
            response
        }
        Err(e) => {
            warn!("Failed to build relay response: {}", e);
            placeholder_redirect()
        }
    }
}
